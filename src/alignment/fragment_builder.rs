//! Reference implementation of [`FragmentCandidateSource`].
//!
//! Each seed match implies an ungapped placement of the whole read. Placements are
//! deduplicated, clipped at contig ends and at adapter read-through, scored from the
//! reference and, when allowed, refined with a single indel.

use super::fragment::{AlignmentType, FragmentMetadata, FragmentMetadataList};
use super::oracle::{FragmentBuildContext, FragmentCandidateSource};
use crate::core::cigar::{self, Cigar, CigarOp};
use crate::core::cluster::{Cluster, ReadMetadata};
use crate::core::reference::{Contig, ReferencePosition};
use crate::core::seed::Match;
use crate::opt::{AlignmentCfg, TemplateBuilderOpt};
use crate::utils::reverse_complement;

/// Longest indel tried by the single-gap refinement.
pub const MAX_INDEL_LENGTH: u32 = 8;
/// Bases required on both sides of a refined indel.
const GAP_FLANK_MIN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Placement {
    reverse: bool,
    contig: u32,
    /// Unclipped start of the read on the contig.
    start: i64,
}

pub struct UngappedFragmentBuilder {
    cfg: AlignmentCfg,
    max_seeds_per_read: usize,
    gapped_mismatches_max: u32,
    gapped: bool,
    smart_smith_waterman: bool,
    // reused per read
    placements: Vec<(Placement, u32)>,
    ops: Vec<u32>,
    oriented_bases: Vec<u8>,
}

impl UngappedFragmentBuilder {
    pub fn new(opt: &TemplateBuilderOpt) -> Self {
        Self {
            cfg: opt.alignment_cfg(),
            max_seeds_per_read: opt.max_seeds_per_read,
            gapped_mismatches_max: opt.gapped_mismatches_max,
            gapped: opt.gapped_alignment_enabled(),
            smart_smith_waterman: opt.smart_smith_waterman,
            placements: Vec::new(),
            ops: Vec::new(),
            oriented_bases: Vec::new(),
        }
    }

    /// Collect distinct placements with the number of seeds supporting each.
    fn collect_placements(
        &mut self,
        context: &FragmentBuildContext<'_>,
        read: &ReadMetadata,
        matches: &[Match],
    ) {
        self.placements.clear();
        let mut read_seeds: Vec<u32> = context
            .seed_metadata
            .iter()
            .filter(|s| s.read_index == read.index)
            .map(|s| s.index)
            .collect();
        read_seeds.sort_unstable();
        read_seeds.truncate(self.max_seeds_per_read);

        for m in matches {
            let ReferencePosition::Position { contig, offset } = m.location else {
                continue;
            };
            let seed_index = m.seed_id.seed;
            if read_seeds.binary_search(&seed_index).is_err() {
                continue;
            }
            let seed = &context.seed_metadata[seed_index as usize];
            let leading = if m.seed_id.reverse {
                (read.length - seed.offset as usize - seed.length as usize) as i64
            } else {
                seed.offset as i64
            };
            self.placements.push((
                Placement {
                    reverse: m.seed_id.reverse,
                    contig,
                    start: offset - leading,
                },
                1,
            ));
        }

        self.placements.sort_unstable_by_key(|(p, _)| *p);
        self.placements.dedup_by(|next, kept| {
            if next.0 == kept.0 {
                kept.1 += next.1;
                true
            } else {
                false
            }
        });
    }

    /// Soft clips (left, right) in reference orientation for contig overhang and adapters.
    fn clips(
        context: &FragmentBuildContext<'_>,
        placement: &Placement,
        contig: &Contig,
        read_bases: &[u8],
    ) -> (usize, usize) {
        let length = read_bases.len() as i64;
        let mut left = (-placement.start).clamp(0, length) as usize;
        let mut right = (placement.start + length - contig.len() as i64).clamp(0, length) as usize;

        if let Some(adapter_offset) = context
            .adapters
            .iter()
            .filter_map(|a| a.read_through_offset(read_bases))
            .min()
        {
            let adapter_bases = read_bases.len() - adapter_offset;
            // 3' end is on the right for forward reads and on the left for reverse ones
            if placement.reverse {
                left = left.max(adapter_bases);
            } else {
                right = right.max(adapter_bases);
            }
        }
        (left, right)
    }

    /// Best single-indel variant of an unclipped ungapped placement, if it scores higher.
    fn refine_with_gap(
        &self,
        contig: &Contig,
        start: i64,
        bases: &[u8],
        ungapped_score: i32,
    ) -> Option<Vec<u32>> {
        let length = bases.len();
        let max_gap = MAX_INDEL_LENGTH as i64;
        if start < 0 || start + length as i64 + max_gap > contig.len() as i64 {
            return None;
        }
        if length < 2 * GAP_FLANK_MIN + 1 {
            return None;
        }
        let is_match = |read_pos: usize, ref_pos: i64| {
            let base = bases[read_pos];
            base != b'N' && contig.base(ref_pos) == Some(base)
        };
        // matches of the prefix [0, k) at the original diagonal
        let mut prefix = vec![0i32; length + 1];
        for k in 0..length {
            prefix[k + 1] = prefix[k] + is_match(k, start + k as i64) as i32;
        }
        // matches of the suffix [k, length) shifted by `shift` reference bases
        let suffix = |shift: i64| {
            let mut s = vec![0i32; length + 1];
            for k in (0..length).rev() {
                s[k] = s[k + 1] + is_match(k, start + k as i64 + shift) as i32;
            }
            s
        };

        let score_of = |matches: i32, aligned: usize, gap: u32| {
            matches * self.cfg.match_score
                + (aligned as i32 - matches) * self.cfg.mismatch_score
                + self.cfg.gap_score(gap)
        };

        let mut best: Option<(i32, usize, u32, CigarOp)> = None;
        for gap in 1..=MAX_INDEL_LENGTH {
            let deletion_suffix = suffix(gap as i64);
            let insertion_suffix = suffix(-(gap as i64));
            for k in GAP_FLANK_MIN..=length - GAP_FLANK_MIN {
                let score = score_of(prefix[k] + deletion_suffix[k], length, gap);
                if best.is_none_or(|(b, ..)| score > b) {
                    best = Some((score, k, gap, CigarOp::D));
                }
                let right = k + gap as usize;
                if right + GAP_FLANK_MIN <= length {
                    let score =
                        score_of(prefix[k] + insertion_suffix[right], length - gap as usize, gap);
                    if best.is_none_or(|(b, ..)| score > b) {
                        best = Some((score, k, gap, CigarOp::I));
                    }
                }
            }
        }

        let (score, k, gap, op) = best?;
        if score <= ungapped_score {
            return None;
        }
        let mut ops = Vec::with_capacity(3);
        cigar::push_merged(&mut ops, k as u32, CigarOp::M);
        cigar::push_merged(&mut ops, gap, op);
        let rest = match op {
            CigarOp::I => length - k - gap as usize,
            _ => length - k,
        };
        cigar::push_merged(&mut ops, rest as u32, CigarOp::M);
        Some(ops)
    }
}

impl FragmentCandidateSource for UngappedFragmentBuilder {
    fn build(
        &mut self,
        context: &FragmentBuildContext<'_>,
        read: &ReadMetadata,
        matches: &[Match],
        cluster: &Cluster,
        with_gaps: bool,
        cigar_buffer: &mut Cigar,
        out: &mut FragmentMetadataList,
    ) -> AlignmentType {
        self.collect_placements(context, read, matches);
        let sequence = cluster.read(read.index);
        let mut any_gapped = false;

        for i in 0..self.placements.len() {
            let (placement, seed_count) = self.placements[i];
            let Some(contig) = context.contigs.get(placement.contig) else {
                log::warn!(
                    "seed match on unknown contig {} for cluster {}",
                    placement.contig,
                    cluster.id
                );
                continue;
            };
            let (left, right) = Self::clips(context, &placement, contig, &sequence.bases);
            if left + right >= read.length {
                continue;
            }

            self.ops.clear();
            cigar::push_merged(&mut self.ops, left as u32, CigarOp::S);
            cigar::push_merged(&mut self.ops, (read.length - left - right) as u32, CigarOp::M);
            cigar::push_merged(&mut self.ops, right as u32, CigarOp::S);
            let (offset, length) = cigar_buffer.append(&self.ops);

            let position = ReferencePosition::new(placement.contig, placement.start + left as i64);
            let mut fragment = FragmentMetadata::new(read.index, position, placement.reverse);
            fragment.seed_count = seed_count;
            fragment.set_cigar(&self.cfg, contig, sequence, cigar_buffer, offset, length);

            let try_gapped = with_gaps
                && self.gapped
                && left == 0
                && right == 0
                && fragment.mismatch_count > 0
                && (!self.smart_smith_waterman
                    || fragment.mismatch_count > self.gapped_mismatches_max);
            if try_gapped {
                self.oriented_bases.clear();
                if placement.reverse {
                    self.oriented_bases.extend(reverse_complement(&sequence.bases));
                } else {
                    self.oriented_bases.extend_from_slice(&sequence.bases);
                }
                if let Some(gapped_ops) =
                    self.refine_with_gap(contig, placement.start, &self.oriented_bases, fragment.sw_score)
                {
                    let (offset, length) = cigar_buffer.append(&gapped_ops);
                    let mut gapped = fragment;
                    gapped.set_cigar(&self.cfg, contig, sequence, cigar_buffer, offset, length);
                    log::trace!("gapped {} replaces ungapped {}", gapped, fragment);
                    fragment = gapped;
                    any_gapped = true;
                }
            }

            fragment.anchored = fragment.is_anchored_by(context.annotations, cigar_buffer);
            out.push(fragment);
        }

        out.sort_by_key(|f| f.list_key());
        out.dedup_by(|next, kept| next.list_key() == kept.list_key());
        log::trace!(
            "cluster {} read {}: {} candidates from {} matches",
            cluster.id,
            read.index,
            out.len(),
            matches.len()
        );

        if out.is_empty() {
            AlignmentType::NoMatch
        } else if any_gapped {
            AlignmentType::Gapped
        } else {
            AlignmentType::Ungapped
        }
    }
}
