// Shadow rescue module
//
// Places the unaligned mate of a confidently aligned fragment:
// - Search region from the template length model (full [min, max] range)
// - Ungapped Hamming scan of every start in the region, expected strand only
// - All placements tying for the fewest mismatches are reported

use super::fragment::{FragmentMetadata, FragmentMetadataList};
use super::oracle::{FragmentBuildContext, ShadowPlacer};
use crate::core::cigar::{self, Cigar, CigarOp};
use crate::core::cluster::{Cluster, ReadMetadata};
use crate::core::reference::ReferencePosition;
use crate::opt::{AlignmentCfg, TemplateBuilderOpt};
use crate::utils::reverse_complement;

/// Placements reported per rescue attempt at most.
const MAX_SHADOWS: usize = 8;

pub struct WindowShadowAligner {
    cfg: AlignmentCfg,
    max_mismatches: u32,
    /// (start, reverse) of the best placements found so far
    hits: Vec<(ReferencePosition, bool)>,
}

impl WindowShadowAligner {
    pub fn new(opt: &TemplateBuilderOpt) -> Self {
        Self {
            cfg: opt.alignment_cfg(),
            max_mismatches: opt.gapped_mismatches_max,
            hits: Vec::with_capacity(MAX_SHADOWS),
        }
    }

    /// Mismatches of `bases` placed at `start`, giving up once `limit` is exceeded.
    fn hamming(contig: &[u8], start: usize, bases: &[u8], limit: u32) -> u32 {
        let mut mismatches = 0;
        for (&b, &r) in bases.iter().zip(&contig[start..start + bases.len()]) {
            if b != r || b == b'N' {
                mismatches += 1;
                if mismatches > limit {
                    break;
                }
            }
        }
        mismatches
    }
}

impl ShadowPlacer for WindowShadowAligner {
    fn rescue_shadow(
        &mut self,
        context: &FragmentBuildContext<'_>,
        anchor: &FragmentMetadata,
        shadow: &ReadMetadata,
        cluster: &Cluster,
        cigar_buffer: &mut Cigar,
        out: &mut FragmentMetadataList,
    ) -> bool {
        let Some(contig_index) = anchor.position.contig() else {
            return false;
        };
        let Some(contig) = context.contigs.get(contig_index) else {
            return false;
        };
        let read = cluster.read(shadow.index);
        let length = read.len();
        if length == 0 || length > contig.len() {
            return false;
        }
        let reverse_bases = reverse_complement(&read.bases);

        self.hits.clear();
        let mut best = self.max_mismatches;
        let windows = context
            .template_length_statistics
            .mate_windows(anchor, length);
        for window in windows.into_iter().flatten() {
            let (Some(begin), Some(end)) = (window.begin.offset(), window.end.offset()) else {
                continue;
            };
            let begin = begin.max(0);
            let end = end.min((contig.len() - length) as i64);
            let bases = if window.reverse { &reverse_bases } else { &read.bases };
            for start in begin..=end {
                let mismatches = Self::hamming(&contig.forward, start as usize, bases, best);
                if mismatches < best {
                    best = mismatches;
                    self.hits.clear();
                }
                if mismatches == best && self.hits.len() < MAX_SHADOWS {
                    self.hits.push((ReferencePosition::new(contig_index, start), window.reverse));
                }
            }
        }

        if self.hits.is_empty() {
            log::trace!("no shadow for read {} near {}", shadow.index, anchor);
            return false;
        }

        let (offset, cigar_length) = cigar_buffer.append(&[cigar::encode(length as u32, CigarOp::M)]);
        for &(position, reverse) in &self.hits {
            let mut fragment = FragmentMetadata::new(shadow.index, position, reverse);
            fragment.set_cigar(&self.cfg, contig, read, cigar_buffer, offset, cigar_length);
            fragment.anchored = fragment.is_anchored_by(context.annotations, cigar_buffer);
            out.push(fragment);
        }
        log::debug!(
            "rescued {} shadow placement(s) of read {} with {} mismatches near {}",
            self.hits.len(),
            shadow.index,
            best,
            anchor
        );
        true
    }
}
