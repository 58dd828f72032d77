//! Gap realignment over a flushed bin.
//!
//! The indels of every aligned record in a bin are pooled into one [`Gaps`] set,
//! built before any record changes. Each record is then re-threaded through small
//! subsets of the gaps overlapping its span and the best threading replaces the
//! stored alignment when it has fewer mismatches, or as many mismatches through gaps
//! seen by more reads.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::ops::{Add, AddAssign};

use rayon::prelude::*;

use super::gap::{Gap, Gaps};
use super::packed_buffer::bam_ordering;
use super::storage::StoredBin;
use crate::alignment::fragment::score_alignment;
use crate::core::cigar::{self, CigarOp};
use crate::core::reference::{Contig, ContigList, ReferencePosition};
use crate::defaults::{MAX_GAPS_PER_FRAGMENT, MAX_GAP_COMBINATIONS};
use crate::opt::AlignmentCfg;

/// Where a record ended up after one realignment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealignState {
    /// No gap overlaps the record or it is not aligned
    Untouched,
    CandidatesConsidered,
    Realigned,
    /// Candidates were tried and the stored alignment kept
    Rejected,
}

/// Replacement alignment for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realignment {
    pub position: ReferencePosition,
    pub cigar: Vec<u32>,
    pub mismatch_count: u32,
    pub edit_distance: u32,
    /// Summed support of the gaps the alignment goes through
    pub priority: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RealignStats {
    pub untouched: usize,
    pub considered: usize,
    pub realigned: usize,
    pub rejected: usize,
}

impl RealignStats {
    fn record(&mut self, state: RealignState) {
        match state {
            RealignState::Untouched => self.untouched += 1,
            RealignState::CandidatesConsidered => self.considered += 1,
            RealignState::Realigned => {
                self.considered += 1;
                self.realigned += 1;
            }
            RealignState::Rejected => {
                self.considered += 1;
                self.rejected += 1;
            }
        }
    }
}

impl Add for RealignStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            untouched: self.untouched + other.untouched,
            considered: self.considered + other.considered,
            realigned: self.realigned + other.realigned,
            rejected: self.rejected + other.rejected,
        }
    }
}

impl AddAssign for RealignStats {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

struct Candidate {
    start: i64,
    ops: Vec<u32>,
    mismatch_count: u32,
    edit_distance: u32,
    sw_score: i32,
    priority: u64,
    gap_count: usize,
}

impl Candidate {
    /// Lower is better.
    fn rank(&self) -> (u32, Reverse<u64>, i64, usize) {
        (
            self.mismatch_count,
            Reverse(self.priority),
            self.start,
            self.gap_count,
        )
    }
}

/// Per-thread realignment workspace.
#[derive(Debug, Clone)]
pub struct GapRealigner {
    cfg: AlignmentCfg,
    max_gaps: usize,
    max_combinations: usize,
    candidate_gaps: Vec<Gap>,
    chosen: Vec<Gap>,
    ops: Vec<u32>,
}

impl GapRealigner {
    pub fn new(cfg: AlignmentCfg) -> Self {
        Self::with_limits(cfg, MAX_GAPS_PER_FRAGMENT, MAX_GAP_COMBINATIONS)
    }

    pub fn with_limits(cfg: AlignmentCfg, max_gaps: usize, max_combinations: usize) -> Self {
        Self {
            cfg,
            max_gaps,
            max_combinations: max_combinations.max(1),
            candidate_gaps: Vec::new(),
            chosen: Vec::with_capacity(max_gaps),
            ops: Vec::new(),
        }
    }

    /// Try to re-thread one alignment through `gaps`.
    ///
    /// `bases` and `qualities` are in reference orientation. A [`Realignment`] is
    /// returned only together with [`RealignState::Realigned`].
    pub fn realign(
        &mut self,
        contig: &Contig,
        position: ReferencePosition,
        bases: &[u8],
        qualities: &[u8],
        ops: &[u32],
        gaps: &Gaps,
    ) -> (RealignState, Option<Realignment>) {
        let Some(offset) = position.offset() else {
            return (RealignState::Untouched, None);
        };
        if ops.is_empty() || !ops.iter().all(|&w| is_realignable(cigar::decode(w).1)) {
            return (RealignState::Untouched, None);
        }
        let reference_end = offset + cigar::reference_length(ops) as i64;
        let range = gaps.find_range(position, ReferencePosition::new(contig.index, reference_end));
        if range.empty() {
            return (RealignState::Untouched, None);
        }

        let current = score_alignment(&self.cfg, contig, offset, bases, qualities, ops);
        let current_priority = own_gap_priority(gaps, position, ops);

        let left_clip = cigar::begin_clipped_length(ops);
        let right_clip = cigar::end_clipped_length(ops);
        let query_length = bases.len() as u32 - left_clip - right_clip;

        self.candidate_gaps.clear();
        self.candidate_gaps.extend(
            gaps.range(range)
                .iter()
                .filter(|g| g.signed_length() != 0)
                .copied(),
        );

        let mut best: Option<Candidate> = None;
        for set in gap_sets(self.candidate_gaps.len(), self.max_gaps, self.max_combinations) {
            self.chosen.clear();
            self.chosen.extend(set.iter().map(|&i| self.candidate_gaps[i]));

            let span = query_length as i64
                + self
                    .chosen
                    .iter()
                    .map(|g| g.signed_length() as i64)
                    .sum::<i64>();
            let priority: u64 = self.chosen.iter().map(|g| g.priority() as u64).sum();

            let left_anchored = offset;
            let right_anchored = reference_end - span;
            for start in [left_anchored, right_anchored] {
                if start < 0 || start + span > contig.len() as i64 {
                    continue;
                }
                if !thread_gaps(&self.chosen, start, left_clip, right_clip, query_length, &mut self.ops) {
                    continue;
                }
                let summary = score_alignment(&self.cfg, contig, start, bases, qualities, &self.ops);
                let candidate = Candidate {
                    start,
                    ops: self.ops.clone(),
                    mismatch_count: summary.mismatch_count,
                    edit_distance: summary.edit_distance,
                    sw_score: summary.sw_score,
                    priority,
                    gap_count: self.chosen.len(),
                };
                if best.as_ref().is_none_or(|b| candidate.rank() < b.rank()) {
                    best = Some(candidate);
                }
                if left_anchored == right_anchored {
                    break;
                }
            }
        }

        let Some(best) = best else {
            return (RealignState::CandidatesConsidered, None);
        };
        let improves = best.mismatch_count < current.mismatch_count
            || (best.mismatch_count == current.mismatch_count && best.priority > current_priority);
        if best.sw_score < current.sw_score || !improves {
            return (RealignState::Rejected, None);
        }
        let realignment = Realignment {
            position: ReferencePosition::new(contig.index, best.start),
            cigar: best.ops,
            mismatch_count: best.mismatch_count,
            edit_distance: best.edit_distance,
            priority: best.priority,
        };
        (RealignState::Realigned, Some(realignment))
    }

    /// Realign every aligned record of `bin` and restore BAM order.
    pub fn realign_bin(&mut self, contigs: &ContigList, bin: &mut StoredBin) -> RealignStats {
        let gaps = {
            let buffer = &bin.buffer;
            let cigars: Vec<(ReferencePosition, Vec<u32>)> = bin
                .indexes
                .iter()
                .filter(|i| !i.unmapped)
                .map(|i| (i.position, buffer.cigar(i)))
                .collect();
            Gaps::collect_from(cigars.iter().map(|(p, ops)| (*p, ops.as_slice())))
        };

        let mut stats = RealignStats::default();
        if gaps.is_empty() {
            stats.untouched = bin.indexes.len();
            return stats;
        }

        let slot_of: HashMap<usize, usize> = bin
            .indexes
            .iter()
            .enumerate()
            .map(|(slot, index)| (index.data_offset, slot))
            .collect();

        for slot in 0..bin.indexes.len() {
            let index = bin.indexes[slot];
            let contig = index.position.contig().and_then(|c| contigs.get(c));
            let (state, realignment, capacity) = match contig {
                Some(contig) if !index.unmapped => {
                    let view = bin.buffer.get_fragment(&index);
                    let ops = bin.buffer.cigar(&index);
                    let (state, realignment) =
                        self.realign(contig, index.position, view.bases(), view.qualities(), &ops, &gaps);
                    (state, realignment, view.cigar_capacity())
                }
                _ => (RealignState::Untouched, None, 0),
            };

            let state = match realignment {
                Some(r) if r.cigar.len() > capacity => {
                    log::warn!(
                        "cluster {}: realigned CIGAR {} needs {} operations, record holds {}",
                        index.cluster_id,
                        cigar::to_string(&r.cigar),
                        r.cigar.len(),
                        capacity
                    );
                    RealignState::Rejected
                }
                Some(r) => {
                    let mut updated = index;
                    bin.buffer.commit_realignment(
                        &mut updated,
                        r.position,
                        &r.cigar,
                        r.mismatch_count,
                        r.edit_distance,
                    );
                    bin.indexes[slot] = updated;
                    if let Some(&mate_slot) = slot_of.get(&updated.mate_data_offset) {
                        if mate_slot != slot {
                            bin.buffer.resync(&mut bin.indexes[mate_slot]);
                        }
                    }
                    state
                }
                None => state,
            };
            stats.record(state);
        }

        bin.indexes.sort_by(bam_ordering);
        log::info!(
            "bin {}: {} realigned, {} rejected of {} considered ({} untouched)",
            bin.metadata.index,
            stats.realigned,
            stats.rejected,
            stats.considered,
            stats.untouched
        );
        stats
    }
}

/// Realign all bins in parallel, one workspace per task.
pub fn realign_bins(cfg: &AlignmentCfg, contigs: &ContigList, bins: &mut [StoredBin]) -> RealignStats {
    bins.par_iter_mut()
        .map(|bin| GapRealigner::new(*cfg).realign_bin(contigs, bin))
        .reduce(RealignStats::default, |a, b| a + b)
}

fn is_realignable(op: CigarOp) -> bool {
    matches!(
        op,
        CigarOp::M | CigarOp::Eq | CigarOp::X | CigarOp::I | CigarOp::D | CigarOp::S
    )
}

/// Support of the indels an alignment already goes through.
fn own_gap_priority(gaps: &Gaps, position: ReferencePosition, ops: &[u32]) -> u64 {
    let mut at = position;
    let mut priority = 0u64;
    for &word in ops {
        let (len, op) = cigar::decode(word);
        match op {
            CigarOp::D => priority += gaps.priority_of(at, len as i32) as u64,
            CigarOp::I => priority += gaps.priority_of(at, -(len as i32)) as u64,
            _ => {}
        }
        if op.consumes_ref() {
            at = at + len as i64;
        }
    }
    priority
}

/// Index sets of up to `max_gaps` gaps in increasing order, the empty set first.
fn gap_sets(count: usize, max_gaps: usize, limit: usize) -> Vec<Vec<usize>> {
    let mut sets = vec![Vec::new()];
    let mut frontier: Vec<Vec<usize>> = vec![Vec::new()];
    for _ in 0..max_gaps {
        let mut next = Vec::new();
        for set in &frontier {
            let from = set.last().map_or(0, |&i| i + 1);
            for i in from..count {
                if sets.len() + next.len() >= limit {
                    break;
                }
                let mut extended = set.clone();
                extended.push(i);
                next.push(extended);
            }
        }
        if next.is_empty() {
            break;
        }
        sets.extend(next.iter().cloned());
        frontier = next;
    }
    sets
}

/// CIGAR of a read placed at `start` through `gaps`, with matches on both sides of
/// every gap. False when the gaps do not fit the read.
fn thread_gaps(
    gaps: &[Gap],
    start: i64,
    left_clip: u32,
    right_clip: u32,
    query_length: u32,
    out: &mut Vec<u32>,
) -> bool {
    out.clear();
    cigar::push_merged(out, left_clip, CigarOp::S);
    let mut ref_pos = start;
    let mut used = 0u32;
    for gap in gaps {
        let Some(at) = gap.begin_pos().offset() else {
            return false;
        };
        if at <= ref_pos || at - ref_pos > (query_length - used) as i64 {
            return false;
        }
        let matched = (at - ref_pos) as u32;
        cigar::push_merged(out, matched, CigarOp::M);
        used += matched;
        ref_pos = at;
        if gap.is_deletion() {
            cigar::push_merged(out, gap.get_length(), CigarOp::D);
            ref_pos += gap.get_length() as i64;
        } else {
            if used + gap.get_length() >= query_length {
                return false;
            }
            cigar::push_merged(out, gap.get_length(), CigarOp::I);
            used += gap.get_length();
        }
    }
    if used >= query_length {
        return false;
    }
    cigar::push_merged(out, query_length - used, CigarOp::M);
    cigar::push_merged(out, right_clip, CigarOp::S);
    true
}
