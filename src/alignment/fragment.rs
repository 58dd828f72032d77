//! A single read's candidate alignment and the CIGAR walk that scores it.

use std::fmt;

use crate::core::cigar::{self, Cigar, CigarOp};
use crate::core::cluster::Read;
use crate::core::reference::{Contig, ContigAnnotations, ReferencePosition};
use crate::defaults::N_BASE_LOG_PROBABILITY;
use crate::opt::AlignmentCfg;
use crate::utils::{base_log_probability, reverse_complement};

/// Classification returned by fragment building. Greater is worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlignmentType {
    Ungapped,
    Gapped,
    NoMatch,
}

impl AlignmentType {
    /// Combine the classifications of two reads; the worst one wins.
    #[inline]
    pub fn combine(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Everything the CIGAR walk learns about an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlignmentSummary {
    pub observed_length: u32,
    pub left_clipped: u32,
    pub right_clipped: u32,
    pub mismatch_count: u32,
    pub gap_count: u32,
    pub edit_distance: u32,
    pub log_probability: f64,
    pub sw_score: i32,
}

/// Walk `ops` starting at `offset` of `contig` against bases and qualities given in
/// reference orientation.
///
/// Panics if the CIGAR is empty, does not cover the read exactly, or walks off the contig.
pub fn score_alignment(
    cfg: &AlignmentCfg,
    contig: &Contig,
    offset: i64,
    bases: &[u8],
    qualities: &[u8],
    ops: &[u32],
) -> AlignmentSummary {
    assert!(!ops.is_empty(), "Unexpected empty CIGAR");
    assert_eq!(
        cigar::query_length(ops) as usize,
        bases.len(),
        "CIGAR {} does not cover a read of length {}",
        cigar::to_string(ops),
        bases.len()
    );

    let mut summary = AlignmentSummary::default();
    let mut read_pos = 0usize;
    let mut ref_pos = offset;
    let last = ops.len() - 1;

    for (i, &word) in ops.iter().enumerate() {
        let (len, op) = cigar::decode(word);
        let len_usize = len as usize;
        match op {
            CigarOp::S => {
                if i == 0 {
                    summary.left_clipped = len;
                } else if i == last {
                    summary.right_clipped = len;
                } else {
                    panic!("soft clip inside CIGAR {}", cigar::to_string(ops));
                }
                summary.log_probability += N_BASE_LOG_PROBABILITY * len as f64;
                read_pos += len_usize;
            }
            CigarOp::M | CigarOp::Eq | CigarOp::X => {
                for k in 0..len_usize {
                    let reference = match contig.base(ref_pos + k as i64) {
                        Some(b) => b,
                        None => panic!(
                            "CIGAR {} at {}:{} runs past contig {} of length {}",
                            cigar::to_string(ops),
                            contig.index,
                            offset,
                            contig.name,
                            contig.len()
                        ),
                    };
                    let base = bases[read_pos + k];
                    let quality = qualities[read_pos + k];
                    if base == b'N' {
                        summary.mismatch_count += 1;
                        summary.sw_score += cfg.mismatch_score;
                        summary.log_probability += N_BASE_LOG_PROBABILITY;
                    } else if base == reference && reference != b'N' {
                        summary.sw_score += cfg.match_score;
                        summary.log_probability += base_log_probability(quality, true);
                    } else {
                        summary.mismatch_count += 1;
                        summary.sw_score += cfg.mismatch_score;
                        summary.log_probability += base_log_probability(quality, false);
                    }
                }
                read_pos += len_usize;
                ref_pos += len as i64;
                summary.observed_length += len;
            }
            CigarOp::I => {
                for k in 0..len_usize {
                    summary.log_probability += base_log_probability(qualities[read_pos + k], false);
                }
                summary.gap_count += 1;
                summary.sw_score += cfg.gap_score(len);
                read_pos += len_usize;
            }
            CigarOp::D | CigarOp::N => {
                summary.gap_count += 1;
                summary.sw_score += cfg.gap_score(len);
                ref_pos += len as i64;
                summary.observed_length += len;
            }
            CigarOp::H | CigarOp::P => {}
        }
    }
    summary.edit_distance = summary.mismatch_count + indel_bases(ops);
    summary
}

fn indel_bases(ops: &[u32]) -> u32 {
    ops.iter()
        .map(|&w| cigar::decode(w))
        .filter(|(_, op)| matches!(op, CigarOp::I | CigarOp::D | CigarOp::N))
        .map(|(len, _)| len)
        .sum()
}

/// One read's candidate alignment. CIGAR operations live in the cluster's shared
/// [`Cigar`] buffer; the fragment only keeps the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentMetadata {
    /// Reference position of the first aligned (non-clipped) base.
    pub position: ReferencePosition,
    pub read_index: usize,
    pub reverse: bool,
    pub cigar_offset: usize,
    pub cigar_length: usize,
    /// Number of reference bases covered by the alignment.
    pub observed_length: u32,
    pub left_clipped: u32,
    pub right_clipped: u32,
    pub mismatch_count: u32,
    pub gap_count: u32,
    pub edit_distance: u32,
    pub log_probability: f64,
    pub sw_score: i32,
    /// Mapping quality, `None` while unknown.
    pub alignment_score: Option<u32>,
    pub anchored: bool,
    /// Seeds supporting this placement.
    pub seed_count: u32,
}

impl FragmentMetadata {
    /// Candidate at `position` whose CIGAR still has to be attached and scored.
    pub fn new(read_index: usize, position: ReferencePosition, reverse: bool) -> Self {
        Self {
            position,
            read_index,
            reverse,
            cigar_offset: 0,
            cigar_length: 0,
            observed_length: 0,
            left_clipped: 0,
            right_clipped: 0,
            mismatch_count: 0,
            gap_count: 0,
            edit_distance: 0,
            log_probability: f64::NEG_INFINITY,
            sw_score: 0,
            alignment_score: None,
            anchored: false,
            seed_count: 0,
        }
    }

    /// Placeholder for a read without any alignment.
    pub fn unaligned(read_index: usize) -> Self {
        Self::new(read_index, ReferencePosition::NoMatch, false)
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.position.is_position() && self.cigar_length != 0
    }

    #[inline]
    pub fn cigar<'a>(&self, buffer: &'a Cigar) -> &'a [u32] {
        buffer.slice(self.cigar_offset, self.cigar_length)
    }

    /// Position of the first base including soft clipped ones.
    #[inline]
    pub fn unclipped_position(&self) -> ReferencePosition {
        self.position - self.left_clipped as i64
    }

    /// One past the last reference base covered by the alignment.
    #[inline]
    pub fn end_position(&self) -> ReferencePosition {
        self.position + self.observed_length as i64
    }

    /// End including the right soft clip.
    #[inline]
    pub fn unclipped_end_position(&self) -> ReferencePosition {
        self.end_position() + self.right_clipped as i64
    }

    /// Position of the 5' end of the read on the forward strand.
    pub fn five_prime_position(&self) -> ReferencePosition {
        if self.reverse {
            self.unclipped_end_position() - 1
        } else {
            self.unclipped_position()
        }
    }

    /// Point at a new set of operations and rescore from the reference.
    pub fn set_cigar(
        &mut self,
        cfg: &AlignmentCfg,
        contig: &Contig,
        read: &Read,
        buffer: &Cigar,
        offset: usize,
        length: usize,
    ) {
        self.cigar_offset = offset;
        self.cigar_length = length;
        self.update_alignment(cfg, contig, read, buffer);
    }

    /// Recompute every CIGAR-derived field. Alignment score is reset to unknown.
    pub fn update_alignment(
        &mut self,
        cfg: &AlignmentCfg,
        contig: &Contig,
        read: &Read,
        buffer: &Cigar,
    ) {
        let offset = match self.position {
            ReferencePosition::Position { contig: c, offset } => {
                assert_eq!(c, contig.index, "fragment scored against the wrong contig");
                offset
            }
            other => panic!("cannot score a fragment at {other}"),
        };
        let ops = self.cigar(buffer);
        let summary = if self.reverse {
            let bases = reverse_complement(&read.bases);
            let qualities: Vec<u8> = read.qualities.iter().rev().copied().collect();
            score_alignment(cfg, contig, offset, &bases, &qualities, ops)
        } else {
            score_alignment(cfg, contig, offset, &read.bases, &read.qualities, ops)
        };
        self.apply_summary(&summary);
    }

    pub fn apply_summary(&mut self, summary: &AlignmentSummary) {
        self.observed_length = summary.observed_length;
        self.left_clipped = summary.left_clipped;
        self.right_clipped = summary.right_clipped;
        self.mismatch_count = summary.mismatch_count;
        self.gap_count = summary.gap_count;
        self.edit_distance = summary.edit_distance;
        self.log_probability = summary.log_probability;
        self.sw_score = summary.sw_score;
        self.alignment_score = None;
    }

    /// True when an aligned block of the fragment fully contains a k-mer that occurs
    /// only once in the genome. Every fragment is anchored under an empty annotation.
    pub fn is_anchored_by(&self, annotations: &ContigAnnotations, buffer: &Cigar) -> bool {
        if annotations.is_empty() {
            return true;
        }
        let (contig, mut ref_pos) = match self.position {
            ReferencePosition::Position { contig, offset } => (contig, offset),
            _ => return false,
        };
        for &word in self.cigar(buffer) {
            let (len, op) = cigar::decode(word);
            if op.is_aligned() {
                let block_end = ref_pos + len as i64;
                for p in ref_pos..block_end {
                    let unique = annotations.unique_length(contig, p);
                    if unique != ContigAnnotations::NOT_UNIQUE && p + unique as i64 <= block_end {
                        return true;
                    }
                }
            }
            if op.consumes_ref() {
                ref_pos += len as i64;
            }
        }
        false
    }

    /// Ordering used within a read's candidate list: strand then position.
    #[inline]
    pub fn list_key(&self) -> (bool, ReferencePosition) {
        (self.reverse, self.position)
    }
}

impl fmt::Display for FragmentMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fragment(r{} {}{} mm={} gaps={} lp={:.3} sw={} as={:?}{})",
            self.read_index,
            self.position,
            if self.reverse { "r" } else { "f" },
            self.mismatch_count,
            self.gap_count,
            self.log_probability,
            self.sw_score,
            self.alignment_score,
            if self.anchored { " anchored" } else { "" }
        )
    }
}

/// Candidate alignments of one read.
pub type FragmentMetadataList = Vec<FragmentMetadata>;
