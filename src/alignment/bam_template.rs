//! Per-cluster output record and the pair search accumulator.

use std::fmt;

use super::fragment::FragmentMetadata;
use crate::defaults::READS_IN_A_PAIR;
use crate::utils::log_sum_exp;

/// Log probabilities closer than this are treated as a tie.
pub const LOG_PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Final alignment of one cluster: one fragment per read plus template properties.
///
/// The CIGAR views of the fragments point into the builder's CIGAR buffer, which is
/// only valid until the next cluster is built.
#[derive(Debug, Clone, Default)]
pub struct BamTemplate {
    fragments: Vec<FragmentMetadata>,
    alignment_score: Option<u32>,
    /// Mates pass the template length model.
    pub properly_paired: bool,
    /// Mates were placed independently.
    pub disjointed: bool,
    /// One mate was placed by the shadow aligner.
    pub rescued: bool,
    /// More equally good placements than the repeat threshold.
    pub repeat: bool,
    /// Number of equally good placements the reported one was picked from.
    pub repeat_count: usize,
}

impl BamTemplate {
    pub fn new(read_count: usize) -> Self {
        let mut template = Self::default();
        template.reset(read_count);
        template
    }

    /// Forget the previous cluster; every read becomes an unaligned placeholder.
    pub fn reset(&mut self, read_count: usize) {
        self.fragments.clear();
        self.fragments
            .extend((0..read_count).map(FragmentMetadata::unaligned));
        self.alignment_score = None;
        self.properly_paired = false;
        self.disjointed = false;
        self.rescued = false;
        self.repeat = false;
        self.repeat_count = 0;
    }

    #[inline]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    #[inline]
    pub fn fragment(&self, read_index: usize) -> &FragmentMetadata {
        &self.fragments[read_index]
    }

    #[inline]
    pub fn fragment_mut(&mut self, read_index: usize) -> &mut FragmentMetadata {
        &mut self.fragments[read_index]
    }

    pub fn fragments(&self) -> &[FragmentMetadata] {
        &self.fragments
    }

    pub fn set_fragment(&mut self, fragment: FragmentMetadata) {
        let read_index = fragment.read_index;
        self.fragments[read_index] = fragment;
    }

    pub fn set_pair(&mut self, pair: &[FragmentMetadata; READS_IN_A_PAIR]) {
        for fragment in pair {
            self.set_fragment(*fragment);
        }
    }

    #[inline]
    pub fn is_paired(&self) -> bool {
        self.fragments.len() == READS_IN_A_PAIR
    }

    /// Template-level mapping quality, `None` when it could not be determined.
    #[inline]
    pub fn alignment_score(&self) -> Option<u32> {
        self.alignment_score
    }

    #[inline]
    pub fn set_alignment_score(&mut self, score: Option<u32>) {
        self.alignment_score = score;
    }

    pub fn aligned_count(&self) -> usize {
        self.fragments.iter().filter(|f| f.is_aligned()).count()
    }

    /// No read has a placement.
    pub fn is_unaligned(&self) -> bool {
        self.aligned_count() == 0
    }

    /// Exactly one mate of a pair is placed.
    pub fn is_singleton(&self) -> bool {
        self.is_paired() && self.aligned_count() == 1
    }

    /// Drop every placement but keep the reads.
    pub fn mark_unaligned(&mut self) {
        let read_count = self.fragments.len();
        self.reset(read_count);
    }
}

impl fmt::Display for BamTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BamTemplate(")?;
        for fragment in &self.fragments {
            write!(f, "{fragment}, ")?;
        }
        write!(
            f,
            "as={:?}{}{}{}{})",
            self.alignment_score,
            if self.properly_paired { " proper" } else { "" },
            if self.disjointed { " disjointed" } else { "" },
            if self.rescued { " rescued" } else { "" },
            if self.repeat { " repeat" } else { "" }
        )
    }
}

/// Candidate pair result under construction.
///
/// Keeps every pair tying for the best `(anchored, log_probability)` key so repeats
/// can be resolved afterwards, plus the probability mass of all pairs seen.
#[derive(Debug, Clone)]
pub struct BestPairInfo {
    pub pairs: Vec<[FragmentMetadata; READS_IN_A_PAIR]>,
    pub log_probability: f64,
    pub total_log_probability: f64,
    pub anchored: bool,
    pub rescued: bool,
}

impl Default for BestPairInfo {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            log_probability: f64::NEG_INFINITY,
            total_log_probability: f64::NEG_INFINITY,
            anchored: false,
            rescued: false,
        }
    }
}

impl BestPairInfo {
    pub fn clear(&mut self) {
        self.pairs.clear();
        self.log_probability = f64::NEG_INFINITY;
        self.total_log_probability = f64::NEG_INFINITY;
        self.anchored = false;
        self.rescued = false;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    #[inline]
    pub fn repeat_count(&self) -> usize {
        self.pairs.len()
    }

    /// Account for a pair and keep it if it is at least as good as the best so far.
    /// Returns true when the pair became (or tied) the best.
    pub fn consider(
        &mut self,
        pair: [FragmentMetadata; READS_IN_A_PAIR],
        log_probability: f64,
        anchored: bool,
    ) -> bool {
        self.total_log_probability = log_sum_exp(self.total_log_probability, log_probability);

        let better = self.pairs.is_empty()
            || (anchored && !self.anchored)
            || (anchored == self.anchored
                && log_probability > self.log_probability + LOG_PROBABILITY_TOLERANCE);
        if better {
            self.pairs.clear();
            self.pairs.push(pair);
            self.log_probability = log_probability;
            self.anchored = anchored;
            return true;
        }
        let tie = anchored == self.anchored
            && (log_probability - self.log_probability).abs() <= LOG_PROBABILITY_TOLERANCE;
        if tie && !self.pairs.contains(&pair) {
            self.pairs.push(pair);
        }
        tie
    }

    /// The deterministic choice among tied pairs.
    pub fn first(&self) -> Option<&[FragmentMetadata; READS_IN_A_PAIR]> {
        self.pairs.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reference::ReferencePosition;

    fn pair(offset: i64) -> [FragmentMetadata; 2] {
        [
            FragmentMetadata::new(0, ReferencePosition::new(0, offset), false),
            FragmentMetadata::new(1, ReferencePosition::new(0, offset + 200), true),
        ]
    }

    #[test]
    fn test_template_reset() {
        let mut template = BamTemplate::new(2);
        assert!(template.is_paired());
        assert!(template.is_unaligned());
        template.repeat = true;
        template.set_alignment_score(Some(40));
        template.reset(1);
        assert!(!template.is_paired());
        assert!(!template.repeat);
        assert_eq!(template.alignment_score(), None);
    }

    #[test]
    fn test_best_pair_ties_and_anchoring() {
        let mut best = BestPairInfo::default();
        assert!(best.consider(pair(100), -10.0, false));
        assert!(best.consider(pair(500), -10.0, false));
        assert_eq!(best.repeat_count(), 2);

        // worse pair only adds to the total
        assert!(!best.consider(pair(900), -20.0, false));
        assert_eq!(best.repeat_count(), 2);

        // anchored beats unanchored regardless of probability
        assert!(best.consider(pair(1300), -30.0, true));
        assert_eq!(best.repeat_count(), 1);
        assert!(best.anchored);
        assert!(!best.consider(pair(1700), -5.0, false));
        assert_eq!(best.first().unwrap()[0].position, ReferencePosition::new(0, 1300));
        assert!(best.total_log_probability > -5.0);

        best.clear();
        assert!(best.is_empty());
    }
}
