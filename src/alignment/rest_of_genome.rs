//! Background probability that a read or template came from somewhere its candidates
//! do not cover.

use crate::core::cluster::ReadMetadata;
use crate::core::reference::ContigList;

/// Natural-log probability mass of random placements, per read and per template.
#[derive(Debug, Clone)]
pub struct RestOfGenomeCorrection {
    read_corrections: Vec<f64>,
    template_correction: f64,
    /// Log probability of an unconstrained placement of one mate relative to the other.
    disjointed_template: f64,
}

impl RestOfGenomeCorrection {
    /// Both strands of a genome of `genome_length` bases, each position matching a
    /// random sequence of length `L` with probability `4^-L`.
    pub fn new(genome_length: u64, read_metadata: &[ReadMetadata]) -> Self {
        let positions = (2.0 * genome_length.max(1) as f64).ln();
        let quarter = 0.25f64.ln();
        let read_corrections = read_metadata
            .iter()
            .map(|r| positions + quarter * r.length as f64)
            .collect();
        let total: usize = read_metadata.iter().map(|r| r.length).sum();
        Self {
            read_corrections,
            template_correction: positions + quarter * total as f64,
            disjointed_template: -positions,
        }
    }

    pub fn for_contigs(contigs: &ContigList, read_metadata: &[ReadMetadata]) -> Self {
        Self::new(contigs.genome_length(), read_metadata)
    }

    #[inline]
    pub fn read_correction(&self, read_index: usize) -> f64 {
        self.read_corrections[read_index]
    }

    #[inline]
    pub fn template_correction(&self) -> f64 {
        self.template_correction
    }

    /// Replaces the template length log probability for disjointed pairs.
    #[inline]
    pub fn disjointed_template_log_probability(&self) -> f64 {
        self.disjointed_template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrections_shrink_with_read_length() {
        let reads = [ReadMetadata::new(0, 20), ReadMetadata::new(1, 40)];
        let rog = RestOfGenomeCorrection::new(1_000_000, &reads);
        assert!(rog.read_correction(1) < rog.read_correction(0));
        assert!(rog.template_correction() < rog.read_correction(1));
        assert!(rog.disjointed_template_log_probability() < 0.0);
        let expected = (2.0e6f64).ln() + 20.0 * 0.25f64.ln();
        assert!((rog.read_correction(0) - expected).abs() < 1e-9);
    }
}
