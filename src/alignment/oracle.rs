//! Capability interfaces of the per-read aligners the template builder delegates to.
//!
//! The template builder only depends on these two traits; [`UngappedFragmentBuilder`]
//! and [`WindowShadowAligner`] are the in-crate implementations and tests substitute
//! their own doubles.
//!
//! [`UngappedFragmentBuilder`]: super::fragment_builder::UngappedFragmentBuilder
//! [`WindowShadowAligner`]: super::shadow_aligner::WindowShadowAligner

use super::fragment::{AlignmentType, FragmentMetadata, FragmentMetadataList};
use super::template_length::TemplateLengthStatistics;
use crate::core::cigar::Cigar;
use crate::core::cluster::{Cluster, ReadMetadata};
use crate::core::reference::{ContigAnnotations, ContigList};
use crate::core::seed::{Match, SeedMetadata};

/// Shortest read suffix that is trusted as adapter read-through.
pub const MIN_ADAPTER_OVERLAP: usize = 6;

/// Adapter sequence that may be read into at the 3' end of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencingAdapter {
    pub sequence: Vec<u8>,
}

impl SequencingAdapter {
    pub fn new(sequence: impl Into<Vec<u8>>) -> Self {
        let mut sequence = sequence.into();
        sequence.make_ascii_uppercase();
        Self { sequence }
    }

    /// Offset in `bases` (sequencer orientation) where the adapter starts, if the
    /// read ends in at least [`MIN_ADAPTER_OVERLAP`] bases of it.
    pub fn read_through_offset(&self, bases: &[u8]) -> Option<usize> {
        let longest = self.sequence.len().min(bases.len());
        (MIN_ADAPTER_OVERLAP..=longest)
            .rev()
            .find(|&overlap| bases[bases.len() - overlap..] == self.sequence[..overlap])
            .map(|overlap| bases.len() - overlap)
    }
}

/// Read-only inputs shared by every cluster of a run.
#[derive(Debug, Clone, Copy)]
pub struct FragmentBuildContext<'a> {
    pub contigs: &'a ContigList,
    pub annotations: &'a ContigAnnotations,
    pub read_metadata: &'a [ReadMetadata],
    pub seed_metadata: &'a [SeedMetadata],
    pub adapters: &'a [SequencingAdapter],
    pub template_length_statistics: &'a TemplateLengthStatistics,
}

/// Produces the candidate alignments of one read from its seed matches.
pub trait FragmentCandidateSource {
    /// Append the candidates of `read` to `out`, sorted by strand then position, with
    /// CIGARs written into `cigar_buffer`. Never fails: no candidates is `NoMatch`.
    #[allow(clippy::too_many_arguments)]
    fn build(
        &mut self,
        context: &FragmentBuildContext<'_>,
        read: &ReadMetadata,
        matches: &[Match],
        cluster: &Cluster,
        with_gaps: bool,
        cigar_buffer: &mut Cigar,
        out: &mut FragmentMetadataList,
    ) -> AlignmentType;
}

/// Places an unaligned mate near a confidently placed one.
pub trait ShadowPlacer {
    /// Append placements of read `shadow` found near `anchor` to `out`.
    /// Returns false when nothing acceptable was found.
    fn rescue_shadow(
        &mut self,
        context: &FragmentBuildContext<'_>,
        anchor: &FragmentMetadata,
        shadow: &ReadMetadata,
        cluster: &Cluster,
        cigar_buffer: &mut Cigar,
        out: &mut FragmentMetadataList,
    ) -> bool;
}
