//! Construction of [`BamTemplate`] instances from seed matches.
//!
//! One builder per worker thread. For each cluster, [`TemplateBuilder::build_fragments`]
//! asks the fragment source for every read's candidates, then
//! [`TemplateBuilder::build_template`] picks the most likely template:
//!
//! 1. best anchored pair within the template length model (merge-style window search)
//! 2. shadow rescue around the best orphans when no anchored pair exists
//! 3. disjointed template when both reads align but never consistently
//! 4. singleton with an unaligned shadow when only one read aligns
//!
//! followed by repeat resolution, PE adapter trimming and mapping quality.
//!
//! Everything the builder returns lives in its [`TemplateWorkspace`] and is overwritten by
//! the next cluster.

pub mod adapter;
mod pairing;
mod placement;
mod rescue;
mod scoring;

use super::bam_template::{BamTemplate, BestPairInfo};
use super::fragment::{AlignmentType, FragmentMetadata, FragmentMetadataList};
use super::fragment_builder::UngappedFragmentBuilder;
use super::oracle::{FragmentBuildContext, FragmentCandidateSource, ShadowPlacer};
use super::rest_of_genome::RestOfGenomeCorrection;
use super::shadow_aligner::WindowShadowAligner;
use crate::core::cigar::{self, Cigar};
use crate::core::cluster::Cluster;
use crate::core::seed::Match;
use crate::opt::{AlignmentCfg, TemplateBuilderOpt};

pub use scoring::flag_dodgy_template;

/// Buffers reused from one cluster to the next by a single builder.
#[derive(Debug, Default)]
pub struct TemplateWorkspace {
    /// CIGARs of every fragment built, rescued or trimmed for the current cluster
    cigar_buffer: Cigar,
    /// `fragments[i]` is the candidate list of read `i`
    fragments: Vec<FragmentMetadataList>,
    bam_template: BamTemplate,
    shadow_list: FragmentMetadataList,
    /// Pairs combined from the fragment lists
    best_combination: BestPairInfo,
    /// Pairs completed by the shadow aligner
    best_rescued: BestPairInfo,
}

impl TemplateWorkspace {
    pub fn new(read_count: usize) -> Self {
        Self {
            fragments: vec![Vec::new(); read_count],
            bam_template: BamTemplate::new(read_count),
            ..Default::default()
        }
    }

    /// Pre-size buffers for clusters of the given read lengths.
    pub fn reserve(&mut self, read_lengths: &[usize], alignments_max: usize) {
        self.cigar_buffer
            .reserve(cigar::max_operations_for_reads(read_lengths) * alignments_max);
        for list in &mut self.fragments {
            list.reserve(alignments_max);
        }
        self.shadow_list.reserve(alignments_max);
    }

    fn clear_candidates(&mut self, read_count: usize) {
        self.cigar_buffer.clear();
        self.fragments.resize_with(read_count, Vec::new);
        for list in &mut self.fragments {
            list.clear();
        }
    }
}

pub struct TemplateBuilder<F, S> {
    opt: TemplateBuilderOpt,
    cfg: AlignmentCfg,
    alignments_max: usize,
    read_lengths: Vec<usize>,
    fragment_builder: F,
    shadow_aligner: S,
    ws: TemplateWorkspace,
}

impl TemplateBuilder<UngappedFragmentBuilder, WindowShadowAligner> {
    /// Builder using the in-crate ungapped fragment builder and window shadow aligner.
    pub fn with_default_oracles(opt: TemplateBuilderOpt, read_lengths: &[usize]) -> Self {
        let fragment_builder = UngappedFragmentBuilder::new(&opt);
        let shadow_aligner = WindowShadowAligner::new(&opt);
        Self::new(opt, fragment_builder, shadow_aligner, read_lengths)
    }
}

impl<F: FragmentCandidateSource, S: ShadowPlacer> TemplateBuilder<F, S> {
    pub fn new(
        opt: TemplateBuilderOpt,
        fragment_builder: F,
        shadow_aligner: S,
        read_lengths: &[usize],
    ) -> Self {
        let alignments_max = opt.max_seeds_per_read * 2;
        let mut ws = TemplateWorkspace::new(read_lengths.len());
        if opt.reserve_buffers {
            ws.reserve(read_lengths, alignments_max);
        }
        Self {
            cfg: opt.alignment_cfg(),
            opt,
            alignments_max,
            read_lengths: read_lengths.to_vec(),
            fragment_builder,
            shadow_aligner,
            ws,
        }
    }

    pub fn opt(&self) -> &TemplateBuilderOpt {
        &self.opt
    }

    /// Populate every read's candidate list from the cluster's seed matches.
    ///
    /// Returns the worst alignment type over all reads; a read without candidates
    /// makes the result `NoMatch`.
    pub fn build_fragments(
        &mut self,
        context: &FragmentBuildContext<'_>,
        cluster: &Cluster,
        matches: &[Match],
        with_gaps: bool,
    ) -> AlignmentType {
        if self.opt.reserve_buffers {
            self.ws.cigar_buffer.reserve(
                cigar::max_operations_for_reads(&self.read_lengths) * self.alignments_max,
            );
        }
        self.ws.clear_candidates(context.read_metadata.len());

        let mut ret: Option<AlignmentType> = None;
        for read in context.read_metadata {
            let alignment_type = self.fragment_builder.build(
                context,
                read,
                matches,
                cluster,
                with_gaps,
                &mut self.ws.cigar_buffer,
                &mut self.ws.fragments[read.index],
            );
            ret = Some(ret.map_or(alignment_type, |r| r.combine(alignment_type)));
        }
        ret.unwrap_or(AlignmentType::NoMatch)
    }

    pub fn fragments(&self) -> &[FragmentMetadataList] {
        &self.ws.fragments
    }

    pub fn bam_template(&self) -> &BamTemplate {
        &self.ws.bam_template
    }

    pub fn bam_template_mut(&mut self) -> &mut BamTemplate {
        &mut self.ws.bam_template
    }

    /// CIGAR storage the fragments of [`Self::bam_template`] point into.
    pub fn cigar_buffer(&self) -> &Cigar {
        &self.ws.cigar_buffer
    }

    /// Same as [`Self::build_template`] with externally built candidate lists.
    pub fn build_template_with(
        &mut self,
        context: &FragmentBuildContext<'_>,
        rest_of_genome: &RestOfGenomeCorrection,
        cluster: &Cluster,
        fragments: Vec<FragmentMetadataList>,
        cigar_buffer: Cigar,
    ) -> bool {
        self.ws.fragments = fragments;
        self.ws.cigar_buffer = cigar_buffer;
        self.build_template(context, rest_of_genome, cluster)
    }

    /// Build the most likely template for the cluster from the candidate lists.
    ///
    /// Returns false when no read ended up aligned anywhere; the template then holds
    /// unaligned placeholders only.
    ///
    /// Precondition: each read's list is sorted by strand then position.
    pub fn build_template(
        &mut self,
        context: &FragmentBuildContext<'_>,
        rest_of_genome: &RestOfGenomeCorrection,
        cluster: &Cluster,
    ) -> bool {
        let read_count = context.read_metadata.len();
        assert_eq!(
            self.ws.fragments.len(),
            read_count,
            "fragment lists do not match the read layout"
        );
        for (read_index, list) in self.ws.fragments.iter().enumerate() {
            assert!(
                list.windows(2).all(|w| w[0].list_key() <= w[1].list_key()),
                "fragment list of read {read_index} is not sorted by strand and position"
            );
        }

        self.ws.bam_template.reset(read_count);
        self.ws.best_combination.clear();
        self.ws.best_rescued.clear();
        self.ws.shadow_list.clear();

        let has_alignment = self
            .ws
            .fragments
            .iter()
            .any(|list| list.iter().any(FragmentMetadata::is_aligned));
        if !has_alignment {
            log::debug!("cluster {}:{} has no alignments", cluster.tile, cluster.id);
            return false;
        }

        if read_count == 1 {
            self.pick_best_fragment(rest_of_genome, cluster);
        } else {
            self.pick_best_pair(context, rest_of_genome, cluster);
        }

        let aligned = flag_dodgy_template(&mut self.ws.bam_template, self.opt.dodgy_alignment_score);
        log::trace!("cluster {}: {}", cluster.id, self.ws.bam_template);
        aligned
    }

    /// Single-ended runs: the best fragment of the only read.
    fn pick_best_fragment(&mut self, rest_of_genome: &RestOfGenomeCorrection, cluster: &Cluster) {
        let score = self.place_best_fragment(0, rest_of_genome, cluster.id, false);
        self.ws.bam_template.set_alignment_score(score);
    }

    fn pick_best_pair(
        &mut self,
        context: &FragmentBuildContext<'_>,
        rest_of_genome: &RestOfGenomeCorrection,
        cluster: &Cluster,
    ) {
        let tls = context.template_length_statistics;
        let slack = context
            .read_metadata
            .iter()
            .map(|r| r.length as i64)
            .max()
            .unwrap_or(0);
        pairing::locate_best_pairs(tls, &self.ws.fragments, slack, &mut self.ws.best_combination);

        let anchored_pair = !self.ws.best_combination.is_empty() && self.ws.best_combination.anchored;
        if self.opt.rescue_shadows && !anchored_pair {
            self.rescue_shadows(context, cluster);
        }

        let rescued = &self.ws.best_rescued;
        let combined = &self.ws.best_combination;
        let use_rescued = !rescued.is_empty()
            && (combined.is_empty()
                || (rescued.anchored, rescued.log_probability)
                    > (combined.anchored, combined.log_probability));
        if use_rescued || !combined.is_empty() {
            self.build_paired_end_template(context, rest_of_genome, cluster, use_rescued);
            return;
        }

        let aligned: Vec<bool> = self
            .ws
            .fragments
            .iter()
            .map(|list| list.iter().any(FragmentMetadata::is_aligned))
            .collect();
        if aligned.iter().all(|&a| a) {
            self.build_disjointed_template(rest_of_genome, cluster);
        } else if let Some(orphan_index) = aligned.iter().position(|&a| a) {
            self.build_singleton_shadow_template(orphan_index, rest_of_genome, cluster);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::template_length::TemplateLengthStatistics;
    use crate::core::cluster::{Read, ReadMetadata};
    use crate::core::reference::{ContigAnnotations, ContigList};

    struct NoCandidates;

    impl FragmentCandidateSource for NoCandidates {
        fn build(
            &mut self,
            _context: &FragmentBuildContext<'_>,
            _read: &crate::core::cluster::ReadMetadata,
            _matches: &[Match],
            _cluster: &Cluster,
            _with_gaps: bool,
            _cigar_buffer: &mut Cigar,
            _out: &mut FragmentMetadataList,
        ) -> AlignmentType {
            AlignmentType::NoMatch
        }
    }

    struct NoShadows;

    impl ShadowPlacer for NoShadows {
        fn rescue_shadow(
            &mut self,
            _context: &FragmentBuildContext<'_>,
            _anchor: &FragmentMetadata,
            _shadow: &crate::core::cluster::ReadMetadata,
            _cluster: &Cluster,
            _cigar_buffer: &mut Cigar,
            _out: &mut FragmentMetadataList,
        ) -> bool {
            false
        }
    }

    #[test]
    fn test_no_candidates_yields_unaligned_template() {
        let contigs = ContigList::default();
        let annotations = ContigAnnotations::default();
        let read_metadata = [ReadMetadata::new(0, 4), ReadMetadata::new(1, 4)];
        let tls = TemplateLengthStatistics::default();
        let context = FragmentBuildContext {
            contigs: &contigs,
            annotations: &annotations,
            read_metadata: &read_metadata,
            seed_metadata: &[],
            adapters: &[],
            template_length_statistics: &tls,
        };
        let rog = RestOfGenomeCorrection::new(1000, &read_metadata);
        let cluster = Cluster::new(
            1,
            1,
            vec![Read::with_quality(*b"ACGT", 30), Read::with_quality(*b"ACGT", 30)],
        );
        let mut builder =
            TemplateBuilder::new(TemplateBuilderOpt::default(), NoCandidates, NoShadows, &[4, 4]);

        assert_eq!(
            builder.build_fragments(&context, &cluster, &[], true),
            AlignmentType::NoMatch
        );
        assert!(!builder.build_template(&context, &rog, &cluster));
        assert!(builder.bam_template().is_unaligned());
        assert_eq!(builder.bam_template().fragment_count(), 2);
    }

    #[test]
    #[should_panic(expected = "not sorted")]
    fn test_unsorted_fragment_list_panics() {
        use crate::core::reference::{Contig, ReferencePosition};
        let contigs = ContigList::new(vec![Contig::new(0, "chr1", vec![b'A'; 100])]);
        let annotations = ContigAnnotations::default();
        let read_metadata = [ReadMetadata::new(0, 4)];
        let tls = TemplateLengthStatistics::default();
        let context = FragmentBuildContext {
            contigs: &contigs,
            annotations: &annotations,
            read_metadata: &read_metadata,
            seed_metadata: &[],
            adapters: &[],
            template_length_statistics: &tls,
        };
        let rog = RestOfGenomeCorrection::new(100, &read_metadata);
        let cluster = Cluster::new(1, 1, vec![Read::with_quality(*b"AAAA", 30)]);
        let list = vec![
            FragmentMetadata::new(0, ReferencePosition::new(0, 50), false),
            FragmentMetadata::new(0, ReferencePosition::new(0, 10), false),
        ];
        let mut builder =
            TemplateBuilder::new(TemplateBuilderOpt::default(), NoCandidates, NoShadows, &[4]);
        builder.build_template_with(&context, &rog, &cluster, vec![list], Cigar::new());
    }
}
