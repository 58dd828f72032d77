// Template assembly module
//
// Turns the outcome of the pair search into the reported BamTemplate:
// - paired-end: repeat pick, adapter trimming, pair and fragment scores
// - disjointed: best fragment of each read, scored against the background
// - singleton: best fragment of the only aligned read, the mate unaligned

use super::{TemplateBuilder, adapter, scoring};
use crate::alignment::fragment::FragmentMetadata;
use crate::alignment::oracle::{FragmentBuildContext, FragmentCandidateSource, ShadowPlacer};
use crate::alignment::rest_of_genome::RestOfGenomeCorrection;
use crate::core::cluster::Cluster;
use crate::utils::log_sum_exp;

impl<F: FragmentCandidateSource, S: ShadowPlacer> TemplateBuilder<F, S> {
    /// Report the best of `best_rescued` (if `use_rescued`) or `best_combination`.
    pub(super) fn build_paired_end_template(
        &mut self,
        context: &FragmentBuildContext<'_>,
        rest_of_genome: &RestOfGenomeCorrection,
        cluster: &Cluster,
        use_rescued: bool,
    ) {
        let (chosen, other) = if use_rescued {
            (&self.ws.best_rescued, &self.ws.best_combination)
        } else {
            (&self.ws.best_combination, &self.ws.best_rescued)
        };
        let repeat_count = chosen.repeat_count();
        let mut pair = chosen.pairs
            [scoring::pick_repeat(repeat_count, self.opt.scatter_repeats, cluster.id)];
        let total = log_sum_exp(chosen.total_log_probability, other.total_log_probability);
        let best = chosen.log_probability;
        let anchored = chosen.anchored;
        let rescued = chosen.rescued;

        let repeat = repeat_count > self.opt.repeat_threshold;
        let score = if repeat {
            0
        } else {
            scoring::pair_mapping_score(best, total, rest_of_genome.template_correction())
        };

        let mut fragment_scores = [0u32; 2];
        for (read_index, fragment) in pair.iter().enumerate() {
            let candidates = &self.ws.fragments[read_index];
            let own = if candidates.iter().any(|c| c.list_key() == fragment.list_key()) {
                scoring::fragment_mapping_score(
                    fragment,
                    candidates,
                    rest_of_genome.read_correction(read_index),
                )
            } else {
                // rescued shadow: only known through its mate
                score
            };
            fragment_scores[read_index] = if repeat { 0 } else { own.max(score) };
        }

        if self.opt.trim_pe_adapters {
            adapter::trim_pe_adapters(
                &self.cfg,
                context,
                cluster,
                &mut pair,
                &mut self.ws.cigar_buffer,
            );
        }

        let clean = pair.iter().all(|f| f.edit_distance == 0);
        for (fragment, fragment_score) in pair.iter_mut().zip(fragment_scores) {
            let fragment_anchored = fragment.anchored || (self.opt.anchor_mate && anchored);
            fragment.alignment_score = scoring::clamp_unanchored(
                fragment_score,
                fragment_anchored,
                fragment.edit_distance == 0,
            );
        }

        let template = &mut self.ws.bam_template;
        template.set_pair(&pair);
        template.properly_paired = true;
        template.rescued = rescued;
        template.repeat = repeat;
        template.repeat_count = repeat_count;
        template.set_alignment_score(scoring::clamp_unanchored(score, anchored, clean));
        log::trace!(
            "cluster {}: paired template lp={:.3} total={:.3} score={}",
            cluster.id,
            best,
            total,
            score
        );
    }

    /// Both reads aligned but no pair satisfies the template length model.
    pub(super) fn build_disjointed_template(
        &mut self,
        rest_of_genome: &RestOfGenomeCorrection,
        cluster: &Cluster,
    ) {
        let best_anchored = |candidates: &[FragmentMetadata]| {
            scoring::best_fragments(candidates)
                .first()
                .is_some_and(|&i| candidates[i].anchored)
        };
        let anchored = [
            best_anchored(self.ws.fragments[0].as_slice()),
            best_anchored(self.ws.fragments[1].as_slice()),
        ];
        let scores = [
            self.place_best_fragment(0, rest_of_genome, cluster.id, anchored[1]),
            self.place_best_fragment(1, rest_of_genome, cluster.id, anchored[0]),
        ];

        let disjointed = rest_of_genome.disjointed_template_log_probability();
        let template_total = |read_index: usize| {
            self.ws.fragments[read_index]
                .iter()
                .filter(|f| f.is_aligned())
                .fold(f64::NEG_INFINITY, |acc, f| log_sum_exp(acc, f.log_probability))
        };
        let total = template_total(0) + template_total(1) + disjointed;
        let template = &mut self.ws.bam_template;
        let best = template.fragment(0).log_probability
            + template.fragment(1).log_probability
            + disjointed;
        let pair_score =
            scoring::pair_mapping_score(best, total, rest_of_genome.template_correction());

        template.disjointed = true;
        template.properly_paired = false;
        let score = match scores {
            [Some(a), Some(b)] => Some(pair_score.min(a).min(b)),
            _ => None,
        };
        template.set_alignment_score(score);
        log::debug!(
            "cluster {}: disjointed template {} {}",
            cluster.id,
            template.fragment(0),
            template.fragment(1)
        );
    }

    /// Only `read_index` aligned; its mate stays an unaligned shadow.
    pub(super) fn build_singleton_shadow_template(
        &mut self,
        read_index: usize,
        rest_of_genome: &RestOfGenomeCorrection,
        cluster: &Cluster,
    ) {
        let score = self.place_best_fragment(read_index, rest_of_genome, cluster.id, false);
        self.ws.bam_template.set_alignment_score(score);
        log::trace!(
            "cluster {}: singleton {}",
            cluster.id,
            self.ws.bam_template.fragment(read_index)
        );
    }

    /// Put the best candidate of `read_index` into the template and return its score.
    pub(super) fn place_best_fragment(
        &mut self,
        read_index: usize,
        rest_of_genome: &RestOfGenomeCorrection,
        cluster_id: u64,
        mate_anchored: bool,
    ) -> Option<u32> {
        let candidates = &self.ws.fragments[read_index];
        let ties = scoring::best_fragments(candidates);
        if ties.is_empty() {
            return None;
        }
        let pick = ties[scoring::pick_repeat(ties.len(), self.opt.scatter_repeats, cluster_id)];
        let mut fragment = candidates[pick];

        let repeat = ties.len() > self.opt.repeat_threshold;
        let score = if repeat {
            0
        } else {
            scoring::fragment_mapping_score(
                &fragment,
                candidates,
                rest_of_genome.read_correction(read_index),
            )
        };
        let anchored = fragment.anchored || (self.opt.anchor_mate && mate_anchored);
        fragment.alignment_score =
            scoring::clamp_unanchored(score, anchored, fragment.edit_distance == 0);

        let template = &mut self.ws.bam_template;
        template.repeat |= repeat;
        template.repeat_count = template.repeat_count.max(ties.len());
        template.set_fragment(fragment);
        fragment.alignment_score
    }
}
