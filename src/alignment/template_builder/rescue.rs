// Shadow rescue module
//
// When no anchored pair came out of the candidate lists, the best placements of each
// read (orphans) are handed to the shadow aligner to find the mate nearby.

use super::{TemplateBuilder, TemplateWorkspace};
use crate::alignment::fragment::FragmentMetadata;
use crate::alignment::oracle::{FragmentBuildContext, FragmentCandidateSource, ShadowPlacer};
use crate::alignment::template_length::TemplateLengthStatistics;
use crate::core::cluster::Cluster;
use crate::defaults::{
    MAX_ORPHANS_TO_RESCUE, ORPHAN_LOG_PROBABILITY_SLACK, SKIP_ORPHAN_HAMMING_DISTANCE,
};

/// Aligned candidates close enough to the best one to be worth rescuing a mate for,
/// most likely first.
fn select_orphans(candidates: &[FragmentMetadata]) -> Vec<FragmentMetadata> {
    let best = candidates
        .iter()
        .filter(|f| f.is_aligned())
        .map(|f| f.log_probability)
        .fold(f64::NEG_INFINITY, f64::max);
    let mut orphans: Vec<FragmentMetadata> = candidates
        .iter()
        .filter(|f| f.is_aligned() && f.log_probability >= best - ORPHAN_LOG_PROBABILITY_SLACK)
        .copied()
        .collect();
    orphans.sort_by(|a, b| b.log_probability.total_cmp(&a.log_probability));
    orphans.truncate(MAX_ORPHANS_TO_RESCUE);
    orphans
}

impl<F: FragmentCandidateSource, S: ShadowPlacer> TemplateBuilder<F, S> {
    /// Complete orphans of both reads with shadow placements into `best_rescued`.
    pub(super) fn rescue_shadows(&mut self, context: &FragmentBuildContext<'_>, cluster: &Cluster) {
        let tls = context.template_length_statistics;
        let TemplateWorkspace {
            fragments,
            cigar_buffer,
            shadow_list,
            best_rescued,
            ..
        } = &mut self.ws;

        for orphan_read in 0..2 {
            let shadow_read = 1 - orphan_read;
            for orphan in select_orphans(&fragments[orphan_read]) {
                shadow_list.clear();
                if !self.shadow_aligner.rescue_shadow(
                    context,
                    &orphan,
                    &context.read_metadata[shadow_read],
                    cluster,
                    cigar_buffer,
                    shadow_list,
                ) {
                    continue;
                }
                for shadow in shadow_list.iter() {
                    if shadow.mismatch_count > SKIP_ORPHAN_HAMMING_DISTANCE {
                        log::trace!("skipping shadow {} with too many mismatches", shadow);
                        continue;
                    }
                    // already paired up from the candidate lists
                    if fragments[shadow_read]
                        .iter()
                        .any(|f| f.list_key() == shadow.list_key())
                    {
                        continue;
                    }
                    if !tls.is_nominal(&orphan, shadow) {
                        continue;
                    }
                    let Some(length) = TemplateLengthStatistics::template_length(&orphan, shadow)
                    else {
                        continue;
                    };
                    let log_probability = orphan.log_probability
                        + shadow.log_probability
                        + tls.log_probability(length);
                    let pair = if orphan.read_index == 0 {
                        [orphan, *shadow]
                    } else {
                        [*shadow, orphan]
                    };
                    best_rescued.consider(pair, log_probability, orphan.anchored || shadow.anchored);
                }
            }
        }

        if !best_rescued.is_empty() {
            best_rescued.rescued = true;
            log::debug!(
                "cluster {}: rescued {} shadow pair(s), lp={:.3}",
                cluster.id,
                best_rescued.repeat_count(),
                best_rescued.log_probability
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reference::ReferencePosition;

    #[test]
    fn test_select_orphans() {
        let mut list = Vec::new();
        for (offset, lp) in [(10, -30.0), (20, -1.0), (30, -8.0), (40, -12.0)] {
            let mut f = FragmentMetadata::new(0, ReferencePosition::new(0, offset), false);
            f.cigar_length = 1;
            f.log_probability = lp;
            list.push(f);
        }
        let orphans = select_orphans(&list);
        let offsets: Vec<i64> = orphans.iter().filter_map(|f| f.position.offset()).collect();
        assert_eq!(offsets, vec![20, 30]);
    }
}
