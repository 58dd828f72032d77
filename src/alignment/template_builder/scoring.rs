// Mapping quality module
//
// Phred-scaled confidence of the chosen placement against everything else:
// - Fragment: other candidates of the same read plus the rest-of-genome mass
// - Template: other pairs plus the rest-of-genome mass of the whole template
// - Anchoring clamp and the dodgy fallback when no score can be trusted

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alignment::bam_template::{BamTemplate, LOG_PROBABILITY_TOLERANCE};
use crate::alignment::fragment::FragmentMetadata;
use crate::defaults::{DODGY_BUT_CLEAN_ALIGNMENT_SCORE, MAX_MAPQ};
use crate::opt::DodgyAlignmentScore;
use crate::utils::{hash_64, log_diff_exp, log_sum_exp, phred_confidence};

/// Phred score of `best` against `others`, capped at [`MAX_MAPQ`].
pub(super) fn mapping_score(best: f64, others: f64) -> u32 {
    let phred = phred_confidence(best, others);
    if phred.is_nan() {
        return 0;
    }
    phred.clamp(0.0, MAX_MAPQ as f64).round() as u32
}

/// Score of a pair given the accumulated mass of every pair seen.
pub(super) fn pair_mapping_score(best: f64, total: f64, rest_of_genome: f64) -> u32 {
    let others = log_sum_exp(log_diff_exp(total.max(best), best), rest_of_genome);
    mapping_score(best, others)
}

/// Score of `fragment` against the other candidates of its read.
pub(super) fn fragment_mapping_score(
    fragment: &FragmentMetadata,
    candidates: &[FragmentMetadata],
    rest_of_genome: f64,
) -> u32 {
    let others = candidates
        .iter()
        .filter(|c| c.list_key() != fragment.list_key())
        .fold(rest_of_genome, |acc, c| log_sum_exp(acc, c.log_probability));
    mapping_score(fragment.log_probability, others)
}

/// Unanchored placements are only trusted when they match perfectly, and even then
/// only up to [`DODGY_BUT_CLEAN_ALIGNMENT_SCORE`].
pub(super) fn clamp_unanchored(score: u32, anchored: bool, clean: bool) -> Option<u32> {
    if anchored {
        Some(score)
    } else if clean {
        Some(score.min(DODGY_BUT_CLEAN_ALIGNMENT_SCORE))
    } else {
        None
    }
}

/// Indexes of the candidates tying for the best `(anchored, log_probability)`.
pub(super) fn best_fragments(candidates: &[FragmentMetadata]) -> Vec<usize> {
    let mut best: Vec<usize> = Vec::new();
    for (i, candidate) in candidates.iter().enumerate() {
        if !candidate.is_aligned() {
            continue;
        }
        let Some(&first) = best.first() else {
            best.push(i);
            continue;
        };
        let current = &candidates[first];
        let better = (candidate.anchored && !current.anchored)
            || (candidate.anchored == current.anchored
                && candidate.log_probability
                    > current.log_probability + LOG_PROBABILITY_TOLERANCE);
        if better {
            best.clear();
            best.push(i);
        } else if candidate.anchored == current.anchored
            && (candidate.log_probability - current.log_probability).abs()
                <= LOG_PROBABILITY_TOLERANCE
        {
            best.push(i);
        }
    }
    best
}

/// Which of `count` tied placements to report. Always the first unless scattering,
/// in which case the pick is random but reproducible for the cluster.
pub(super) fn pick_repeat(count: usize, scatter: bool, cluster_id: u64) -> usize {
    if count <= 1 || !scatter {
        return 0;
    }
    let mut rng = StdRng::seed_from_u64(hash_64(cluster_id));
    rng.gen_range(0..count)
}

/// Settle templates whose mapping quality could not be determined.
///
/// `Score(s)` fills every missing score, the template's and each aligned
/// fragment's. `Unaligned` only applies to the template score: a fragment left
/// without a score under a scored template keeps `None`.
///
/// Returns false when the template was turned unaligned.
pub fn flag_dodgy_template(template: &mut BamTemplate, dodgy: DodgyAlignmentScore) -> bool {
    if template.is_unaligned() {
        return false;
    }
    match dodgy {
        DodgyAlignmentScore::Unknown => true,
        DodgyAlignmentScore::Unaligned => {
            if template.alignment_score().is_some() {
                return true;
            }
            log::debug!("unaligning dodgy template {template}");
            template.mark_unaligned();
            false
        }
        DodgyAlignmentScore::Score(score) => {
            let score = Some(score as u32);
            if template.alignment_score().is_none() {
                template.set_alignment_score(score);
            }
            for read_index in 0..template.fragment_count() {
                let fragment = template.fragment_mut(read_index);
                if fragment.is_aligned() && fragment.alignment_score.is_none() {
                    fragment.alignment_score = score;
                }
            }
            true
        }
    }
}
