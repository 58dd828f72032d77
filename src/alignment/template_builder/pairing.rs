// Pair search module
//
// Finds the pairs of candidates that satisfy the template length model:
// - Candidate lists are split by strand (lists are sorted by strand then position)
// - For the expected orientation, a sliding window over the right mate's positions
// - Each pair is counted once, with the leftmost fragment driving the window

use crate::alignment::bam_template::BestPairInfo;
use crate::alignment::fragment::FragmentMetadata;
use crate::alignment::template_length::TemplateLengthStatistics;

/// Candidates of `list` on the given strand.
fn strand_partition(list: &[FragmentMetadata], reverse: bool) -> &[FragmentMetadata] {
    let split = list.partition_point(|f| !f.reverse);
    if reverse { &list[split..] } else { &list[..split] }
}

/// Same rule as the template length model uses to decide which mate is on the left.
#[inline]
fn is_left_of(a: &FragmentMetadata, b: &FragmentMetadata) -> bool {
    (a.unclipped_position(), a.read_index) <= (b.unclipped_position(), b.read_index)
}

/// Feed every nominal pair of the two read lists into `best`.
///
/// `slack` bounds the soft clipping of any fragment (the longest read length).
pub(super) fn locate_best_pairs(
    tls: &TemplateLengthStatistics,
    fragments: &[Vec<FragmentMetadata>],
    slack: i64,
    best: &mut BestPairInfo,
) {
    debug_assert_eq!(fragments.len(), 2);
    let orientation = tls.orientation;
    let mut candidates = 0usize;

    for left_read in 0..2 {
        let right_read = 1 - left_read;
        let lefts = strand_partition(&fragments[left_read], orientation.left_reverse());
        let rights = strand_partition(&fragments[right_read], orientation.right_reverse());
        if lefts.is_empty() || rights.is_empty() {
            continue;
        }

        let mut lo = 0;
        for left in lefts.iter().filter(|f| f.is_aligned()) {
            let earliest = left.position - slack;
            while lo < rights.len() && rights[lo].position < earliest {
                lo += 1;
            }
            let latest = left.position + tls.max;
            for right in rights[lo..]
                .iter()
                .take_while(|r| r.position <= latest)
                .filter(|r| r.is_aligned())
            {
                if !is_left_of(left, right) || !tls.is_nominal(left, right) {
                    continue;
                }
                let Some(length) = TemplateLengthStatistics::template_length(left, right) else {
                    continue;
                };
                candidates += 1;
                let log_probability =
                    left.log_probability + right.log_probability + tls.log_probability(length);
                let pair = if left.read_index == 0 {
                    [*left, *right]
                } else {
                    [*right, *left]
                };
                let anchored = left.anchored || right.anchored;
                if best.consider(pair, log_probability, anchored) {
                    log::trace!("best pair {} {} lp={:.3}", pair[0], pair[1], log_probability);
                }
            }
        }
    }
    log::trace!(
        "{} nominal pair(s), {} tied best",
        candidates,
        best.repeat_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::template_length::Orientation;
    use crate::core::reference::ReferencePosition;

    fn fragment(read_index: usize, offset: i64, reverse: bool, lp: f64) -> FragmentMetadata {
        let mut f = FragmentMetadata::new(read_index, ReferencePosition::new(0, offset), reverse);
        f.cigar_length = 1;
        f.observed_length = 100;
        f.log_probability = lp;
        f.anchored = true;
        f
    }

    fn tls() -> TemplateLengthStatistics {
        TemplateLengthStatistics::new(200, 500, 350, 40.0, 40.0, Orientation::FR)
    }

    #[test]
    fn test_finds_pair_in_either_read_order() {
        // read 1 forward on the left, read 0 reverse on the right
        let fragments = vec![
            vec![fragment(0, 1250, true, -2.0)],
            vec![fragment(1, 1000, false, -1.0)],
        ];
        let mut best = BestPairInfo::default();
        locate_best_pairs(&tls(), &fragments, 100, &mut best);
        assert_eq!(best.repeat_count(), 1);
        let pair = best.first().unwrap();
        assert_eq!(pair[0].read_index, 0);
        assert_eq!(pair[1].read_index, 1);
    }

    #[test]
    fn test_rejects_pairs_outside_model() {
        let fragments = vec![
            vec![fragment(0, 1000, false, -1.0), fragment(0, 9000, false, -1.0)],
            // template length 2100 and wrong orientation respectively
            vec![fragment(1, 3000, true, -1.0), fragment(1, 9100, false, -1.0)],
        ];
        let mut best = BestPairInfo::default();
        locate_best_pairs(&tls(), &fragments, 100, &mut best);
        assert!(best.is_empty());
    }

    #[test]
    fn test_same_strand_pair_counted_once() {
        let tls = TemplateLengthStatistics::new(200, 500, 350, 40.0, 40.0, Orientation::FF);
        let fragments = vec![
            vec![fragment(0, 1000, false, -1.0)],
            vec![fragment(1, 1250, false, -1.0)],
        ];
        let mut best = BestPairInfo::default();
        locate_best_pairs(&tls, &fragments, 100, &mut best);
        assert_eq!(best.repeat_count(), 1);
        // the accumulated mass is that of a single pair
        assert!((best.total_log_probability - best.log_probability).abs() < 1e-12);
    }

    #[test]
    fn test_keeps_ties() {
        let fragments = vec![
            vec![fragment(0, 1000, false, -1.0), fragment(0, 5000, false, -1.0)],
            vec![fragment(1, 1250, true, -1.0), fragment(1, 5250, true, -1.0)],
        ];
        let mut best = BestPairInfo::default();
        locate_best_pairs(&tls(), &fragments, 100, &mut best);
        assert_eq!(best.repeat_count(), 2);
    }
}
