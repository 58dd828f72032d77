use std::fmt;

use super::fragment::FragmentMetadata;
use crate::core::reference::ReferencePosition;

// Template length statistics module
//
// - Orientation detection (FF, FR, RF, RR) relative to the leftmost fragment
// - Quartile based estimation with outlier removal
// - Proper pair bounds and length log probability
// - Expected mate window for shadow rescue

const MIN_DIR_CNT: usize = 10; // Minimum pairs for an orientation
const OUTLIER_BOUND: f64 = 2.0; // IQR multiplier for outliers
const MAPPING_BOUND: f64 = 3.0; // IQR multiplier for proper pair bounds
const MAX_STDDEV: f64 = 4.0; // Max standard deviations for bounds
const MIN_STDDEV: f64 = 1.0;

const DEFAULT_MAX_TEMPLATE_LENGTH: i64 = 1000;
const DEFAULT_MEDIAN_TEMPLATE_LENGTH: i64 = 500;

/// Strands of the leftmost and the rightmost fragment of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    FF,
    FR,
    RF,
    RR,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [Self::FF, Self::FR, Self::RF, Self::RR];

    pub const fn from_strands(left_reverse: bool, right_reverse: bool) -> Self {
        match (left_reverse, right_reverse) {
            (false, false) => Self::FF,
            (false, true) => Self::FR,
            (true, false) => Self::RF,
            (true, true) => Self::RR,
        }
    }

    pub const fn left_reverse(self) -> bool {
        matches!(self, Self::RF | Self::RR)
    }

    pub const fn right_reverse(self) -> bool {
        matches!(self, Self::FR | Self::RR)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FF => "FF",
            Self::FR => "FR",
            Self::RF => "RF",
            Self::RR => "RR",
        };
        f.write_str(s)
    }
}

/// How a pair of fragments relates to the template model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckModelResult {
    Nominal,
    Undersized,
    Oversized,
    WrongOrientation,
    DifferentContigs,
}

/// Where the shadow aligner should look for an unplaced mate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MateWindow {
    /// Inclusive range of candidate unclipped start positions.
    pub begin: ReferencePosition,
    pub end: ReferencePosition,
    pub reverse: bool,
}

/// Template length distribution of a library.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateLengthStatistics {
    pub min: i64,
    pub max: i64,
    pub median: i64,
    pub low_std_dev: f64,
    pub high_std_dev: f64,
    pub orientation: Orientation,
    /// False until estimated from enough data; lengths are then scored flat.
    pub stable: bool,
}

impl Default for TemplateLengthStatistics {
    fn default() -> Self {
        Self {
            min: 0,
            max: DEFAULT_MAX_TEMPLATE_LENGTH,
            median: DEFAULT_MEDIAN_TEMPLATE_LENGTH,
            low_std_dev: DEFAULT_MEDIAN_TEMPLATE_LENGTH as f64 / 2.0,
            high_std_dev: DEFAULT_MEDIAN_TEMPLATE_LENGTH as f64 / 2.0,
            orientation: Orientation::FR,
            stable: false,
        }
    }
}

/// Complementary error function (approximation)
pub(crate) fn erfc(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.5 * x.abs());
    let tau = t
        * (-x * x - 1.26551223
            + t * (1.00002368
                + t * (0.37409196
                    + t * (0.09678418
                        + t * (-0.18628806
                            + t * (0.27886807
                                + t * (-1.13520398
                                    + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277)))))))))
            .exp();
    if x >= 0.0 { tau } else { 2.0 - tau }
}

impl TemplateLengthStatistics {
    pub fn new(
        min: i64,
        max: i64,
        median: i64,
        low_std_dev: f64,
        high_std_dev: f64,
        orientation: Orientation,
    ) -> Self {
        assert!(min <= median && median <= max, "inconsistent template length bounds");
        Self {
            min,
            max,
            median,
            low_std_dev: low_std_dev.max(MIN_STDDEV),
            high_std_dev: high_std_dev.max(MIN_STDDEV),
            orientation,
            stable: true,
        }
    }

    /// Unclipped span of two fragments on the same contig.
    pub fn template_length(a: &FragmentMetadata, b: &FragmentMetadata) -> Option<i64> {
        let begin = a.unclipped_position().min(b.unclipped_position());
        let end = a.unclipped_end_position().max(b.unclipped_end_position());
        begin.distance_to(&end)
    }

    /// Orientation of a pair, ordered by unclipped start (read index breaks ties).
    pub fn orientation_of(a: &FragmentMetadata, b: &FragmentMetadata) -> Orientation {
        let (left, right) = if (a.unclipped_position(), a.read_index)
            <= (b.unclipped_position(), b.read_index)
        {
            (a, b)
        } else {
            (b, a)
        };
        Orientation::from_strands(left.reverse, right.reverse)
    }

    pub fn check_model(&self, a: &FragmentMetadata, b: &FragmentMetadata) -> CheckModelResult {
        let Some(length) = Self::template_length(a, b) else {
            return CheckModelResult::DifferentContigs;
        };
        if Self::orientation_of(a, b) != self.orientation {
            CheckModelResult::WrongOrientation
        } else if length < self.min {
            CheckModelResult::Undersized
        } else if length > self.max {
            CheckModelResult::Oversized
        } else {
            CheckModelResult::Nominal
        }
    }

    #[inline]
    pub fn is_nominal(&self, a: &FragmentMetadata, b: &FragmentMetadata) -> bool {
        self.check_model(a, b) == CheckModelResult::Nominal
    }

    /// Natural-log probability of observing a template of `length` bases.
    pub fn log_probability(&self, length: i64) -> f64 {
        if !self.stable {
            let span = (self.max - self.min + 1).max(1) as f64;
            return -span.ln();
        }
        let (deviation, std_dev) = if length < self.median {
            ((self.median - length) as f64, self.low_std_dev)
        } else {
            ((length - self.median) as f64, self.high_std_dev)
        };
        let tail = erfc(deviation / (std_dev * std::f64::consts::SQRT_2));
        tail.max(f64::MIN_POSITIVE).ln()
    }

    /// Windows of unclipped start positions where the mate of `anchor` may lie.
    pub fn mate_windows(
        &self,
        anchor: &FragmentMetadata,
        mate_length: usize,
    ) -> [Option<MateWindow>; 2] {
        let mut windows = [None, None];
        if !anchor.position.is_position() {
            return windows;
        }
        let mate_length = mate_length as i64;
        // anchor is the leftmost fragment: mate ends within [begin + min, begin + max]
        if anchor.reverse == self.orientation.left_reverse() {
            let begin = anchor.unclipped_position();
            windows[0] = Some(MateWindow {
                begin: begin + (self.min - mate_length).max(0),
                end: begin + (self.max - mate_length).max(0),
                reverse: self.orientation.right_reverse(),
            });
        }
        // anchor is the rightmost fragment: mate starts within [end - max, end - min]
        if anchor.reverse == self.orientation.right_reverse() {
            let end = anchor.unclipped_end_position();
            windows[1] = Some(MateWindow {
                begin: end - self.max,
                end: end - self.min.max(mate_length),
                reverse: self.orientation.left_reverse(),
            });
        }
        windows
    }

    /// Estimate from pairs believed to be unique and correctly placed.
    ///
    /// Falls back to the unstable default when no orientation has enough pairs.
    pub fn estimate(pairs: &[(FragmentMetadata, FragmentMetadata)]) -> Self {
        let mut lengths: [Vec<i64>; 4] = [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
        for (a, b) in pairs {
            if let Some(length) = Self::template_length(a, b) {
                if length > 0 {
                    lengths[Self::orientation_of(a, b).index()].push(length);
                }
            }
        }

        log::info!(
            "[PE] # candidate unique pairs for (FF, FR, RF, RR): ({}, {}, {}, {})",
            lengths[0].len(),
            lengths[1].len(),
            lengths[2].len(),
            lengths[3].len()
        );

        let Some(best) = Orientation::ALL
            .into_iter()
            .max_by_key(|o| lengths[o.index()].len())
        else {
            return Self::default();
        };
        let sizes = &mut lengths[best.index()];
        if sizes.len() < MIN_DIR_CNT {
            log::info!("[PE] not enough pairs to estimate template length, using defaults");
            return Self::default();
        }
        log::info!("[PE] analyzing template length distribution for orientation {best}...");

        sizes.sort_unstable();
        let percentile = |p: f64| sizes[((p * sizes.len() as f64 + 0.499) as usize).min(sizes.len() - 1)];
        let p25 = percentile(0.25);
        let p50 = percentile(0.50);
        let p75 = percentile(0.75);
        let iqr = (p75 - p25) as f64;

        let low_outlier = ((p25 as f64 - OUTLIER_BOUND * iqr + 0.499) as i64).max(1);
        let high_outlier = (p75 as f64 + OUTLIER_BOUND * iqr + 0.499) as i64;
        log::info!("[PE] (25, 50, 75) percentile: ({p25}, {p50}, {p75})");

        // One-sided deviations around the median, outliers excluded
        let (mut low_sq, mut low_n, mut high_sq, mut high_n) = (0.0, 0usize, 0.0, 0usize);
        for &size in sizes.iter().filter(|&&s| s >= low_outlier && s <= high_outlier) {
            let diff = (size - p50) as f64;
            if size < p50 {
                low_sq += diff * diff;
                low_n += 1;
            } else if size > p50 {
                high_sq += diff * diff;
                high_n += 1;
            }
        }
        let low_std_dev = if low_n > 0 { (low_sq / low_n as f64).sqrt() } else { MIN_STDDEV };
        let high_std_dev = if high_n > 0 { (high_sq / high_n as f64).sqrt() } else { MIN_STDDEV };
        log::info!("[PE] median and std.dev (low, high): ({p50}, {low_std_dev:.2}, {high_std_dev:.2})");

        let mut min = (p25 as f64 - MAPPING_BOUND * iqr + 0.499) as i64;
        let mut max = (p75 as f64 + MAPPING_BOUND * iqr + 0.499) as i64;
        min = min.min((p50 as f64 - MAX_STDDEV * low_std_dev + 0.499) as i64).max(1);
        max = max.max((p50 as f64 + MAX_STDDEV * high_std_dev + 0.499) as i64);
        log::info!("[PE] low and high boundaries for proper pairs: ({min}, {max})");

        Self::new(min, max, p50, low_std_dev, high_std_dev, best)
    }
}

impl fmt::Display for TemplateLengthStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TemplateLengthStatistics({}:{}:{}, {:.2}:{:.2}, {}{})",
            self.min,
            self.median,
            self.max,
            self.low_std_dev,
            self.high_std_dev,
            self.orientation,
            if self.stable { "" } else { ", unstable" }
        )
    }
}
