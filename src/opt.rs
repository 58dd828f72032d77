// src/opt.rs
//
// Template builder options and the scoring bundle shared with the fragment
// builder, the shadow aligner and the gap realigner.

use clap::Args;
use std::fmt;
use std::str::FromStr;

use crate::defaults;

/// Mapping quality assigned to templates whose score could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DodgyAlignmentScore {
    /// Keep the alignment, report mapping quality 255.
    #[default]
    Unknown,
    /// Treat the whole template as unaligned.
    Unaligned,
    /// Keep the alignment with this fixed mapping quality.
    Score(u8),
}

impl FromStr for DodgyAlignmentScore {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "unaligned" => Ok(Self::Unaligned),
            other => match other.parse::<u8>() {
                Ok(v) if v < defaults::UNKNOWN_MAPQ => Ok(Self::Score(v)),
                _ => Err(format!(
                    "dodgy alignment score must be 'unknown', 'unaligned' or 0-254, got '{s}'"
                )),
            },
        }
    }
}

impl fmt::Display for DodgyAlignmentScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Unaligned => write!(f, "unaligned"),
            Self::Score(v) => write!(f, "{v}"),
        }
    }
}

/// Scoring used wherever an alignment is (re)scored from its CIGAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentCfg {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open_score: i32,
    pub gap_extend_score: i32,
    /// Per-base extension applied to gaps longer than `split_gap_length`.
    pub min_gap_extend_score: i32,
    pub split_alignments: bool,
    pub split_gap_length: u32,
}

impl AlignmentCfg {
    /// Score contribution of one gap of `length` bases.
    #[inline]
    pub fn gap_score(&self, length: u32) -> i32 {
        debug_assert!(length > 0);
        let extend = if self.split_alignments && length > self.split_gap_length {
            self.min_gap_extend_score
        } else {
            self.gap_extend_score
        };
        self.gap_open_score + extend * (length as i32 - 1)
    }
}

impl Default for AlignmentCfg {
    fn default() -> Self {
        TemplateBuilderOpt::default().alignment_cfg()
    }
}

/// Every knob the template builder is constructed with.
#[derive(Debug, Clone)]
pub struct TemplateBuilderOpt {
    pub repeat_threshold: usize, // Max tied best templates before reporting a repeat
    pub max_seeds_per_read: usize,
    pub scatter_repeats: bool,  // Pick tied repeats randomly (seeded by cluster id)
    pub rescue_shadows: bool,   // Try placing the unaligned mate near its orphan
    pub trim_pe_adapters: bool, // Clip read-through past the mate start
    pub anchor_mate: bool,      // A well anchored mate anchors the whole template
    pub gapped_mismatches_max: u32,
    pub smith_waterman_gaps_max: u32,
    pub smart_smith_waterman: bool, // Only try gapped alignment when ungapped is poor
    pub no_smith_waterman: bool,    // Never try gapped alignment
    pub split_alignments: bool,
    pub gap_match_score: i32,
    pub gap_mismatch_score: i32,
    pub gap_open_score: i32,
    pub gap_extend_score: i32,
    pub min_gap_extend_score: i32,
    pub split_gap_length: u32,
    pub dodgy_alignment_score: DodgyAlignmentScore,
    pub reserve_buffers: bool,
}

impl Default for TemplateBuilderOpt {
    fn default() -> Self {
        Self {
            repeat_threshold: defaults::REPEAT_THRESHOLD,
            max_seeds_per_read: defaults::MAX_SEEDS_PER_READ,
            scatter_repeats: false,
            rescue_shadows: true,
            trim_pe_adapters: true,
            anchor_mate: true,
            gapped_mismatches_max: defaults::GAPPED_MISMATCHES_MAX,
            smith_waterman_gaps_max: defaults::SMITH_WATERMAN_GAPS_MAX,
            smart_smith_waterman: true,
            no_smith_waterman: false,
            split_alignments: false,
            gap_match_score: defaults::GAP_MATCH_SCORE,
            gap_mismatch_score: defaults::GAP_MISMATCH_SCORE,
            gap_open_score: defaults::GAP_OPEN_SCORE,
            gap_extend_score: defaults::GAP_EXTEND_SCORE,
            min_gap_extend_score: defaults::MIN_GAP_EXTEND_SCORE,
            split_gap_length: defaults::SPLIT_GAP_LENGTH,
            dodgy_alignment_score: DodgyAlignmentScore::Unknown,
            reserve_buffers: true,
        }
    }
}

impl TemplateBuilderOpt {
    /// Scoring parameters as a bundle
    pub fn alignment_cfg(&self) -> AlignmentCfg {
        AlignmentCfg {
            match_score: self.gap_match_score,
            mismatch_score: self.gap_mismatch_score,
            gap_open_score: self.gap_open_score,
            gap_extend_score: self.gap_extend_score,
            min_gap_extend_score: self.min_gap_extend_score,
            split_alignments: self.split_alignments,
            split_gap_length: self.split_gap_length,
        }
    }

    /// True if the fragment builder may attempt gapped alignments at all.
    pub fn gapped_alignment_enabled(&self) -> bool {
        !self.no_smith_waterman && self.smith_waterman_gaps_max > 0
    }

    /// Validate parameters for consistency
    /// Returns Ok(()) if valid, or Err with description of issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.repeat_threshold < 1 {
            errors.push(format!(
                "repeat_threshold must be >= 1, got {}",
                self.repeat_threshold
            ));
        }
        if self.max_seeds_per_read < 1 {
            errors.push(format!(
                "max_seeds_per_read must be >= 1, got {}",
                self.max_seeds_per_read
            ));
        }

        // Scoring validation
        if self.gap_match_score < 1 {
            errors.push(format!(
                "gap_match_score must be >= 1, got {}",
                self.gap_match_score
            ));
        }
        if self.gap_mismatch_score >= 0 {
            errors.push(format!(
                "gap_mismatch_score must be negative, got {}",
                self.gap_mismatch_score
            ));
        }
        if self.gap_open_score >= 0 {
            errors.push(format!(
                "gap_open_score must be negative, got {}",
                self.gap_open_score
            ));
        }
        if self.gap_extend_score >= 0 {
            errors.push(format!(
                "gap_extend_score must be negative, got {}",
                self.gap_extend_score
            ));
        }
        if self.min_gap_extend_score >= 0 || self.min_gap_extend_score < self.gap_extend_score {
            errors.push(format!(
                "min_gap_extend_score must be in [{}, 0), got {}",
                self.gap_extend_score, self.min_gap_extend_score
            ));
        }
        if self.split_alignments && self.split_gap_length == 0 {
            errors.push("split_gap_length must be > 0 when split alignments are on".to_string());
        }
        if self.no_smith_waterman && self.smart_smith_waterman {
            log::warn!("smart Smith-Waterman has no effect when Smith-Waterman is disabled");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Template builder flags, flattened into a host CLI
#[derive(Debug, Clone, Args)]
pub struct TemplateCliOptions {
    /// Templates with more equally good placements than this are reported as repeats
    #[arg(long, value_name = "INT", default_value_t = defaults::REPEAT_THRESHOLD)]
    pub repeat_threshold: usize,

    /// Maximum seeds used per read
    #[arg(long, value_name = "INT", default_value_t = defaults::MAX_SEEDS_PER_READ)]
    pub max_seeds_per_read: usize,

    /// Pick a random placement for repeats (reproducible per cluster)
    #[arg(long)]
    pub scatter_repeats: bool,

    /// Do not try to place the unaligned mate near its orphan
    #[arg(long)]
    pub no_rescue_shadows: bool,

    /// Do not clip read-through into the adapter
    #[arg(long)]
    pub no_trim_pe_adapters: bool,

    /// Do not let a well anchored mate anchor the template
    #[arg(long)]
    pub no_anchor_mate: bool,

    /// Mismatches above which a gapped alignment is attempted
    #[arg(long, value_name = "INT", default_value_t = defaults::GAPPED_MISMATCHES_MAX)]
    pub gapped_mismatches_max: u32,

    /// Maximum gaps in a gapped alignment
    #[arg(long, value_name = "INT", default_value_t = defaults::SMITH_WATERMAN_GAPS_MAX)]
    pub smith_waterman_gaps_max: u32,

    /// Attempt gapped alignment for every candidate, not only poor ones
    #[arg(long)]
    pub no_smart_smith_waterman: bool,

    /// Never attempt gapped alignment
    #[arg(long)]
    pub no_smith_waterman: bool,

    /// Score gaps longer than --split-gap-length with the minimum extension
    #[arg(long)]
    pub split_alignments: bool,

    #[arg(long, value_name = "INT", default_value_t = defaults::GAP_MATCH_SCORE)]
    pub gap_match_score: i32,

    #[arg(long, value_name = "INT", default_value_t = defaults::GAP_MISMATCH_SCORE, allow_hyphen_values = true)]
    pub gap_mismatch_score: i32,

    #[arg(long, value_name = "INT", default_value_t = defaults::GAP_OPEN_SCORE, allow_hyphen_values = true)]
    pub gap_open_score: i32,

    #[arg(long, value_name = "INT", default_value_t = defaults::GAP_EXTEND_SCORE, allow_hyphen_values = true)]
    pub gap_extend_score: i32,

    #[arg(long, value_name = "INT", default_value_t = defaults::MIN_GAP_EXTEND_SCORE, allow_hyphen_values = true)]
    pub min_gap_extend_score: i32,

    #[arg(long, value_name = "INT", default_value_t = defaults::SPLIT_GAP_LENGTH)]
    pub split_gap_length: u32,

    /// Mapping quality for templates whose score is unknown: unknown, unaligned or 0-254
    #[arg(long, value_name = "STR", default_value = "unknown")]
    pub dodgy_alignment_score: DodgyAlignmentScore,

    /// Do not pre-reserve per-cluster buffers
    #[arg(long)]
    pub no_reserve_buffers: bool,
}

impl From<&TemplateCliOptions> for TemplateBuilderOpt {
    fn from(cli: &TemplateCliOptions) -> Self {
        Self {
            repeat_threshold: cli.repeat_threshold,
            max_seeds_per_read: cli.max_seeds_per_read,
            scatter_repeats: cli.scatter_repeats,
            rescue_shadows: !cli.no_rescue_shadows,
            trim_pe_adapters: !cli.no_trim_pe_adapters,
            anchor_mate: !cli.no_anchor_mate,
            gapped_mismatches_max: cli.gapped_mismatches_max,
            smith_waterman_gaps_max: cli.smith_waterman_gaps_max,
            smart_smith_waterman: !cli.no_smart_smith_waterman,
            no_smith_waterman: cli.no_smith_waterman,
            split_alignments: cli.split_alignments,
            gap_match_score: cli.gap_match_score,
            gap_mismatch_score: cli.gap_mismatch_score,
            gap_open_score: cli.gap_open_score,
            gap_extend_score: cli.gap_extend_score,
            min_gap_extend_score: cli.min_gap_extend_score,
            split_gap_length: cli.split_gap_length,
            dodgy_alignment_score: cli.dodgy_alignment_score,
            reserve_buffers: !cli.no_reserve_buffers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        template: TemplateCliOptions,
    }

    #[test]
    fn test_default_values() {
        let opt = TemplateBuilderOpt::default();
        assert_eq!(opt.repeat_threshold, 10);
        assert_eq!(opt.max_seeds_per_read, 16);
        assert!(!opt.scatter_repeats);
        assert!(opt.rescue_shadows);
        assert!(opt.trim_pe_adapters);
        assert!(opt.anchor_mate);
        assert_eq!(opt.gap_open_score, -15);
        assert_eq!(opt.dodgy_alignment_score, DodgyAlignmentScore::Unknown);
        assert!(opt.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let opt = TemplateBuilderOpt {
            repeat_threshold: 0,
            gap_match_score: 0,
            gap_open_score: 3,
            ..Default::default()
        };
        let errors = opt.validate().unwrap_err();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn test_gap_score() {
        let cfg = AlignmentCfg::default();
        assert_eq!(cfg.gap_score(1), -15);
        assert_eq!(cfg.gap_score(3), -21);

        let split = AlignmentCfg {
            split_alignments: true,
            split_gap_length: 2,
            ..cfg
        };
        assert_eq!(split.gap_score(2), -18);
        assert_eq!(split.gap_score(3), -17);
    }

    #[test]
    fn test_parse_dodgy_score() {
        assert_eq!("unknown".parse(), Ok(DodgyAlignmentScore::Unknown));
        assert_eq!("Unaligned".parse(), Ok(DodgyAlignmentScore::Unaligned));
        assert_eq!("3".parse(), Ok(DodgyAlignmentScore::Score(3)));
        assert!("255".parse::<DodgyAlignmentScore>().is_err());
        assert!("bogus".parse::<DodgyAlignmentScore>().is_err());
    }

    #[test]
    fn test_cli_conversion() {
        let cli = TestCli::parse_from([
            "test",
            "--scatter-repeats",
            "--no-rescue-shadows",
            "--gap-open-score",
            "-12",
            "--dodgy-alignment-score",
            "unaligned",
        ]);
        let opt = TemplateBuilderOpt::from(&cli.template);
        assert!(opt.scatter_repeats);
        assert!(!opt.rescue_shadows);
        assert_eq!(opt.gap_open_score, -12);
        assert_eq!(opt.dodgy_alignment_score, DodgyAlignmentScore::Unaligned);
        assert!(opt.validate().is_ok());
    }
}
