// src/defaults.rs

// Template builder knobs
pub const REPEAT_THRESHOLD: usize = 10;
pub const MAX_SEEDS_PER_READ: usize = 16;
pub const GAPPED_MISMATCHES_MAX: u32 = 5;
pub const SMITH_WATERMAN_GAPS_MAX: u32 = 1;
pub const SPLIT_GAP_LENGTH: u32 = 10000;

// Gapped alignment scoring
pub const GAP_MATCH_SCORE: i32 = 2;
pub const GAP_MISMATCH_SCORE: i32 = -1;
pub const GAP_OPEN_SCORE: i32 = -15;
pub const GAP_EXTEND_SCORE: i32 = -3;
pub const MIN_GAP_EXTEND_SCORE: i32 = -1;

// Mapping quality
pub const MAX_MAPQ: u32 = 60;
/// Upper bound for fragments that are clean but not well anchored.
pub const DODGY_BUT_CLEAN_ALIGNMENT_SCORE: u32 = 10;
/// Mapping quality written when the score is unknown.
pub const UNKNOWN_MAPQ: u8 = 255;

// Orphan and shadow rescue
pub const READS_IN_A_PAIR: usize = 2;
/// Orphans further than this (natural log) from the best orphan are not rescued.
pub const ORPHAN_LOG_PROBABILITY_SLACK: f64 = 10.0;
/// Rescued shadows with more mismatches than this are discarded.
pub const SKIP_ORPHAN_HAMMING_DISTANCE: u32 = 3;
/// Maximum orphans per read handed to the shadow aligner.
pub const MAX_ORPHANS_TO_RESCUE: usize = 8;

// Log probability of a base call, by Phred quality
pub const MIN_BASE_QUALITY: u8 = 2;
pub const N_BASE_LOG_PROBABILITY: f64 = -1.386_294_361_119_890_6; // ln(1/4)

// Packed fragment storage
/// Extra CIGAR operations reserved in every record for realignment.
pub const REALIGNMENT_CIGAR_SLACK: usize = 4;
pub const BIN_SIZE: u64 = 1 << 20;

// Gap realignment
pub const MAX_GAPS_PER_FRAGMENT: usize = 2;
pub const MAX_GAP_COMBINATIONS: usize = 256;
