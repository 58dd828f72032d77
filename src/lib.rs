//! Paired-end template construction and bin-level gap realignment.
//!
//! `alignment` turns per-read candidate fragments into one `BamTemplate` per
//! cluster. `build` serializes templates into genomic bins and realigns indels
//! across each bin.

pub mod alignment;
pub mod build;
pub mod core;
pub mod defaults;
pub mod opt;
pub mod utils;
