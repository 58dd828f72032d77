//! Core value types shared by template building and bin-level realignment.
//!
//! These are agnostic to how seeds were found or how alignments are written out.

pub mod cigar;
pub mod cluster;
pub mod reference;
pub mod seed;
