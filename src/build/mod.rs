//! Storage side of the pipeline: serialized fragment records, genomic bins and
//! the gap realignment pass that runs over them.

pub mod bin_metadata;
pub mod fragment_record;
pub mod gap;
pub mod gap_realigner;
pub mod packed_buffer;
pub mod storage;
