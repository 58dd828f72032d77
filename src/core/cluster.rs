//! Sequencing clusters: one or two reads sharing a tile and cluster id.

/// Bases (upper-case ASCII, sequencer orientation) and Phred qualities of one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    pub bases: Vec<u8>,
    pub qualities: Vec<u8>,
}

impl Read {
    pub fn new(bases: impl Into<Vec<u8>>, qualities: impl Into<Vec<u8>>) -> Self {
        let mut bases = bases.into();
        bases.make_ascii_uppercase();
        let qualities = qualities.into();
        assert_eq!(
            bases.len(),
            qualities.len(),
            "read bases and qualities differ in length"
        );
        Self { bases, qualities }
    }

    /// Read with a constant quality for every base.
    pub fn with_quality(bases: impl Into<Vec<u8>>, quality: u8) -> Self {
        let bases = bases.into();
        let qualities = vec![quality; bases.len()];
        Self::new(bases, qualities)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

/// Static layout information of one read of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMetadata {
    pub index: usize,
    pub length: usize,
}

impl ReadMetadata {
    pub const fn new(index: usize, length: usize) -> Self {
        Self { index, length }
    }
}

/// One sequencing unit: a single read or a read pair.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub tile: u32,
    pub id: u64,
    pub reads: Vec<Read>,
}

impl Cluster {
    pub fn new(tile: u32, id: u64, reads: Vec<Read>) -> Self {
        Self { tile, id, reads }
    }

    #[inline]
    pub fn read(&self, index: usize) -> &Read {
        &self.reads[index]
    }

    #[inline]
    pub fn is_paired(&self) -> bool {
        self.reads.len() == 2
    }

    /// Layout of this cluster's reads.
    pub fn read_metadata(&self) -> Vec<ReadMetadata> {
        self.reads
            .iter()
            .enumerate()
            .map(|(i, r)| ReadMetadata::new(i, r.len()))
            .collect()
    }
}
