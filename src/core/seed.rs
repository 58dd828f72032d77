//! Seeds and the matches the seed matcher produces for them.

use std::fmt;

use super::reference::ReferencePosition;

/// Identifies the seed a match came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeedId {
    pub tile: u32,
    pub cluster: u64,
    /// Index into the [`SeedMetadata`] list of the run.
    pub seed: u32,
    /// The seed matched the reverse strand.
    pub reverse: bool,
}

impl SeedId {
    pub const fn new(tile: u32, cluster: u64, seed: u32, reverse: bool) -> Self {
        Self {
            tile,
            cluster,
            seed,
            reverse,
        }
    }
}

impl fmt::Display for SeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SeedId({}:{}:{}{})",
            self.tile,
            self.cluster,
            self.seed,
            if self.reverse { "r" } else { "f" }
        )
    }
}

/// Where a seed sits within its read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedMetadata {
    pub index: u32,
    pub read_index: usize,
    /// Offset of the first seed base in the read (forward orientation).
    pub offset: u32,
    pub length: u32,
}

impl SeedMetadata {
    pub const fn new(index: u32, read_index: usize, offset: u32, length: u32) -> Self {
        Self {
            index,
            read_index,
            offset,
            length,
        }
    }
}

/// The atomic output of seed search: a seed and one reference location for it.
///
/// For forward matches the location is the reference position of the first seed
/// base; for reverse matches it is the leftmost reference position of the reverse
/// complemented seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub seed_id: SeedId,
    pub location: ReferencePosition,
}

impl Match {
    pub const fn new(seed_id: SeedId, location: ReferencePosition) -> Self {
        Self { seed_id, location }
    }

    #[inline]
    pub const fn seed_id(&self) -> SeedId {
        self.seed_id
    }

    #[inline]
    pub const fn is_no_match(&self) -> bool {
        self.location.is_no_match()
    }

    #[inline]
    pub const fn is_too_many_match(&self) -> bool {
        self.location.is_too_many_match()
    }

    /// True if the match carries no position information.
    #[inline]
    pub const fn is_uninformative(&self) -> bool {
        !self.location.is_position()
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Match({}, {})", self.seed_id, self.location)
    }
}
