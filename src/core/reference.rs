//! Reference coordinates, contigs and k-uniqueness annotations.
//!
//! `ReferencePosition` is a tagged value: a real `(contig, offset)` location or one
//! of the two seed-matcher sentinels. Sentinels are never shifted and never
//! compared as real coordinates by the template builder.

use std::fmt;
use std::ops::{Add, Sub};

/// A location on the forward strand of the reference, or a seed-matcher sentinel.
///
/// Ordering is total: real positions compare by contig then offset and every real
/// position sorts before `NoMatch`, which sorts before `TooManyMatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferencePosition {
    Position { contig: u32, offset: i64 },
    /// The seed did not hit the reference.
    NoMatch,
    /// The seed hit the reference too many times to be informative.
    TooManyMatch,
}

impl ReferencePosition {
    #[inline]
    pub const fn new(contig: u32, offset: i64) -> Self {
        Self::Position { contig, offset }
    }

    #[inline]
    pub const fn no_match() -> Self {
        Self::NoMatch
    }

    #[inline]
    pub const fn too_many_match() -> Self {
        Self::TooManyMatch
    }

    #[inline]
    pub const fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch)
    }

    #[inline]
    pub const fn is_too_many_match(&self) -> bool {
        matches!(self, Self::TooManyMatch)
    }

    /// True for a real coordinate (neither sentinel).
    #[inline]
    pub const fn is_position(&self) -> bool {
        matches!(self, Self::Position { .. })
    }

    #[inline]
    pub const fn contig(&self) -> Option<u32> {
        match self {
            Self::Position { contig, .. } => Some(*contig),
            _ => None,
        }
    }

    #[inline]
    pub const fn offset(&self) -> Option<i64> {
        match self {
            Self::Position { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Shift the offset within the same contig.
    ///
    /// Panics on a sentinel: shifting "no information" is an upstream contract breach.
    #[inline]
    pub fn shifted(self, delta: i64) -> Self {
        match self {
            Self::Position { contig, offset } => Self::Position {
                contig,
                offset: offset + delta,
            },
            sentinel => panic!("cannot shift sentinel reference position {sentinel}"),
        }
    }

    /// Signed distance `other - self` when both are real positions on the same contig.
    #[inline]
    pub fn distance_to(&self, other: &Self) -> Option<i64> {
        match (self, other) {
            (
                Self::Position { contig: a, offset: x },
                Self::Position { contig: b, offset: y },
            ) if a == b => Some(y - x),
            _ => None,
        }
    }

    #[inline]
    pub fn same_contig(&self, other: &Self) -> bool {
        matches!((self.contig(), other.contig()), (Some(a), Some(b)) if a == b)
    }

    /// Single-word encoding used by serialized records and gaps: contig in the high
    /// 24 bits, offset in the low 40. Sentinels take the two largest values so the
    /// packed order matches `Ord`.
    pub fn to_packed(&self) -> u64 {
        match *self {
            Self::Position { contig, offset } => {
                assert!(
                    (0..=Self::MAX_PACKED_OFFSET).contains(&offset),
                    "offset {offset} cannot be packed"
                );
                ((contig as u64) << Self::OFFSET_BITS) | offset as u64
            }
            Self::NoMatch => Self::PACKED_NO_MATCH,
            Self::TooManyMatch => Self::PACKED_TOO_MANY_MATCH,
        }
    }

    pub fn from_packed(packed: u64) -> Self {
        match packed {
            Self::PACKED_NO_MATCH => Self::NoMatch,
            Self::PACKED_TOO_MANY_MATCH => Self::TooManyMatch,
            _ => Self::Position {
                contig: (packed >> Self::OFFSET_BITS) as u32,
                offset: (packed & Self::MAX_PACKED_OFFSET as u64) as i64,
            },
        }
    }

    const OFFSET_BITS: u32 = 40;
    const MAX_PACKED_OFFSET: i64 = (1 << Self::OFFSET_BITS) - 1;
    const PACKED_NO_MATCH: u64 = u64::MAX - 1;
    const PACKED_TOO_MANY_MATCH: u64 = u64::MAX;
}

impl Add<i64> for ReferencePosition {
    type Output = Self;

    fn add(self, rhs: i64) -> Self {
        self.shifted(rhs)
    }
}

impl Sub<i64> for ReferencePosition {
    type Output = Self;

    fn sub(self, rhs: i64) -> Self {
        self.shifted(-rhs)
    }
}

impl fmt::Display for ReferencePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position { contig, offset } => write!(f, "{contig}:{offset}"),
            Self::NoMatch => write!(f, "no-match"),
            Self::TooManyMatch => write!(f, "too-many-match"),
        }
    }
}

/// A reference sequence, stored as upper-case ASCII bases.
#[derive(Debug, Clone)]
pub struct Contig {
    pub index: u32,
    pub name: String,
    pub forward: Vec<u8>,
}

impl Contig {
    pub fn new(index: u32, name: impl Into<String>, forward: impl Into<Vec<u8>>) -> Self {
        let mut forward = forward.into();
        forward.make_ascii_uppercase();
        Self {
            index,
            name: name.into(),
            forward,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Base at `offset`, or `None` outside the contig.
    #[inline]
    pub fn base(&self, offset: i64) -> Option<u8> {
        if offset < 0 {
            return None;
        }
        self.forward.get(offset as usize).copied()
    }
}

/// Contigs indexed by karyotype order. `contigs[i].index == i` always holds.
#[derive(Debug, Clone, Default)]
pub struct ContigList {
    contigs: Vec<Contig>,
}

impl ContigList {
    pub fn new(contigs: Vec<Contig>) -> Self {
        for (i, contig) in contigs.iter().enumerate() {
            assert_eq!(
                contig.index as usize, i,
                "Unexpected order of preallocated contigs or index collision"
            );
        }
        Self { contigs }
    }

    #[inline]
    pub fn get(&self, index: u32) -> Option<&Contig> {
        self.contigs.get(index as usize)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contig> {
        self.contigs.iter()
    }

    /// Total number of bases over all contigs.
    pub fn genome_length(&self) -> u64 {
        self.contigs.iter().map(|c| c.len() as u64).sum()
    }

    /// True when `[begin, end)` lies inside the contig of `pos`.
    pub fn contains_span(&self, pos: ReferencePosition, length: i64) -> bool {
        match pos {
            ReferencePosition::Position { contig, offset } => self
                .get(contig)
                .is_some_and(|c| offset >= 0 && offset + length <= c.len() as i64),
            _ => false,
        }
    }
}

/// Per-position k-uniqueness: for each reference offset, the length of the shortest
/// k-mer starting there that occurs only once in the genome. `u16::MAX` means
/// "not unique at any annotated length".
///
/// An empty annotation disables anchoring checks: every alignment is treated as anchored.
#[derive(Debug, Clone, Default)]
pub struct ContigAnnotations {
    per_contig: Vec<Vec<u16>>,
}

impl ContigAnnotations {
    pub const NOT_UNIQUE: u16 = u16::MAX;

    pub fn new(per_contig: Vec<Vec<u16>>) -> Self {
        Self { per_contig }
    }

    /// Same k-uniqueness value at every position of every contig.
    pub fn uniform(contigs: &ContigList, value: u16) -> Self {
        Self {
            per_contig: contigs.iter().map(|c| vec![value; c.len()]).collect(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.per_contig.is_empty()
    }

    /// Unique k-mer length at a position; positions without annotation are not unique.
    #[inline]
    pub fn unique_length(&self, contig: u32, offset: i64) -> u16 {
        if offset < 0 {
            return Self::NOT_UNIQUE;
        }
        self.per_contig
            .get(contig as usize)
            .and_then(|v| v.get(offset as usize))
            .copied()
            .unwrap_or(Self::NOT_UNIQUE)
    }

    /// Overwrite the annotation of `[begin, end)` on one contig.
    pub fn set_range(&mut self, contig: u32, begin: usize, end: usize, value: u16) {
        let values = &mut self.per_contig[contig as usize];
        let end = end.min(values.len());
        values[begin..end].fill(value);
    }
}
