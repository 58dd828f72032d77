//! Indels observed in a bin, as candidates for gap realignment.

use std::fmt;

use crate::core::cigar::{self, CigarOp};
use crate::core::reference::ReferencePosition;

/// One insertion or deletion at a reference position.
///
/// Positive length is a deletion from the reference, negative an insertion into it,
/// zero a plain position marker. `priority` counts how many fragments support the gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Gap {
    pos: u64,
    length: i32,
    priority: u32,
}

const _: () = assert!(std::mem::size_of::<Gap>() == 16);

impl Gap {
    pub const HIGHEST_PRIORITY: u32 = u32::MAX;

    pub fn new(pos: ReferencePosition, length: i32) -> Self {
        Self::with_priority(pos, length, 1)
    }

    pub fn with_priority(pos: ReferencePosition, length: i32, priority: u32) -> Self {
        assert!(pos.is_position(), "gap at sentinel position {pos}");
        Self {
            pos: pos.to_packed(),
            length,
            priority,
        }
    }

    #[inline]
    pub fn position(&self) -> ReferencePosition {
        ReferencePosition::from_packed(self.pos)
    }

    /// Number of bases inserted or deleted.
    #[inline]
    pub fn get_length(&self) -> u32 {
        self.length.unsigned_abs()
    }

    #[inline]
    pub fn signed_length(&self) -> i32 {
        self.length
    }

    #[inline]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    #[inline]
    pub fn is_insertion(&self) -> bool {
        self.length < 0
    }

    #[inline]
    pub fn is_deletion(&self) -> bool {
        self.length > 0
    }

    #[inline]
    pub fn begin_pos(&self) -> ReferencePosition {
        self.position()
    }

    /// First reference position after the gap. Insertions occupy no reference.
    #[inline]
    pub fn end_pos(&self) -> ReferencePosition {
        if self.is_deletion() {
            self.position() + self.length as i64
        } else {
            self.position()
        }
    }

    /// End of a deletion. Panics on anything else.
    pub fn deletion_end_pos(&self) -> ReferencePosition {
        assert!(self.is_deletion(), "deletion end of a non-deletion gap {self}");
        self.end_pos()
    }

    /// Identity of the gap for lookups; priority does not take part.
    #[inline]
    pub fn key(&self) -> (u64, i32) {
        (self.pos, self.length)
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_deletion() {
            'D'
        } else if self.is_insertion() {
            'I'
        } else {
            '-'
        };
        write!(
            f,
            "Gap({} {}{} p={})",
            self.position(),
            self.get_length(),
            kind,
            self.priority
        )
    }
}

/// Half-open range `[first, second)` over a sorted [`Gaps`] sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GapsRange {
    pub first: usize,
    pub second: usize,
}

impl GapsRange {
    #[inline]
    pub fn empty(&self) -> bool {
        self.first == self.second
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.second - self.first
    }
}

/// Gaps sorted by `(position, length)` with duplicates merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gaps {
    gaps: Vec<Gap>,
}

impl Gaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort and merge equal gaps, adding up their priorities.
    pub fn from_unsorted(mut gaps: Vec<Gap>) -> Self {
        gaps.sort_by_key(Gap::key);
        let mut merged: Vec<Gap> = Vec::with_capacity(gaps.len());
        for gap in gaps {
            match merged.last_mut() {
                Some(last) if last.key() == gap.key() => {
                    last.priority = last.priority.saturating_add(gap.priority);
                }
                _ => merged.push(gap),
            }
        }
        Self { gaps: merged }
    }

    /// Gap set of a bin from the CIGARs of its aligned fragments, each observation
    /// counting once towards the priority.
    pub fn collect_from<'a>(
        fragments: impl IntoIterator<Item = (ReferencePosition, &'a [u32])>,
    ) -> Self {
        let mut gaps = Vec::new();
        for (position, ops) in fragments {
            if !position.is_position() {
                continue;
            }
            let mut at = position;
            for &word in ops {
                let (len, op) = cigar::decode(word);
                match op {
                    CigarOp::D => gaps.push(Gap::new(at, len as i32)),
                    CigarOp::I => gaps.push(Gap::new(at, -(len as i32))),
                    _ => {}
                }
                if op.consumes_ref() {
                    at = at + len as i64;
                }
            }
        }
        Self::from_unsorted(gaps)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn as_slice(&self) -> &[Gap] {
        &self.gaps
    }

    #[inline]
    pub fn range(&self, range: GapsRange) -> &[Gap] {
        &self.gaps[range.first..range.second]
    }

    /// Gaps starting within `[begin, end]`.
    pub fn find_range(&self, begin: ReferencePosition, end: ReferencePosition) -> GapsRange {
        let (begin, end) = (begin.to_packed(), end.to_packed());
        let first = self.gaps.partition_point(|g| g.pos < begin);
        let second = first + self.gaps[first..].partition_point(|g| g.pos <= end);
        GapsRange { first, second }
    }

    /// Support of an exact `(position, length)` gap, 0 when it was never observed.
    pub fn priority_of(&self, position: ReferencePosition, length: i32) -> u32 {
        let key = (position.to_packed(), length);
        self.gaps
            .binary_search_by_key(&key, Gap::key)
            .map_or(0, |i| self.gaps[i].priority)
    }
}
