//! Byte arena of serialized fragment records and the handles pointing into it.
//!
//! A [`FragmentIndex`] is a set of offsets plus a cached copy of the fields needed
//! for ordering. Handles stay valid while the buffer bytes are not rewritten; moving
//! or growing the buffer is fine since nothing holds a pointer.
//!
//! The cached position must never drift from the record. The only mutation path,
//! [`PackedFragmentBuffer::commit_realignment`], updates the record, the handle and
//! the mate's record together.

use std::cmp::Ordering;

use super::fragment_record::{FragmentRecord, FragmentView, FragmentViewMut, RecordError};
use crate::core::cigar;
use crate::core::reference::ReferencePosition;

/// Handle to one record of a [`PackedFragmentBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentIndex {
    /// Cached record position
    pub position: ReferencePosition,
    pub data_offset: usize,
    /// Equal to `data_offset` when the mate is not in this buffer
    pub mate_data_offset: usize,
    /// Absolute offset of the CIGAR slot
    pub cigar_offset: usize,
    pub cigar_length: usize,
    pub tile: u32,
    pub cluster_id: u64,
    pub reverse: bool,
    pub unmapped: bool,
    pub second_read: bool,
}

impl FragmentIndex {
    /// Handle for the record at `data_offset` whose mate record lives at `mate_data_offset`.
    pub fn new(view: &FragmentView<'_>, data_offset: usize, mate_data_offset: usize) -> Self {
        Self {
            position: view.position(),
            data_offset,
            mate_data_offset,
            cigar_offset: data_offset + view.cigar_slot_offset(),
            cigar_length: view.cigar_length(),
            tile: view.tile(),
            cluster_id: view.cluster_id(),
            reverse: view.is_reverse(),
            unmapped: view.is_unmapped(),
            second_read: view.is_second_read(),
        }
    }

    #[inline]
    pub fn has_mate(&self) -> bool {
        self.mate_data_offset != self.data_offset
    }
}

/// Strict weak order of records for BAM output: position, then cluster, then the
/// aligned record before its unaligned shadow, then read 1 before read 2.
pub fn bam_ordering(a: &FragmentIndex, b: &FragmentIndex) -> Ordering {
    a.position
        .cmp(&b.position)
        .then_with(|| (a.tile, a.cluster_id).cmp(&(b.tile, b.cluster_id)))
        .then_with(|| a.unmapped.cmp(&b.unmapped))
        .then_with(|| a.second_read.cmp(&b.second_read))
}

#[inline]
pub fn order_for_bam(a: &FragmentIndex, b: &FragmentIndex) -> bool {
    bam_ordering(a, b) == Ordering::Less
}

/// Contiguous serialized records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedFragmentBuffer {
    data: Vec<u8>,
}

impl PackedFragmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-filled buffer to be filled through [`Self::as_mut_bytes`].
    pub fn zeroed(length: usize) -> Self {
        Self {
            data: vec![0; length],
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Append a record and return its offset.
    pub fn push_record(&mut self, record: &FragmentRecord) -> usize {
        let offset = self.data.len();
        self.data.resize(offset + record.serialized_len(), 0);
        record.write_to(&mut self.data[offset..]);
        offset
    }

    pub fn try_view(&self, offset: usize) -> Result<FragmentView<'_>, RecordError> {
        let Some(bytes) = self.data.get(offset..) else {
            return Err(RecordError::Truncated {
                needed: offset,
                available: self.data.len(),
            });
        };
        FragmentView::new(bytes)
    }

    /// Record at `offset`. Panics when the offset does not start a valid record.
    pub fn view(&self, offset: usize) -> FragmentView<'_> {
        match self.try_view(offset) {
            Ok(view) => view,
            Err(e) => panic!("no fragment record at offset {offset}: {e}"),
        }
    }

    pub fn get_fragment(&self, index: &FragmentIndex) -> FragmentView<'_> {
        self.view(index.data_offset)
    }

    pub fn get_mate(&self, index: &FragmentIndex) -> FragmentView<'_> {
        self.view(index.mate_data_offset)
    }

    /// Handle of the record at `data_offset`.
    pub fn index_at(&self, data_offset: usize, mate_data_offset: usize) -> FragmentIndex {
        FragmentIndex::new(&self.view(data_offset), data_offset, mate_data_offset)
    }

    /// Handles of every record in storage order, each without mate linkage.
    pub fn scan(&self) -> Result<Vec<FragmentIndex>, RecordError> {
        let mut indexes = Vec::new();
        let mut offset = 0;
        while offset < self.data.len() {
            let view = self.try_view(offset)?;
            indexes.push(FragmentIndex::new(&view, offset, offset));
            offset += view.record_len();
        }
        Ok(indexes)
    }

    /// CIGAR operations as seen through the handle.
    pub fn cigar(&self, index: &FragmentIndex) -> Vec<u32> {
        let at = index.cigar_offset;
        (0..index.cigar_length)
            .map(|i| {
                let b = &self.data[at + 4 * i..at + 4 * i + 4];
                u32::from_le_bytes([b[0], b[1], b[2], b[3]])
            })
            .collect()
    }

    /// True when the handle's cached fields match the record.
    pub fn is_synchronized(&self, index: &FragmentIndex) -> bool {
        let view = self.get_fragment(index);
        view.position() == index.position
            && view.cigar_length() == index.cigar_length
            && index.cigar_offset == index.data_offset + view.cigar_slot_offset()
    }

    /// Refresh the handle's cached fields from the record.
    pub fn resync(&self, index: &mut FragmentIndex) {
        *index = FragmentIndex::new(&self.get_fragment(index), index.data_offset, index.mate_data_offset);
    }

    /// Store a new alignment for the record behind `index`.
    ///
    /// Record, handle and the mate record's mate position change together. Panics
    /// when the CIGAR exceeds the slot reserved for the record.
    pub fn commit_realignment(
        &mut self,
        index: &mut FragmentIndex,
        position: ReferencePosition,
        ops: &[u32],
        mismatch_count: u32,
        edit_distance: u32,
    ) {
        assert!(!index.unmapped, "realigning an unmapped record");
        let mut record = FragmentViewMut::new(&mut self.data[index.data_offset..]);
        record.set_position(position);
        record.set_cigar(ops);
        record.set_mismatch_count(mismatch_count.min(u16::MAX as u32) as u16);
        record.set_edit_distance(edit_distance.min(u16::MAX as u32) as u16);

        if index.has_mate() {
            let mut mate = FragmentViewMut::new(&mut self.data[index.mate_data_offset..]);
            mate.set_mate_position(position);
            // an unaligned shadow sits at its singleton's position
            if mate.view().is_unmapped() {
                mate.set_position(position);
                mate.set_mate_position(position);
            }
        }

        index.position = position;
        index.cigar_length = ops.len();
        log::trace!(
            "committed {} {} at offset {}",
            position,
            cigar::to_string(ops),
            index.data_offset
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::fragment_record::flags;

    fn record(offset: i64, cluster_id: u64, flags: u16) -> FragmentRecord {
        FragmentRecord {
            position: ReferencePosition::new(0, offset),
            mate_position: ReferencePosition::new(0, offset),
            cluster_id,
            tile: 1,
            barcode: 0,
            flags,
            mapq: 60,
            mismatch_count: 0,
            edit_distance: 0,
            bases: b"ACGTACGT".to_vec(),
            qualities: vec![30; 8],
            cigar: cigar::parse("8M").unwrap(),
            cigar_capacity: 4,
        }
    }

    #[test]
    fn test_scan_and_has_mate() {
        let mut buffer = PackedFragmentBuffer::new();
        let a = buffer.push_record(&record(100, 1, flags::PAIRED | flags::FIRST_IN_PAIR));
        let b = buffer.push_record(&record(300, 1, flags::PAIRED | flags::SECOND_IN_PAIR));
        let single = buffer.push_record(&record(500, 2, 0));

        let indexes = buffer.scan().unwrap();
        assert_eq!(indexes.len(), 3);
        assert_eq!(indexes[1].data_offset, b);
        assert!(indexes.iter().all(|i| !i.has_mate()));

        let paired = buffer.index_at(a, b);
        assert!(paired.has_mate());
        assert_eq!(buffer.get_mate(&paired).as_bytes(), buffer.view(b).as_bytes());
        assert!(!buffer.index_at(single, single).has_mate());
    }

    #[test]
    fn test_shadow_sorts_after_singleton() {
        let mut buffer = PackedFragmentBuffer::new();
        let shadow = buffer.push_record(&record(
            100,
            7,
            flags::PAIRED | flags::FIRST_IN_PAIR | flags::UNMAPPED,
        ));
        let singleton = buffer.push_record(&record(
            100,
            7,
            flags::PAIRED | flags::SECOND_IN_PAIR | flags::MATE_UNMAPPED,
        ));
        let shadow = buffer.index_at(shadow, singleton);
        let singleton = buffer.index_at(singleton, shadow.data_offset);
        assert!(order_for_bam(&singleton, &shadow));
        assert!(!order_for_bam(&shadow, &singleton));
        assert!(!order_for_bam(&shadow, &shadow));
    }

    #[test]
    fn test_commit_realignment_keeps_index_in_sync() {
        let mut buffer = PackedFragmentBuffer::new();
        let a = buffer.push_record(&record(100, 1, flags::PAIRED | flags::FIRST_IN_PAIR));
        let b = buffer.push_record(&record(300, 1, flags::PAIRED | flags::SECOND_IN_PAIR));
        let mut index = buffer.index_at(a, b);

        let ops = cigar::parse("3M2I3M").unwrap();
        buffer.commit_realignment(&mut index, ReferencePosition::new(0, 98), &ops, 0, 2);

        assert!(buffer.is_synchronized(&index));
        assert_eq!(index.position, ReferencePosition::new(0, 98));
        assert_eq!(buffer.cigar(&index), ops);
        assert_eq!(buffer.get_fragment(&index).edit_distance(), 2);
        assert_eq!(buffer.view(b).mate_position(), ReferencePosition::new(0, 98));

        let mut stale = index;
        stale.position = ReferencePosition::new(0, 100);
        assert!(!buffer.is_synchronized(&stale));
        buffer.resync(&mut stale);
        assert_eq!(stale, index);
    }
}
