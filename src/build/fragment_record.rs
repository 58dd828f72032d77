//! Serialized form of one aligned (or unaligned) read.
//!
//! # Record layout
//!
//! All integers little-endian. Records are padded to a multiple of 8 bytes so that
//! consecutive records in a [`PackedFragmentBuffer`](super::packed_buffer::PackedFragmentBuffer)
//! keep their headers aligned.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0-7     8     position (packed ReferencePosition)
//! 8-15    8     mate position (packed ReferencePosition)
//! 16-23   8     cluster id
//! 24-27   4     tile
//! 28-31   4     barcode index
//! 32-33   2     flags
//! 34      1     mapping quality (255 = unknown)
//! 35      1     reserved
//! 36-37   2     mismatch count
//! 38-39   2     edit distance
//! 40-43   4     read length (L)
//! 44-45   2     CIGAR length (operations in use)
//! 46-47   2     CIGAR capacity (operations reserved)
//! 48      L     bases, forward strand
//! 48+L    L     qualities, forward strand
//! 48+2L   4*C   CIGAR slot (BAM-packed u32 per operation)
//! ```

use thiserror::Error;

use crate::alignment::bam_template::BamTemplate;
use crate::core::cigar::{Cigar, CigarOp};
use crate::core::cluster::Cluster;
use crate::core::reference::ReferencePosition;
use crate::defaults::{REALIGNMENT_CIGAR_SLACK, UNKNOWN_MAPQ};
use crate::utils::reverse_complement;

pub const HEADER_SIZE: usize = 48;
const RECORD_ALIGNMENT: usize = 8;

const POSITION: usize = 0;
const MATE_POSITION: usize = 8;
const CLUSTER_ID: usize = 16;
const TILE: usize = 24;
const BARCODE: usize = 28;
const FLAGS: usize = 32;
const MAPQ: usize = 34;
const MISMATCHES: usize = 36;
const EDIT_DISTANCE: usize = 38;
const READ_LENGTH: usize = 40;
const CIGAR_LENGTH: usize = 44;
const CIGAR_CAPACITY: usize = 46;

/// Record flag bits (BAM values).
pub mod flags {
    pub const PAIRED: u16 = 0x1;
    pub const PROPER_PAIR: u16 = 0x2;
    pub const UNMAPPED: u16 = 0x4;
    pub const MATE_UNMAPPED: u16 = 0x8;
    pub const REVERSE: u16 = 0x10;
    pub const MATE_REVERSE: u16 = 0x20;
    pub const FIRST_IN_PAIR: u16 = 0x40;
    pub const SECOND_IN_PAIR: u16 = 0x80;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("invalid CIGAR opcode {opcode} in operation {index}")]
    InvalidCigarOp { index: usize, opcode: u32 },

    #[error("invalid base {base:#04x} at read offset {offset}")]
    InvalidBase { offset: usize, base: u8 },

    #[error("CIGAR length {length} exceeds reserved capacity {capacity}")]
    CigarOverflow { length: usize, capacity: usize },
}

/// Bytes taken by a record with the given read length and CIGAR capacity.
#[inline]
pub fn record_length(read_length: usize, cigar_capacity: usize) -> usize {
    let raw = HEADER_SIZE + 2 * read_length + 4 * cigar_capacity;
    raw.div_ceil(RECORD_ALIGNMENT) * RECORD_ALIGNMENT
}

#[inline]
fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[inline]
fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

#[inline]
fn write_u16(bytes: &mut [u8], at: usize, value: u16) {
    bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn write_u64(bytes: &mut [u8], at: usize, value: u64) {
    bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// Owned record contents, ready to be written into a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRecord {
    pub position: ReferencePosition,
    pub mate_position: ReferencePosition,
    pub cluster_id: u64,
    pub tile: u32,
    pub barcode: u32,
    pub flags: u16,
    pub mapq: u8,
    pub mismatch_count: u16,
    pub edit_distance: u16,
    pub bases: Vec<u8>,
    pub qualities: Vec<u8>,
    pub cigar: Vec<u32>,
    pub cigar_capacity: usize,
}

impl FragmentRecord {
    /// Record of read `read_index` of a built template.
    ///
    /// Unaligned shadows take the position of their aligned mate so that the pair
    /// stays adjacent in position order.
    pub fn from_template(
        template: &BamTemplate,
        read_index: usize,
        cigars: &Cigar,
        cluster: &Cluster,
        barcode: u32,
    ) -> Self {
        let fragment = template.fragment(read_index);
        let read = cluster.read(read_index);
        let mate = if template.is_paired() {
            Some(template.fragment(1 - read_index))
        } else {
            None
        };
        let aligned = fragment.is_aligned();
        let mate_aligned = mate.is_some_and(|m| m.is_aligned());

        let mut bits = 0u16;
        if let Some(mate) = mate {
            bits |= flags::PAIRED;
            bits |= if read_index == 0 {
                flags::FIRST_IN_PAIR
            } else {
                flags::SECOND_IN_PAIR
            };
            if template.properly_paired {
                bits |= flags::PROPER_PAIR;
            }
            if !mate_aligned {
                bits |= flags::MATE_UNMAPPED;
            } else if mate.reverse {
                bits |= flags::MATE_REVERSE;
            }
        }
        if !aligned {
            bits |= flags::UNMAPPED;
        } else if fragment.reverse {
            bits |= flags::REVERSE;
        }

        let position = match (aligned, mate) {
            (true, _) => fragment.position,
            (false, Some(m)) if mate_aligned => m.position,
            _ => ReferencePosition::NoMatch,
        };
        let mate_position = match mate {
            Some(m) if mate_aligned => m.position,
            Some(_) => position,
            None => ReferencePosition::NoMatch,
        };

        let (bases, qualities) = if aligned && fragment.reverse {
            (
                reverse_complement(&read.bases),
                read.qualities.iter().rev().copied().collect(),
            )
        } else {
            (read.bases.clone(), read.qualities.clone())
        };
        let cigar: Vec<u32> = if aligned {
            fragment.cigar(cigars).to_vec()
        } else {
            Vec::new()
        };
        let cigar_capacity = if aligned {
            cigar.len() + REALIGNMENT_CIGAR_SLACK
        } else {
            0
        };

        Self {
            position,
            mate_position,
            cluster_id: cluster.id,
            tile: cluster.tile,
            barcode,
            flags: bits,
            mapq: fragment
                .alignment_score
                .map_or(UNKNOWN_MAPQ, |s| s.min(UNKNOWN_MAPQ as u32 - 1) as u8),
            mismatch_count: fragment.mismatch_count.min(u16::MAX as u32) as u16,
            edit_distance: fragment.edit_distance.min(u16::MAX as u32) as u16,
            bases,
            qualities,
            cigar,
            cigar_capacity,
        }
    }

    #[inline]
    pub fn serialized_len(&self) -> usize {
        record_length(self.bases.len(), self.cigar_capacity)
    }

    /// Write into `out`, which must be exactly [`Self::serialized_len`] bytes.
    pub fn write_to(&self, out: &mut [u8]) {
        assert_eq!(out.len(), self.serialized_len(), "record slot has the wrong size");
        assert!(
            self.cigar.len() <= self.cigar_capacity,
            "CIGAR of {} operations does not fit {} reserved",
            self.cigar.len(),
            self.cigar_capacity
        );
        assert_eq!(self.bases.len(), self.qualities.len());

        let read_length = self.bases.len();
        write_u64(out, POSITION, self.position.to_packed());
        write_u64(out, MATE_POSITION, self.mate_position.to_packed());
        write_u64(out, CLUSTER_ID, self.cluster_id);
        write_u32(out, TILE, self.tile);
        write_u32(out, BARCODE, self.barcode);
        write_u16(out, FLAGS, self.flags);
        out[MAPQ] = self.mapq;
        out[MAPQ + 1] = 0;
        write_u16(out, MISMATCHES, self.mismatch_count);
        write_u16(out, EDIT_DISTANCE, self.edit_distance);
        write_u32(out, READ_LENGTH, read_length as u32);
        write_u16(out, CIGAR_LENGTH, self.cigar.len() as u16);
        write_u16(out, CIGAR_CAPACITY, self.cigar_capacity as u16);

        let bases_at = HEADER_SIZE;
        out[bases_at..bases_at + read_length].copy_from_slice(&self.bases);
        out[bases_at + read_length..bases_at + 2 * read_length].copy_from_slice(&self.qualities);
        let cigar_at = HEADER_SIZE + 2 * read_length;
        for (i, &op) in self.cigar.iter().enumerate() {
            write_u32(out, cigar_at + 4 * i, op);
        }
        out[cigar_at + 4 * self.cigar.len()..].fill(0);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.serialized_len()];
        self.write_to(&mut bytes);
        bytes
    }
}

/// Zero-copy read access to a serialized record.
#[derive(Debug, Clone, Copy)]
pub struct FragmentView<'a> {
    bytes: &'a [u8],
}

impl<'a> FragmentView<'a> {
    /// Validate the record at the start of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Result<Self, RecordError> {
        if bytes.len() < HEADER_SIZE {
            return Err(RecordError::Truncated {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }
        let read_length = read_u32(bytes, READ_LENGTH) as usize;
        let cigar_length = read_u16(bytes, CIGAR_LENGTH) as usize;
        let cigar_capacity = read_u16(bytes, CIGAR_CAPACITY) as usize;
        if cigar_length > cigar_capacity {
            return Err(RecordError::CigarOverflow {
                length: cigar_length,
                capacity: cigar_capacity,
            });
        }
        let needed = record_length(read_length, cigar_capacity);
        if bytes.len() < needed {
            return Err(RecordError::Truncated {
                needed,
                available: bytes.len(),
            });
        }
        let view = Self {
            bytes: &bytes[..needed],
        };
        if let Some((offset, &base)) = view
            .bases()
            .iter()
            .enumerate()
            .find(|(_, b)| !matches!(b, b'A' | b'C' | b'G' | b'T' | b'N'))
        {
            return Err(RecordError::InvalidBase { offset, base });
        }
        for (index, op) in view.cigar_ops().enumerate() {
            let opcode = op & 0xf;
            if CigarOp::from_code(opcode).is_none() {
                return Err(RecordError::InvalidCigarOp { index, opcode });
            }
        }
        Ok(view)
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn record_len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn position(&self) -> ReferencePosition {
        ReferencePosition::from_packed(read_u64(self.bytes, POSITION))
    }

    #[inline]
    pub fn mate_position(&self) -> ReferencePosition {
        ReferencePosition::from_packed(read_u64(self.bytes, MATE_POSITION))
    }

    #[inline]
    pub fn cluster_id(&self) -> u64 {
        read_u64(self.bytes, CLUSTER_ID)
    }

    #[inline]
    pub fn tile(&self) -> u32 {
        read_u32(self.bytes, TILE)
    }

    #[inline]
    pub fn barcode(&self) -> u32 {
        read_u32(self.bytes, BARCODE)
    }

    #[inline]
    pub fn flags(&self) -> u16 {
        read_u16(self.bytes, FLAGS)
    }

    #[inline]
    pub fn mapq(&self) -> u8 {
        self.bytes[MAPQ]
    }

    #[inline]
    pub fn mismatch_count(&self) -> u16 {
        read_u16(self.bytes, MISMATCHES)
    }

    #[inline]
    pub fn edit_distance(&self) -> u16 {
        read_u16(self.bytes, EDIT_DISTANCE)
    }

    #[inline]
    pub fn read_length(&self) -> usize {
        read_u32(self.bytes, READ_LENGTH) as usize
    }

    #[inline]
    pub fn cigar_length(&self) -> usize {
        read_u16(self.bytes, CIGAR_LENGTH) as usize
    }

    #[inline]
    pub fn cigar_capacity(&self) -> usize {
        read_u16(self.bytes, CIGAR_CAPACITY) as usize
    }

    pub fn bases(&self) -> &'a [u8] {
        &self.bytes[HEADER_SIZE..HEADER_SIZE + self.read_length()]
    }

    pub fn qualities(&self) -> &'a [u8] {
        let length = self.read_length();
        &self.bytes[HEADER_SIZE + length..HEADER_SIZE + 2 * length]
    }

    /// Byte offset of the CIGAR slot within the record.
    #[inline]
    pub fn cigar_slot_offset(&self) -> usize {
        HEADER_SIZE + 2 * self.read_length()
    }

    pub fn cigar_ops(&self) -> impl Iterator<Item = u32> + 'a {
        let at = self.cigar_slot_offset();
        let bytes = self.bytes;
        (0..self.cigar_length()).map(move |i| read_u32(bytes, at + 4 * i))
    }

    pub fn cigar(&self) -> Vec<u32> {
        self.cigar_ops().collect()
    }

    #[inline]
    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags() & flag != 0
    }

    #[inline]
    pub fn is_unmapped(&self) -> bool {
        self.has_flag(flags::UNMAPPED)
    }

    #[inline]
    pub fn is_reverse(&self) -> bool {
        self.has_flag(flags::REVERSE)
    }

    #[inline]
    pub fn is_second_read(&self) -> bool {
        self.has_flag(flags::SECOND_IN_PAIR)
    }
}

/// In-place updates of a serialized record.
pub struct FragmentViewMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> FragmentViewMut<'a> {
    /// `bytes` must start with a record previously validated through [`FragmentView`].
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn view(&self) -> FragmentView<'_> {
        FragmentView { bytes: &*self.bytes }
    }

    pub fn set_position(&mut self, position: ReferencePosition) {
        write_u64(self.bytes, POSITION, position.to_packed());
    }

    pub fn set_mate_position(&mut self, position: ReferencePosition) {
        write_u64(self.bytes, MATE_POSITION, position.to_packed());
    }

    pub fn set_mismatch_count(&mut self, count: u16) {
        write_u16(self.bytes, MISMATCHES, count);
    }

    pub fn set_edit_distance(&mut self, distance: u16) {
        write_u16(self.bytes, EDIT_DISTANCE, distance);
    }

    /// Replace the CIGAR within the reserved slot. Panics when it does not fit.
    pub fn set_cigar(&mut self, ops: &[u32]) {
        let capacity = read_u16(self.bytes, CIGAR_CAPACITY) as usize;
        assert!(
            ops.len() <= capacity,
            "CIGAR of {} operations overflows the {} reserved",
            ops.len(),
            capacity
        );
        let at = HEADER_SIZE + 2 * read_u32(self.bytes, READ_LENGTH) as usize;
        for (i, &op) in ops.iter().enumerate() {
            write_u32(self.bytes, at + 4 * i, op);
        }
        self.bytes[at + 4 * ops.len()..at + 4 * capacity].fill(0);
        write_u16(self.bytes, CIGAR_LENGTH, ops.len() as u16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::fragment::FragmentMetadata;
    use crate::core::cigar;
    use crate::core::cluster::Read;

    fn sample() -> FragmentRecord {
        FragmentRecord {
            position: ReferencePosition::new(2, 1000),
            mate_position: ReferencePosition::new(2, 1200),
            cluster_id: 77,
            tile: 1101,
            barcode: 3,
            flags: flags::PAIRED | flags::FIRST_IN_PAIR,
            mapq: 60,
            mismatch_count: 1,
            edit_distance: 1,
            bases: b"ACGTN".to_vec(),
            qualities: vec![30, 31, 32, 33, 2],
            cigar: cigar::parse("5M").unwrap(),
            cigar_capacity: 3,
        }
    }

    #[test]
    fn test_record_length_is_aligned() {
        assert_eq!(record_length(0, 0), HEADER_SIZE);
        assert_eq!(record_length(5, 3), 72);
        assert_eq!(record_length(5, 3) % RECORD_ALIGNMENT, 0);
    }

    #[test]
    fn test_view_reads_back_fields() {
        let record = sample();
        let bytes = record.to_bytes();
        let view = FragmentView::new(&bytes).unwrap();
        assert_eq!(view.position(), record.position);
        assert_eq!(view.mate_position(), record.mate_position);
        assert_eq!(view.cluster_id(), 77);
        assert_eq!(view.tile(), 1101);
        assert_eq!(view.barcode(), 3);
        assert_eq!(view.mapq(), 60);
        assert_eq!(view.bases(), b"ACGTN");
        assert_eq!(view.qualities(), &[30, 31, 32, 33, 2]);
        assert_eq!(cigar::to_string(&view.cigar()), "5M");
        assert_eq!(view.cigar_capacity(), 3);
        assert!(!view.is_unmapped());
        assert!(!view.is_second_read());
        assert_eq!(view.record_len(), bytes.len());
    }

    #[test]
    fn test_view_rejects_corrupt_records() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            FragmentView::new(&bytes[..20]),
            Err(RecordError::Truncated { needed: HEADER_SIZE, .. })
        ));
        assert!(matches!(
            FragmentView::new(&bytes[..60]),
            Err(RecordError::Truncated { .. })
        ));

        let mut bad_base = bytes.clone();
        bad_base[HEADER_SIZE + 1] = b'x';
        assert_eq!(
            FragmentView::new(&bad_base).unwrap_err(),
            RecordError::InvalidBase { offset: 1, base: b'x' }
        );

        let mut bad_op = bytes.clone();
        bad_op[HEADER_SIZE + 10] = 0x5f;
        assert_eq!(
            FragmentView::new(&bad_op).unwrap_err(),
            RecordError::InvalidCigarOp { index: 0, opcode: 0xf }
        );
    }

    #[test]
    fn test_update_in_place() {
        let mut bytes = sample().to_bytes();
        let mut record = FragmentViewMut::new(&mut bytes);
        record.set_position(ReferencePosition::new(2, 998));
        record.set_cigar(&cigar::parse("2M1I2M").unwrap());
        record.set_mismatch_count(0);
        assert_eq!(record.view().position(), ReferencePosition::new(2, 998));
        let view = FragmentView::new(&bytes).unwrap();
        assert_eq!(cigar::to_string(&view.cigar()), "2M1I2M");
        assert_eq!(view.mismatch_count(), 0);
    }

    #[test]
    #[should_panic(expected = "overflows")]
    fn test_cigar_overflow_panics() {
        let mut bytes = sample().to_bytes();
        FragmentViewMut::new(&mut bytes).set_cigar(&cigar::parse("1M1I1M1I1S").unwrap());
    }

    #[test]
    fn test_from_template_shadow_takes_mate_position() {
        let mut template = BamTemplate::new(2);
        let mut cigars = Cigar::new();
        let (offset, length) = cigars.append(&cigar::parse("4M").unwrap());
        let mut singleton = FragmentMetadata::new(0, ReferencePosition::new(0, 40), true);
        singleton.cigar_offset = offset;
        singleton.cigar_length = length;
        singleton.alignment_score = Some(37);
        template.set_fragment(singleton);
        let cluster = Cluster::new(
            5,
            12,
            vec![Read::with_quality(*b"AACC", 30), Read::with_quality(*b"GGTT", 20)],
        );

        let first = FragmentRecord::from_template(&template, 0, &cigars, &cluster, 0);
        assert_eq!(first.bases, b"GGTT");
        assert_eq!(first.mapq, 37);
        assert_eq!(first.mate_position, ReferencePosition::new(0, 40));
        assert_ne!(first.flags & flags::MATE_UNMAPPED, 0);
        assert_ne!(first.flags & flags::REVERSE, 0);
        assert_eq!(first.cigar_capacity, 1 + REALIGNMENT_CIGAR_SLACK);

        let shadow = FragmentRecord::from_template(&template, 1, &cigars, &cluster, 0);
        assert_eq!(shadow.position, ReferencePosition::new(0, 40));
        assert_ne!(shadow.flags & flags::UNMAPPED, 0);
        assert_ne!(shadow.flags & flags::SECOND_IN_PAIR, 0);
        assert_eq!(shadow.mapq, UNKNOWN_MAPQ);
        assert!(shadow.cigar.is_empty());
        assert_eq!(shadow.bases, b"GGTT");
    }
}
