//! CIGAR operations - single authoritative implementation
//!
//! Operations are packed BAM-style into a `u32` (`length << 4 | opcode`) so a whole
//! cluster's alignments can share one contiguous [`Cigar`] buffer and fragments can
//! refer to their operations by offset and length.

use std::fmt::Write;

/// CIGAR operation type, discriminant is the BAM opcode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CigarOp {
    M = 0,  // Match/mismatch
    I = 1,  // Insertion to reference
    D = 2,  // Deletion from reference
    N = 3,  // Skipped region
    S = 4,  // Soft clip
    H = 5,  // Hard clip
    P = 6,  // Padding
    Eq = 7, // Sequence match
    X = 8,  // Sequence mismatch
}

impl CigarOp {
    /// Convert from BAM opcode
    #[inline(always)]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::M),
            1 => Some(Self::I),
            2 => Some(Self::D),
            3 => Some(Self::N),
            4 => Some(Self::S),
            5 => Some(Self::H),
            6 => Some(Self::P),
            7 => Some(Self::Eq),
            8 => Some(Self::X),
            _ => None,
        }
    }

    /// Convert from SAM character
    #[inline(always)]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'M' => Some(Self::M),
            b'I' => Some(Self::I),
            b'D' => Some(Self::D),
            b'N' => Some(Self::N),
            b'S' => Some(Self::S),
            b'H' => Some(Self::H),
            b'P' => Some(Self::P),
            b'=' => Some(Self::Eq),
            b'X' => Some(Self::X),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::M => b'M',
            Self::I => b'I',
            Self::D => b'D',
            Self::N => b'N',
            Self::S => b'S',
            Self::H => b'H',
            Self::P => b'P',
            Self::Eq => b'=',
            Self::X => b'X',
        }
    }

    /// Returns true if this operation consumes query bases
    #[inline(always)]
    pub const fn consumes_query(self) -> bool {
        matches!(self, Self::M | Self::I | Self::S | Self::Eq | Self::X)
    }

    /// Returns true if this operation consumes reference bases
    #[inline(always)]
    pub const fn consumes_ref(self) -> bool {
        matches!(self, Self::M | Self::D | Self::N | Self::Eq | Self::X)
    }

    /// Returns true if this operation aligns a read base against a reference base
    #[inline(always)]
    pub const fn is_aligned(self) -> bool {
        matches!(self, Self::M | Self::Eq | Self::X)
    }

    /// Returns true if this operation is a clip (soft or hard)
    #[inline(always)]
    pub const fn is_clip(self) -> bool {
        matches!(self, Self::S | Self::H)
    }
}

/// Pack a length and operation into a BAM CIGAR word.
#[inline(always)]
pub const fn encode(length: u32, op: CigarOp) -> u32 {
    (length << 4) | op as u32
}

/// Unpack a BAM CIGAR word. Panics on an unknown opcode.
#[inline(always)]
pub fn decode(word: u32) -> (u32, CigarOp) {
    match CigarOp::from_code(word & 0xf) {
        Some(op) => (word >> 4, op),
        None => panic!("invalid CIGAR opcode {} in word {word:#x}", word & 0xf),
    }
}

/// Sum of reference-consuming lengths.
pub fn reference_length(ops: &[u32]) -> u32 {
    ops.iter()
        .map(|&w| decode(w))
        .filter(|(_, op)| op.consumes_ref())
        .map(|(len, _)| len)
        .sum()
}

/// Sum of query-consuming lengths.
pub fn query_length(ops: &[u32]) -> u32 {
    ops.iter()
        .map(|&w| decode(w))
        .filter(|(_, op)| op.consumes_query())
        .map(|(len, _)| len)
        .sum()
}

/// Soft clip at the start of the alignment (0 if none).
pub fn begin_clipped_length(ops: &[u32]) -> u32 {
    assert!(!ops.is_empty(), "Unexpected empty CIGAR");
    match decode(ops[0]) {
        (len, CigarOp::S) => len,
        _ => 0,
    }
}

/// Soft clip at the end of the alignment (0 if none).
pub fn end_clipped_length(ops: &[u32]) -> u32 {
    assert!(!ops.is_empty(), "Unexpected empty CIGAR");
    match decode(ops[ops.len() - 1]) {
        (len, CigarOp::S) => len,
        _ => 0,
    }
}

/// Append to `out`, merging with the last operation when the opcode repeats.
/// Zero-length operations are dropped.
pub fn push_merged(out: &mut Vec<u32>, length: u32, op: CigarOp) {
    if length == 0 {
        return;
    }
    if let Some(last) = out.last_mut() {
        let (last_len, last_op) = decode(*last);
        if last_op == op {
            *last = encode(last_len + length, op);
            return;
        }
    }
    out.push(encode(length, op));
}

/// Convert CIGAR to string representation (e.g., "50M2I48M").
pub fn to_string(ops: &[u32]) -> String {
    if ops.is_empty() {
        return "*".to_string();
    }
    let mut result = String::with_capacity(ops.len() * 4);
    for &w in ops {
        let (len, op) = decode(w);
        // Writing to a String cannot fail
        let _ = write!(&mut result, "{}{}", len, op.to_byte() as char);
    }
    result
}

/// Parse a SAM CIGAR string. Returns `None` on malformed input.
pub fn parse(text: &str) -> Option<Vec<u32>> {
    if text == "*" {
        return Some(Vec::new());
    }
    let mut ops = Vec::new();
    let mut len: u32 = 0;
    let mut have_digits = false;
    for b in text.bytes() {
        if b.is_ascii_digit() {
            len = len.checked_mul(10)?.checked_add((b - b'0') as u32)?;
            have_digits = true;
        } else {
            if !have_digits {
                return None;
            }
            ops.push(encode(len, CigarOp::from_byte(b)?));
            len = 0;
            have_digits = false;
        }
    }
    if have_digits { None } else { Some(ops) }
}

/// Upper bound of CIGAR operations a single alignment of a read can need:
/// alternating match/indel per base plus clips on both ends.
pub fn max_operations_for_read(read_length: usize) -> usize {
    read_length * 2 + 3
}

/// Upper bound over all reads of a cluster layout.
pub fn max_operations_for_reads(read_lengths: &[usize]) -> usize {
    read_lengths
        .iter()
        .map(|&l| max_operations_for_read(l))
        .sum()
}

/// Shared CIGAR storage for all fragments built for one cluster.
///
/// Fragments hold `(offset, length)` views into it; the buffer only grows during a
/// build so existing views stay valid until [`Cigar::clear`].
#[derive(Debug, Clone, Default)]
pub struct Cigar {
    ops: Vec<u32>,
}

impl Cigar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.ops.reserve(additional);
    }

    #[inline]
    pub fn push(&mut self, length: u32, op: CigarOp) {
        self.ops.push(encode(length, op));
    }

    /// Append a finished operation list and return its `(offset, length)` view.
    pub fn append(&mut self, ops: &[u32]) -> (usize, usize) {
        let offset = self.ops.len();
        self.ops.extend_from_slice(ops);
        (offset, ops.len())
    }

    /// Operations of one fragment.
    #[inline]
    pub fn slice(&self, offset: usize, length: usize) -> &[u32] {
        &self.ops[offset..offset + length]
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cigar_op_from_byte() {
        assert_eq!(CigarOp::from_byte(b'M'), Some(CigarOp::M));
        assert_eq!(CigarOp::from_byte(b'I'), Some(CigarOp::I));
        assert_eq!(CigarOp::from_byte(b'D'), Some(CigarOp::D));
        assert_eq!(CigarOp::from_byte(b'S'), Some(CigarOp::S));
        assert_eq!(CigarOp::from_byte(b'H'), Some(CigarOp::H));
        assert_eq!(CigarOp::from_byte(b'?'), None);
    }

    #[test]
    fn test_op_consumes() {
        assert!(CigarOp::M.consumes_query());
        assert!(CigarOp::M.consumes_ref());
        assert!(CigarOp::I.consumes_query());
        assert!(!CigarOp::I.consumes_ref());
        assert!(!CigarOp::D.consumes_query());
        assert!(CigarOp::D.consumes_ref());
        assert!(CigarOp::S.consumes_query());
        assert!(!CigarOp::S.consumes_ref());
    }

    #[test]
    fn test_encode_decode() {
        let w = encode(48, CigarOp::D);
        assert_eq!(decode(w), (48, CigarOp::D));
        assert_eq!(w & 0xf, 2);
    }

    #[test]
    #[should_panic(expected = "invalid CIGAR opcode")]
    fn test_decode_rejects_bad_opcode() {
        decode(0xf);
    }

    #[test]
    fn test_reference_and_query_length() {
        // 50M2I48M = 98 ref, 100 query
        let cigar = parse("50M2I48M").unwrap();
        assert_eq!(reference_length(&cigar), 98);
        assert_eq!(query_length(&cigar), 100);

        // 10M5D10M = 25 ref, 20 query
        let cigar = parse("10M5D10M").unwrap();
        assert_eq!(reference_length(&cigar), 25);
        assert_eq!(query_length(&cigar), 20);

        // 5S50M5S = 50 ref, 60 query
        let cigar = parse("5S50M5S").unwrap();
        assert_eq!(reference_length(&cigar), 50);
        assert_eq!(query_length(&cigar), 60);
        assert_eq!(begin_clipped_length(&cigar), 5);
        assert_eq!(end_clipped_length(&cigar), 5);
    }

    #[test]
    fn test_push_merged() {
        let mut ops = Vec::new();
        push_merged(&mut ops, 10, CigarOp::M);
        push_merged(&mut ops, 5, CigarOp::M);
        push_merged(&mut ops, 0, CigarOp::I);
        push_merged(&mut ops, 2, CigarOp::I);
        push_merged(&mut ops, 20, CigarOp::M);
        assert_eq!(to_string(&ops), "15M2I20M");
    }

    #[test]
    fn test_parse_and_to_string() {
        assert_eq!(to_string(&parse("50M2I48M").unwrap()), "50M2I48M");
        assert_eq!(to_string(&[]), "*");
        assert!(parse("M").is_none());
        assert!(parse("10").is_none());
        assert!(parse("10Q").is_none());
        assert_eq!(parse("*"), Some(vec![]));
    }

    #[test]
    fn test_cigar_buffer_views() {
        let mut buffer = Cigar::with_capacity(max_operations_for_reads(&[100, 100]));
        let (o1, l1) = buffer.append(&parse("100M").unwrap());
        let (o2, l2) = buffer.append(&parse("3S97M").unwrap());
        assert_eq!(to_string(buffer.slice(o1, l1)), "100M");
        assert_eq!(to_string(buffer.slice(o2, l2)), "3S97M");
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(max_operations_for_read(100), 203);
    }
}
