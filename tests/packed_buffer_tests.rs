// Packed fragment buffer: BAM ordering properties over a seeded random sample,
// record round trips through the byte arena and handle synchronization.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ferrous_template::build::fragment_record::{FragmentRecord, RecordError, flags};
use ferrous_template::build::packed_buffer::{
    FragmentIndex, PackedFragmentBuffer, bam_ordering, order_for_bam,
};
use ferrous_template::core::cigar;
use ferrous_template::core::reference::ReferencePosition;

fn random_record(rng: &mut StdRng) -> FragmentRecord {
    // few distinct values so that ties are common
    let position = if rng.gen_bool(0.1) {
        ReferencePosition::NoMatch
    } else {
        ReferencePosition::new(rng.gen_range(0..2), rng.gen_range(0..5))
    };
    let mut bits = flags::PAIRED;
    bits |= if rng.gen_bool(0.5) {
        flags::SECOND_IN_PAIR
    } else {
        flags::FIRST_IN_PAIR
    };
    if rng.gen_bool(0.3) {
        bits |= flags::UNMAPPED;
    }
    let length = rng.gen_range(1..12);
    FragmentRecord {
        position,
        mate_position: position,
        cluster_id: rng.gen_range(0..4),
        tile: rng.gen_range(1..3),
        barcode: 0,
        flags: bits,
        mapq: 60,
        mismatch_count: 0,
        edit_distance: 0,
        bases: (0..length).map(|_| b"ACGTN"[rng.gen_range(0..5)]).collect(),
        qualities: (0..length).map(|_| rng.gen_range(2..41)).collect(),
        cigar: cigar::parse(&format!("{length}M")).unwrap(),
        cigar_capacity: 3,
    }
}

fn random_buffer(seed: u64, count: usize) -> (Vec<FragmentRecord>, PackedFragmentBuffer) {
    let mut rng = StdRng::seed_from_u64(seed);
    let records: Vec<FragmentRecord> = (0..count).map(|_| random_record(&mut rng)).collect();
    let mut buffer = PackedFragmentBuffer::new();
    for record in &records {
        buffer.push_record(record);
    }
    (records, buffer)
}

#[test]
fn test_order_for_bam_is_strict_weak_order() {
    let (_, buffer) = random_buffer(0x5eed, 60);
    let indexes = buffer.scan().unwrap();

    let equivalent = |a: &FragmentIndex, b: &FragmentIndex| !order_for_bam(a, b) && !order_for_bam(b, a);
    for a in &indexes {
        assert!(!order_for_bam(a, a), "irreflexive");
        for b in &indexes {
            if order_for_bam(a, b) {
                assert!(!order_for_bam(b, a), "asymmetric");
            }
            for c in &indexes {
                if order_for_bam(a, b) && order_for_bam(b, c) {
                    assert!(order_for_bam(a, c), "transitive");
                }
                if equivalent(a, b) && equivalent(b, c) {
                    assert!(equivalent(a, c), "transitive incomparability");
                }
            }
        }
    }
}

#[test]
fn test_sorted_indexes_follow_bam_rules() {
    let (_, buffer) = random_buffer(17, 200);
    let mut indexes = buffer.scan().unwrap();
    indexes.sort_by(bam_ordering);

    for pair in indexes.windows(2) {
        assert_ne!(bam_ordering(&pair[0], &pair[1]), Ordering::Greater);
        assert!(pair[0].position <= pair[1].position);
    }
    // sentinel positions sort after every real position
    let first_unplaced = indexes
        .iter()
        .position(|i| !i.position.is_position())
        .unwrap_or(indexes.len());
    assert!(indexes[first_unplaced..].iter().all(|i| !i.position.is_position()));
}

#[test]
fn test_records_round_trip_through_buffer() {
    let (records, buffer) = random_buffer(99, 40);
    let indexes = buffer.scan().unwrap();
    assert_eq!(indexes.len(), records.len());

    for (index, record) in indexes.iter().zip(&records) {
        let view = buffer.get_fragment(index);
        assert_eq!(view.position(), record.position);
        assert_eq!(view.cluster_id(), record.cluster_id);
        assert_eq!(view.tile(), record.tile);
        assert_eq!(view.bases(), record.bases.as_slice());
        assert_eq!(view.qualities(), record.qualities.as_slice());
        assert_eq!(view.cigar(), record.cigar);
        assert_eq!(buffer.cigar(index), record.cigar);
        assert_eq!(view.cigar_capacity(), record.cigar_capacity);
        assert_eq!(index.unmapped, record.flags & flags::UNMAPPED != 0);
        assert_eq!(index.second_read, record.flags & flags::SECOND_IN_PAIR != 0);
        assert!(!index.has_mate());
        assert!(buffer.is_synchronized(index));
    }
}

#[test]
fn test_truncated_buffer_is_an_error() {
    let (_, buffer) = random_buffer(3, 2);
    let bytes = buffer.as_bytes();
    let truncated = PackedFragmentBuffer::from_bytes(bytes[..bytes.len() - 1].to_vec());
    assert!(matches!(
        truncated.scan(),
        Err(RecordError::Truncated { .. })
    ));
}

#[test]
fn test_commit_updates_mate_and_handle_together() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut first = random_record(&mut rng);
    first.position = ReferencePosition::new(0, 1000);
    first.flags = flags::PAIRED | flags::FIRST_IN_PAIR;
    first.bases = b"ACGTACGTAC".to_vec();
    first.qualities = vec![30; 10];
    first.cigar = cigar::parse("10M").unwrap();
    let mut second = first.clone();
    second.position = ReferencePosition::new(0, 1200);
    second.flags = flags::PAIRED | flags::SECOND_IN_PAIR;

    let mut buffer = PackedFragmentBuffer::new();
    let a = buffer.push_record(&first);
    let b = buffer.push_record(&second);
    let mut index = buffer.index_at(a, b);
    let mate = buffer.index_at(b, a);

    let ops = cigar::parse("4M1D6M").unwrap();
    buffer.commit_realignment(&mut index, ReferencePosition::new(0, 995), &ops, 1, 2);

    assert!(buffer.is_synchronized(&index));
    assert!(buffer.is_synchronized(&mate));
    assert_eq!(index.position, ReferencePosition::new(0, 995));
    assert_eq!(buffer.get_fragment(&index).mismatch_count(), 1);
    assert_eq!(buffer.get_mate(&index).mate_position(), ReferencePosition::new(0, 995));
    assert_eq!(buffer.get_mate(&index).position(), ReferencePosition::new(0, 1200));
    assert!(order_for_bam(&index, &mate));
}

#[test]
#[should_panic(expected = "overflows")]
fn test_commit_past_reserved_cigar_panics() {
    let mut rng = StdRng::seed_from_u64(8);
    let mut record = random_record(&mut rng);
    record.flags = 0;
    record.position = ReferencePosition::new(0, 10);
    record.bases = b"ACGTACGT".to_vec();
    record.qualities = vec![30; 8];
    record.cigar = cigar::parse("8M").unwrap();
    let mut buffer = PackedFragmentBuffer::new();
    let offset = buffer.push_record(&record);
    let mut index = buffer.index_at(offset, offset);

    // five operations do not fit the three reserved
    let ops = cigar::parse("1M1I1M1I4M").unwrap();
    buffer.commit_realignment(&mut index, ReferencePosition::new(0, 10), &ops, 0, 2);
}
