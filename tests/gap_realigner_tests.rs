// Gap realignment end to end: templates stored into bins, flushed, realigned.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ferrous_template::alignment::bam_template::BamTemplate;
use ferrous_template::alignment::fragment::FragmentMetadata;
use ferrous_template::build::gap_realigner::{RealignStats, realign_bins};
use ferrous_template::build::storage::{BinnedFragmentStorage, FragmentStorage, StoredBin};
use ferrous_template::core::cigar::{self, Cigar};
use ferrous_template::core::cluster::{Cluster, Read};
use ferrous_template::core::reference::{Contig, ContigList, ReferencePosition};
use ferrous_template::opt::AlignmentCfg;

const HOMOPOLYMER: std::ops::Range<usize> = 150..156;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Random sequence with a run of six A at 150, bounded by C and G.
fn contigs() -> ContigList {
    let mut rng = StdRng::seed_from_u64(23);
    let mut reference: Vec<u8> = (0..300).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect();
    reference[HOMOPOLYMER].fill(b'A');
    reference[HOMOPOLYMER.start - 1] = b'C';
    reference[HOMOPOLYMER.end] = b'G';
    ContigList::new(vec![Contig::new(0, "chr1", reference)])
}

/// Read from 130 with two extra A in the homopolymer.
fn long_read(contig: &Contig) -> Vec<u8> {
    let mut bases = contig.forward[130..150].to_vec();
    bases.extend_from_slice(b"AAAAAAAA");
    bases.extend_from_slice(&contig.forward[156..170]);
    bases
}

fn store(
    storage: &BinnedFragmentStorage,
    contig: &Contig,
    id: u64,
    bases: Vec<u8>,
    offset: i64,
    cigar_text: &str,
) {
    let cluster = Cluster::new(1, id, vec![Read::with_quality(bases, 30)]);
    let mut cigars = Cigar::new();
    let (cigar_offset, cigar_length) = cigars.append(&cigar::parse(cigar_text).unwrap());
    let mut fragment = FragmentMetadata::new(0, ReferencePosition::new(0, offset), false);
    fragment.set_cigar(
        &AlignmentCfg::default(),
        contig,
        cluster.read(0),
        &cigars,
        cigar_offset,
        cigar_length,
    );
    fragment.alignment_score = Some(60);
    let mut template = BamTemplate::new(1);
    template.set_fragment(fragment);
    storage.store(&template, &cigars, &cluster, 0);
}

fn filled_bins(contigs: &ContigList) -> Vec<StoredBin> {
    let contig = contigs.get(0).unwrap();
    let storage = BinnedFragmentStorage::new(contigs, 1000, false);
    store(&storage, contig, 1, long_read(contig), 130, "20M2I20M");
    store(&storage, contig, 2, long_read(contig), 130, "20M2I20M");
    store(&storage, contig, 3, long_read(contig), 130, "22M2I18M");
    store(&storage, contig, 4, contig.forward[250..292].to_vec(), 250, "42M");
    storage.flush()
}

#[test]
fn test_minority_insertion_joins_majority() {
    init_logging();
    let contigs = contigs();
    let mut bins = filled_bins(&contigs);
    assert_eq!(bins.len(), 1);

    let stats = realign_bins(&AlignmentCfg::default(), &contigs, &mut bins);
    assert_eq!(
        stats,
        RealignStats {
            untouched: 1,
            considered: 3,
            realigned: 1,
            rejected: 2,
        }
    );

    let bin = &bins[0];
    for index in &bin.indexes {
        assert!(bin.buffer.is_synchronized(index));
        let view = bin.buffer.get_fragment(index);
        let expected = if view.cluster_id() == 4 { "42M" } else { "20M2I20M" };
        assert_eq!(cigar::to_string(&bin.buffer.cigar(index)), expected);
        assert_eq!(view.mismatch_count(), 0);
    }
    let clusters: Vec<u64> = bin.indexes.iter().map(|i| i.cluster_id).collect();
    assert_eq!(clusters, vec![1, 2, 3, 4]);
}

#[test]
fn test_second_pass_changes_nothing() {
    init_logging();
    let contigs = contigs();
    let mut bins = filled_bins(&contigs);
    realign_bins(&AlignmentCfg::default(), &contigs, &mut bins);
    let before: Vec<Vec<u32>> = bins[0]
        .indexes
        .iter()
        .map(|i| bins[0].buffer.cigar(i))
        .collect();

    let stats = realign_bins(&AlignmentCfg::default(), &contigs, &mut bins);
    assert_eq!(stats.realigned, 0);
    assert_eq!(stats.rejected, 3);
    let after: Vec<Vec<u32>> = bins[0]
        .indexes
        .iter()
        .map(|i| bins[0].buffer.cigar(i))
        .collect();
    assert_eq!(before, after);
}
