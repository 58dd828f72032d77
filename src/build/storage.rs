//! Fragment storage: templates in, position-ordered bins out.
//!
//! `store` is called concurrently by the template building workers. It serializes the
//! reads, claims their space in the bins and queues the records. `flush` is the barrier
//! after which every bin buffer is filled in parallel and its index sorted for output.

use parking_lot::Mutex;
use rayon::prelude::*;

use super::bin_metadata::{BinMetadata, BinMetadataList, BinReservations};
use super::fragment_record::FragmentRecord;
use super::packed_buffer::{FragmentIndex, PackedFragmentBuffer, bam_ordering};
use crate::alignment::bam_template::BamTemplate;
use crate::core::cigar::Cigar;
use crate::core::cluster::Cluster;
use crate::core::reference::ContigList;
use crate::defaults::BIN_SIZE;

/// Consumer of finished templates.
pub trait FragmentStorage: Sync {
    fn store(&self, template: &BamTemplate, cigars: &Cigar, cluster: &Cluster, barcode: u32);
}

/// One flushed bin: records in storage order and handles in BAM order.
#[derive(Debug, Clone)]
pub struct StoredBin {
    pub metadata: BinMetadata,
    pub buffer: PackedFragmentBuffer,
    pub indexes: Vec<FragmentIndex>,
}

#[derive(Debug)]
struct PendingRecord {
    record: FragmentRecord,
    offset: usize,
    /// Offset of the mate record when it landed in the same bin
    mate_offset: Option<usize>,
}

pub struct BinnedFragmentStorage {
    keep_unaligned: bool,
    reservations: BinReservations,
    pending: Mutex<Vec<Vec<PendingRecord>>>,
}

impl BinnedFragmentStorage {
    pub fn with_default_bins(contigs: &ContigList, keep_unaligned: bool) -> Self {
        Self::new(contigs, BIN_SIZE, keep_unaligned)
    }

    pub fn new(contigs: &ContigList, bin_size: u64, keep_unaligned: bool) -> Self {
        let bins = BinMetadataList::for_contigs(contigs, bin_size);
        let pending = (0..bins.len()).map(|_| Vec::new()).collect();
        Self {
            keep_unaligned,
            reservations: BinReservations::new(bins),
            pending: Mutex::new(pending),
        }
    }

    /// Fill every non-empty bin and return them in genomic order.
    ///
    /// Storage is empty again afterwards.
    pub fn flush(&self) -> Vec<StoredBin> {
        let metadata = self.reservations.take();
        let pending = {
            let mut pending = self.pending.lock();
            let fresh = (0..pending.len()).map(|_| Vec::new()).collect();
            std::mem::replace(&mut *pending, fresh)
        };

        let work: Vec<(BinMetadata, Vec<PendingRecord>)> = metadata
            .iter()
            .cloned()
            .zip(pending)
            .filter(|(bin, _)| !bin.is_empty())
            .collect();

        let bins: Vec<StoredBin> = work
            .into_par_iter()
            .map(|(metadata, records)| {
                let mut buffer = PackedFragmentBuffer::zeroed(metadata.data_size);
                let bytes = buffer.as_mut_bytes();
                for pending in &records {
                    let length = pending.record.serialized_len();
                    pending
                        .record
                        .write_to(&mut bytes[pending.offset..pending.offset + length]);
                }
                let mut indexes: Vec<FragmentIndex> = records
                    .iter()
                    .map(|p| buffer.index_at(p.offset, p.mate_offset.unwrap_or(p.offset)))
                    .collect();
                indexes.sort_by(bam_ordering);
                StoredBin {
                    metadata,
                    buffer,
                    indexes,
                }
            })
            .collect();

        let records: usize = bins.iter().map(|b| b.indexes.len()).sum();
        log::info!("flushed {} record(s) in {} bin(s)", records, bins.len());
        bins
    }
}

impl FragmentStorage for BinnedFragmentStorage {
    fn store(&self, template: &BamTemplate, cigars: &Cigar, cluster: &Cluster, barcode: u32) {
        if template.is_unaligned() && !self.keep_unaligned {
            return;
        }
        let records: Vec<FragmentRecord> = (0..template.fragment_count())
            .map(|read_index| FragmentRecord::from_template(template, read_index, cigars, cluster, barcode))
            .collect();
        let requests: Vec<_> = records
            .iter()
            .map(|r| (r.position, r.serialized_len()))
            .collect();
        let claims = self.reservations.claim(&requests);

        let mut pending = self.pending.lock();
        for (read_index, (record, &(bin, offset))) in records.into_iter().zip(&claims).enumerate() {
            let mate_offset = if template.is_paired() {
                let (mate_bin, mate_offset) = claims[1 - read_index];
                (mate_bin == bin).then_some(mate_offset)
            } else {
                None
            };
            pending[bin].push(PendingRecord {
                record,
                offset,
                mate_offset,
            });
        }
    }
}
