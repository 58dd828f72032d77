//! Genomic bins of the fragment store.
//!
//! The reference is cut into fixed-size bins per contig, plus one trailing bin for
//! unaligned clusters. Worker threads claim byte ranges in a bin under a short lock;
//! the ranges are then filled without synchronization.

use parking_lot::Mutex;

use crate::core::reference::{ContigList, ReferencePosition};

/// One bin and the space claimed in it so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinMetadata {
    pub index: usize,
    /// `None` for the unaligned bin
    pub contig: Option<u32>,
    pub begin: i64,
    pub end: i64,
    /// Bytes claimed by stored records
    pub data_size: usize,
    pub record_count: usize,
}

impl BinMetadata {
    #[inline]
    pub fn is_unaligned_bin(&self) -> bool {
        self.contig.is_none()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn covers(&self, position: ReferencePosition) -> bool {
        match position {
            ReferencePosition::Position { contig, offset } => {
                self.contig == Some(contig) && (self.begin..self.end).contains(&offset)
            }
            _ => self.is_unaligned_bin(),
        }
    }

    /// Reserve `bytes` and return their offset within the bin's buffer.
    fn claim(&mut self, bytes: usize) -> usize {
        let offset = self.data_size;
        self.data_size += bytes;
        self.record_count += 1;
        offset
    }
}

#[derive(Debug, Clone, Default)]
pub struct BinMetadataList {
    bins: Vec<BinMetadata>,
    first_bin_of_contig: Vec<usize>,
    bin_size: u64,
}

impl BinMetadataList {
    pub fn for_contigs(contigs: &ContigList, bin_size: u64) -> Self {
        assert!(bin_size > 0, "bin size must be positive");
        let mut bins = Vec::new();
        let mut first_bin_of_contig = Vec::with_capacity(contigs.len());
        for contig in contigs.iter() {
            first_bin_of_contig.push(bins.len());
            let length = contig.len() as i64;
            let mut begin = 0i64;
            loop {
                let end = (begin + bin_size as i64).min(length);
                bins.push(BinMetadata {
                    index: bins.len(),
                    contig: Some(contig.index),
                    begin,
                    end,
                    data_size: 0,
                    record_count: 0,
                });
                begin = end;
                if begin >= length {
                    break;
                }
            }
        }
        bins.push(BinMetadata {
            index: bins.len(),
            contig: None,
            begin: 0,
            end: 0,
            data_size: 0,
            record_count: 0,
        });
        Self {
            bins,
            first_bin_of_contig,
            bin_size,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BinMetadata> {
        self.bins.iter()
    }

    #[inline]
    pub fn get(&self, index: usize) -> &BinMetadata {
        &self.bins[index]
    }

    #[inline]
    pub fn unaligned_bin_index(&self) -> usize {
        self.bins.len() - 1
    }

    /// Bin holding records at `position`; sentinels map to the unaligned bin.
    pub fn bin_for(&self, position: ReferencePosition) -> usize {
        let ReferencePosition::Position { contig, offset } = position else {
            return self.unaligned_bin_index();
        };
        let first = self.first_bin_of_contig[contig as usize];
        let last = self
            .first_bin_of_contig
            .get(contig as usize + 1)
            .copied()
            .unwrap_or(self.unaligned_bin_index())
            - 1;
        let index = first + (offset.max(0) as u64 / self.bin_size) as usize;
        index.min(last)
    }

    /// Forget all claims, keeping the bin layout.
    pub fn clear_usage(&mut self) {
        for bin in &mut self.bins {
            bin.data_size = 0;
            bin.record_count = 0;
        }
    }
}

/// Shared claim point for worker threads.
#[derive(Debug, Default)]
pub struct BinReservations {
    bins: Mutex<BinMetadataList>,
}

impl BinReservations {
    pub fn new(bins: BinMetadataList) -> Self {
        Self {
            bins: Mutex::new(bins),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bins.lock().len()
    }

    /// Claim `bytes` in the bin of each `position` under one lock.
    ///
    /// Returns `(bin, offset within the bin)` per request.
    pub fn claim(&self, requests: &[(ReferencePosition, usize)]) -> Vec<(usize, usize)> {
        let mut bins = self.bins.lock();
        requests
            .iter()
            .map(|&(position, bytes)| {
                let bin = bins.bin_for(position);
                (bin, bins.bins[bin].claim(bytes))
            })
            .collect()
    }

    /// Current claims; usage is reset for the next round.
    pub fn take(&self) -> BinMetadataList {
        let mut bins = self.bins.lock();
        let snapshot = bins.clone();
        bins.clear_usage();
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reference::Contig;

    fn contigs() -> ContigList {
        ContigList::new(vec![
            Contig::new(0, "chr1", vec![b'A'; 250]),
            Contig::new(1, "chr2", vec![b'C'; 100]),
        ])
    }

    #[test]
    fn test_bin_layout() {
        let bins = BinMetadataList::for_contigs(&contigs(), 100);
        // chr1: 3 bins, chr2: 1 bin, unaligned
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.bin_for(ReferencePosition::new(0, 0)), 0);
        assert_eq!(bins.bin_for(ReferencePosition::new(0, 199)), 1);
        assert_eq!(bins.bin_for(ReferencePosition::new(0, 249)), 2);
        assert_eq!(bins.bin_for(ReferencePosition::new(1, 99)), 3);
        assert_eq!(bins.bin_for(ReferencePosition::NoMatch), 4);
        assert!(bins.get(2).covers(ReferencePosition::new(0, 200)));
        assert!(bins.get(4).is_unaligned_bin());
    }

    #[test]
    fn test_claims_are_disjoint() {
        let reservations = BinReservations::new(BinMetadataList::for_contigs(&contigs(), 100));
        let chr1 = ReferencePosition::new(0, 10);
        let chr2 = ReferencePosition::new(1, 10);
        assert_eq!(reservations.claim(&[(chr1, 64), (chr1, 72)]), vec![(0, 0), (0, 64)]);
        assert_eq!(reservations.claim(&[(chr1, 8), (chr2, 16)]), vec![(0, 136), (3, 0)]);
        assert_eq!(reservations.bin_count(), 5);

        let taken = reservations.take();
        assert_eq!(taken.get(0).data_size, 144);
        assert_eq!(taken.get(0).record_count, 3);
        assert_eq!(reservations.take().get(0).data_size, 0);
    }
}
