// PE adapter trimming module
//
// When the insert is shorter than the reads, each mate reads through into the adapter
// past the 5' end of the other mate. The overhanging bases are soft clipped:
// - forward mate: anything beyond the reverse mate's unclipped end
// - reverse mate: anything before the forward mate's unclipped start

use crate::alignment::fragment::FragmentMetadata;
use crate::alignment::oracle::FragmentBuildContext;
use crate::core::cigar::{self, Cigar, CigarOp};
use crate::core::cluster::Cluster;
use crate::opt::AlignmentCfg;

/// Operations of `ops` cut after `keep` reference bases, the rest soft clipped.
///
/// Indels left dangling at the cut are folded into the clip. `None` when nothing
/// aligned would remain.
pub fn clip_right(ops: &[u32], keep: u32) -> Option<Vec<u32>> {
    if keep == 0 {
        return None;
    }
    let mut out = Vec::with_capacity(ops.len() + 1);
    let mut consumed = 0u32;
    let mut clipped = 0u32;
    let mut clipping = false;
    for &word in ops {
        let (len, op) = cigar::decode(word);
        if clipping {
            if op.consumes_query() {
                clipped += len;
            }
            continue;
        }
        match op {
            CigarOp::M | CigarOp::Eq | CigarOp::X => {
                let kept = len.min(keep - consumed);
                cigar::push_merged(&mut out, kept, op);
                clipped += len - kept;
                consumed += kept;
                clipping = consumed == keep;
            }
            CigarOp::D | CigarOp::N => {
                if consumed + len < keep {
                    cigar::push_merged(&mut out, len, op);
                    consumed += len;
                } else {
                    clipping = true;
                }
            }
            _ => cigar::push_merged(&mut out, len, op),
        }
    }
    while let Some(&last) = out.last() {
        let (len, op) = cigar::decode(last);
        match op {
            CigarOp::I => clipped += len,
            CigarOp::D | CigarOp::N => {}
            _ => break,
        }
        out.pop();
    }
    if !out.iter().any(|&w| cigar::decode(w).1.is_aligned()) {
        return None;
    }
    cigar::push_merged(&mut out, clipped, CigarOp::S);
    Some(out)
}

/// Mirror of [`clip_right`]: keeps the last `keep` reference bases.
pub fn clip_left(ops: &[u32], keep: u32) -> Option<Vec<u32>> {
    let reversed: Vec<u32> = ops.iter().rev().copied().collect();
    let mut clipped = clip_right(&reversed, keep)?;
    clipped.reverse();
    Some(clipped)
}

/// Soft clip adapter read-through of a properly paired FR template in place.
///
/// Trimmed fragments get fresh CIGARs in `cigar_buffer` and are rescored; the
/// operations of the originals are left untouched. Returns true if anything changed.
pub fn trim_pe_adapters(
    cfg: &AlignmentCfg,
    context: &FragmentBuildContext<'_>,
    cluster: &Cluster,
    pair: &mut [FragmentMetadata; 2],
    cigar_buffer: &mut Cigar,
) -> bool {
    if pair[0].reverse == pair[1].reverse || !pair[0].position.same_contig(&pair[1].position) {
        return false;
    }
    let (fi, ri) = if pair[0].reverse { (1, 0) } else { (0, 1) };
    let forward = pair[fi];
    let reverse = pair[ri];
    if forward.unclipped_position() >= reverse.unclipped_end_position() {
        return false;
    }
    let Some(contig) = forward.position.contig().and_then(|c| context.contigs.get(c)) else {
        return false;
    };

    let mut trimmed = false;
    let forward_limit = reverse.unclipped_end_position();
    if forward.end_position() > forward_limit {
        let keep = forward.position.distance_to(&forward_limit).unwrap_or(0);
        if keep > 0 {
            if let Some(ops) = clip_right(forward.cigar(cigar_buffer), keep as u32) {
                let (offset, length) = cigar_buffer.append(&ops);
                let mut clipped = forward;
                clipped.set_cigar(
                    cfg,
                    contig,
                    cluster.read(forward.read_index),
                    cigar_buffer,
                    offset,
                    length,
                );
                clipped.anchored = clipped.is_anchored_by(context.annotations, cigar_buffer);
                log::trace!("adapter trimmed {} to {}", forward, clipped);
                pair[fi] = clipped;
                trimmed = true;
            }
        }
    }

    let reverse_limit = forward.unclipped_position();
    if reverse.position < reverse_limit {
        let dropped = reverse.position.distance_to(&reverse_limit).unwrap_or(0);
        let keep = reverse.observed_length as i64 - dropped;
        if keep > 0 {
            if let Some(ops) = clip_left(reverse.cigar(cigar_buffer), keep as u32) {
                let span = cigar::reference_length(&ops) as i64;
                let (offset, length) = cigar_buffer.append(&ops);
                let mut clipped = reverse;
                clipped.position = reverse.end_position() - span;
                clipped.set_cigar(
                    cfg,
                    contig,
                    cluster.read(reverse.read_index),
                    cigar_buffer,
                    offset,
                    length,
                );
                clipped.anchored = clipped.is_anchored_by(context.annotations, cigar_buffer);
                log::trace!("adapter trimmed {} to {}", reverse, clipped);
                pair[ri] = clipped;
                trimmed = true;
            }
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::template_length::TemplateLengthStatistics;
    use crate::core::cluster::{Read, ReadMetadata};
    use crate::core::reference::{Contig, ContigAnnotations, ContigList, ReferencePosition};
    use crate::utils::reverse_complement;

    fn ops(s: &str) -> Vec<u32> {
        cigar::parse(s).unwrap()
    }

    #[test]
    fn test_clip_right() {
        assert_eq!(cigar::to_string(&clip_right(&ops("50M"), 40).unwrap()), "40M10S");
        assert_eq!(cigar::to_string(&clip_right(&ops("5S45M"), 40).unwrap()), "5S40M5S");
        // deletion straddling the cut is dropped
        assert_eq!(cigar::to_string(&clip_right(&ops("20M2D30M"), 21).unwrap()), "20M30S");
        // insertion right at the cut joins the clip
        assert_eq!(cigar::to_string(&clip_right(&ops("20M3I30M"), 20).unwrap()), "20M33S");
        assert!(clip_right(&ops("10S40M"), 0).is_none());
    }

    #[test]
    fn test_clip_left() {
        assert_eq!(cigar::to_string(&clip_left(&ops("50M"), 40).unwrap()), "10S40M");
        assert_eq!(cigar::to_string(&clip_left(&ops("30M2D20M"), 21).unwrap()), "30S20M");
    }

    #[test]
    fn test_trim_read_through() {
        let sequence: Vec<u8> = b"ACGTTGCAAGCT".iter().copied().cycle().take(300).collect();
        let contigs = ContigList::new(vec![Contig::new(0, "chr1", sequence.clone())]);
        let annotations = ContigAnnotations::default();
        let read_metadata = [ReadMetadata::new(0, 50), ReadMetadata::new(1, 50)];
        let tls = TemplateLengthStatistics::default();
        let context = FragmentBuildContext {
            contigs: &contigs,
            annotations: &annotations,
            read_metadata: &read_metadata,
            seed_metadata: &[],
            adapters: &[],
            template_length_statistics: &tls,
        };
        let cluster = Cluster::new(
            1,
            3,
            vec![
                Read::with_quality(&sequence[100..150], 30),
                Read::with_quality(reverse_complement(&sequence[90..140]), 30),
            ],
        );
        let cfg = AlignmentCfg::default();
        let mut buffer = Cigar::new();
        let (offset, length) = buffer.append(&ops("50M"));
        let mut pair = [
            FragmentMetadata::new(0, ReferencePosition::new(0, 100), false),
            FragmentMetadata::new(1, ReferencePosition::new(0, 90), true),
        ];
        for fragment in &mut pair {
            let read = cluster.read(fragment.read_index);
            fragment.set_cigar(&cfg, contigs.get(0).unwrap(), read, &buffer, offset, length);
        }
        let original = pair;

        assert!(trim_pe_adapters(&cfg, &context, &cluster, &mut pair, &mut buffer));
        assert_eq!(cigar::to_string(pair[0].cigar(&buffer)), "40M10S");
        assert_eq!(pair[0].position, ReferencePosition::new(0, 100));
        assert_eq!(cigar::to_string(pair[1].cigar(&buffer)), "10S40M");
        assert_eq!(pair[1].position, ReferencePosition::new(0, 100));
        assert_eq!(pair[0].mismatch_count, 0);
        assert_eq!(pair[1].mismatch_count, 0);
        // originals keep their operations
        assert_eq!(cigar::to_string(original[0].cigar(&buffer)), "50M");

        // nothing left to trim
        assert!(!trim_pe_adapters(&cfg, &context, &cluster, &mut pair, &mut buffer));
    }
}
