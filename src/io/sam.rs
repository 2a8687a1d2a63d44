use std::io::{self, Write};

use crate::align::searcher::{Alignment, SearchOutcome, Strand};
use crate::index::fm::Contig;
use crate::io::fastq::FastqRecord;
use crate::util::dna;

const FLAG_UNMAPPED: u16 = 4;
const FLAG_SECONDARY: u16 = 256;
const MAPQ_UNAVAILABLE: u8 = 255;

/// SAM header (minimal)
pub fn write_header<W: Write>(w: &mut W, contigs: &[Contig]) -> io::Result<()> {
    writeln!(w, "@HD\tVN:1.6\tSO:unsorted")?;
    for c in contigs {
        writeln!(w, "@SQ\tSN:{}\tLN:{}", c.name, c.len)?;
    }
    writeln!(w, "@PG\tID:tailor-fm\tPN:tailor-fm\tVN:{}", env!("CARGO_PKG_VERSION"))
}

/// Matched part anchored at the read's 5' end, tail soft-clipped at the 3' end.
/// On the reverse strand SEQ is reverse-complemented, so the clip comes first.
pub fn cigar(aln: &Alignment) -> String {
    match (aln.strand, aln.tail_len) {
        (_, 0) => format!("{}M", aln.matched_len),
        (Strand::Forward, tail) => format!("{}M{}S", aln.matched_len, tail),
        (Strand::Reverse, tail) => format!("{}S{}M", tail, aln.matched_len),
    }
}

fn qual_or_star(qual: &[u8]) -> String {
    if qual.is_empty() {
        "*".to_string()
    } else {
        String::from_utf8_lossy(qual).into_owned()
    }
}

/// One line per placement; unmapped and repetitive reads get a single FLAG 4 line.
pub fn write_record<W: Write>(
    w: &mut W,
    rec: &FastqRecord,
    outcome: &SearchOutcome,
    contigs: &[Contig],
) -> io::Result<()> {
    let alns = match outcome {
        SearchOutcome::Aligned(alns) if !alns.is_empty() => alns,
        _ => {
            return writeln!(
                w,
                "{}\t{}\t*\t0\t0\t*\t*\t0\t0\t{}\t{}",
                rec.id,
                FLAG_UNMAPPED,
                String::from_utf8_lossy(&rec.seq),
                qual_or_star(&rec.qual),
            );
        }
    };

    let rev_seq = dna::revcomp(&rec.seq);
    let rev_qual: Vec<u8> = rec.qual.iter().rev().copied().collect();

    for (i, aln) in alns.iter().enumerate() {
        let mut flag = aln.strand.sam_flag();
        if i > 0 {
            flag |= FLAG_SECONDARY;
        }
        let (seq, qual) = match aln.strand {
            Strand::Forward => (&rec.seq, &rec.qual),
            Strand::Reverse => (&rev_seq, &rev_qual),
        };
        let rname = contigs.get(aln.reference_id).map_or("*", |c| c.name.as_str());

        write!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t*\t0\t0\t{}\t{}\tNH:i:{}",
            rec.id,
            flag,
            rname,
            aln.offset + 1, // 1-based
            MAPQ_UNAVAILABLE,
            cigar(aln),
            String::from_utf8_lossy(seq),
            qual_or_star(qual),
            alns.len(),
        )?;
        if aln.tail_len > 0 {
            let tail = &rec.seq[aln.matched_len..];
            write!(w, "\tTL:Z:{}", String::from_utf8_lossy(tail))?;
        }
        let mismatches: Vec<String> = aln.mismatches().map(ToString::to_string).collect();
        if !mismatches.is_empty() {
            write!(w, "\tXM:Z:{}", mismatches.join(","))?;
        }
        writeln!(w)?;
    }
    Ok(())
}
