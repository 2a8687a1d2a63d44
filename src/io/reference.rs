use std::io::BufRead;

use rand::Rng;

use crate::error::{Error, Result};
use crate::index::fm::{Contig, Segment};
use crate::io::fasta::FastaReader;
use crate::util::dna::{self, SIGMA};

/// Linearized reference ready for indexing.
///
/// `seq` holds ranks only; every ambiguous base was replaced by a random real
/// base and remembered in `n_runs` so hits over it can be rejected later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reference {
    pub seq: Vec<u8>,
    pub contigs: Vec<Contig>,
    pub n_runs: Vec<Segment>,
}

impl Reference {
    pub fn from_parts(seq: Vec<u8>, contigs: Vec<Contig>, n_runs: Vec<Segment>) -> Self {
        Self { seq, contigs, n_runs }
    }

    /// Single-contig reference from unambiguous bases.
    pub fn from_ascii(name: &str, bases: &[u8]) -> Result<Self> {
        let seq = dna::encode(bases)?;
        let len = u32::try_from(seq.len()).map_err(|_| Error::ReferenceTooLong(seq.len()))?;
        Ok(Self {
            seq,
            contigs: vec![Contig { name: name.to_string(), len, offset: 0 }],
            n_runs: Vec::new(),
        })
    }

    pub fn from_fasta<R: BufRead, G: Rng>(reader: R, rng: &mut G) -> Result<Self> {
        let mut fasta = FastaReader::new(reader);
        let mut reference = Self::default();
        while let Some(rec) = fasta.next_record()? {
            reference.push_contig(rec.id, &rec.seq, rng)?;
        }
        if reference.seq.is_empty() {
            return Err(Error::EmptyReference);
        }
        Ok(reference)
    }

    /// Appends one contig, filling ambiguous bases from `rng`.
    pub fn push_contig<G: Rng>(&mut self, name: String, bases: &[u8], rng: &mut G) -> Result<()> {
        let total = self.seq.len() + bases.len();
        if total >= u32::MAX as usize {
            return Err(Error::ReferenceTooLong(total));
        }
        let offset = self.seq.len() as u32;
        self.seq.reserve(bases.len());
        for (i, &b) in bases.iter().enumerate() {
            match dna::to_rank(b) {
                Some(r) => self.seq.push(r),
                None => {
                    let pos = offset + i as u32;
                    match self.n_runs.last_mut() {
                        Some(run) if i > 0 && run.end() == pos => run.len += 1,
                        _ => self.n_runs.push(Segment { offset: pos, len: 1 }),
                    }
                    self.seq.push(rng.random_range(0..SIGMA as u8));
                }
            }
        }
        self.contigs.push(Contig { name, len: bases.len() as u32, offset });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// The reverse-complement strand with contig and N tables mirrored.
    pub fn reverse_complement(&self) -> Self {
        let total = self.seq.len() as u32;
        let contigs = self
            .contigs
            .iter()
            .rev()
            .map(|c| Contig { name: c.name.clone(), len: c.len, offset: total - c.offset - c.len })
            .collect();
        let n_runs = self
            .n_runs
            .iter()
            .rev()
            .map(|r| Segment { offset: total - r.end(), len: r.len })
            .collect();
        Self { seq: dna::revcomp_ranks(&self.seq), contigs, n_runs }
    }
}
