pub mod searcher;

use std::io::{BufRead, Write};

use rayon::prelude::*;

use crate::error::Result;
use crate::index::fm::IndexParams;
use crate::io::fastq::{FastqReader, FastqRecord};
use crate::io::sam;

pub use searcher::{Alignment, IndexStrand, Mismatch, MismatchSearcher, SearchOutcome, Strand};

/// Reads handed to the thread pool at once.
const BATCH_SIZE: usize = 4096;

/// Search options shared by every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOpt {
    /// Shortest exact 5' match accepted without seed repair.
    pub min_seed_len: usize,
    /// Reads with more placements are dropped; 0 means unlimited.
    pub max_multi: usize,
    pub allow_mismatch: bool,
    pub threads: usize,
}

impl Default for SearchOpt {
    fn default() -> Self {
        Self { min_seed_len: 18, max_multi: 0, allow_mismatch: true, threads: 1 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignStats {
    pub reads: usize,
    pub aligned: usize,
    pub placements: usize,
    pub unmapped: usize,
    pub repetitive: usize,
}

impl AlignStats {
    fn add(&mut self, outcome: &SearchOutcome) {
        self.reads += 1;
        match outcome {
            SearchOutcome::Aligned(alns) => {
                self.aligned += 1;
                self.placements += alns.len();
            }
            SearchOutcome::Unmapped => self.unmapped += 1,
            SearchOutcome::Repetitive => self.repetitive += 1,
        }
    }
}

/// Aligns a batch on the current rayon pool, preserving input order.
pub fn align_reads(searcher: &MismatchSearcher, reads: &[FastqRecord]) -> Result<Vec<SearchOutcome>> {
    reads.par_iter().map(|rec| searcher.align(&rec.seq)).collect()
}

/// FASTQ in, SAM out.
pub fn align_stream<R: BufRead, W: Write>(searcher: &MismatchSearcher, reads: R, mut out: W) -> Result<AlignStats> {
    sam::write_header(&mut out, searcher.contigs())?;

    let mut reader = FastqReader::new(reads);
    let mut stats = AlignStats::default();
    let mut batch = Vec::with_capacity(BATCH_SIZE);
    loop {
        batch.clear();
        while batch.len() < BATCH_SIZE {
            match reader.next_record()? {
                Some(rec) => batch.push(rec),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let outcomes = align_reads(searcher, &batch)?;
        for (rec, outcome) in batch.iter().zip(&outcomes) {
            stats.add(outcome);
            sam::write_record(&mut out, rec, outcome, searcher.contigs())?;
        }
        log::debug!("{} reads processed", stats.reads);

        if batch.len() < BATCH_SIZE {
            break;
        }
    }
    out.flush()?;
    Ok(stats)
}

/// Loads `<prefix>.table` / `<prefix>.rc_table` and aligns a FASTQ file on
/// a pool of `opt.threads` workers. Writes to stdout when `out_path` is `None`.
pub fn align_fastq_with_opt(
    prefix: &str,
    params: &IndexParams,
    fastq_path: &str,
    out_path: Option<&str>,
    opt: SearchOpt,
) -> Result<AlignStats> {
    let searcher = MismatchSearcher::load(prefix, params, opt)?;

    let fq = std::fs::File::open(fastq_path)?;
    let reads = std::io::BufReader::new(fq);
    let out: Box<dyn Write + Send> = if let Some(p) = out_path {
        Box::new(std::io::BufWriter::new(std::fs::File::create(p)?))
    } else {
        Box::new(std::io::BufWriter::new(std::io::stdout()))
    };

    let pool = rayon::ThreadPoolBuilder::new().num_threads(opt.threads.max(1)).build()?;
    let stats = pool.install(|| align_stream(&searcher, reads, out))?;

    log::info!(
        "{} reads: {} aligned ({} placements), {} unmapped, {} repetitive",
        stats.reads,
        stats.aligned,
        stats.placements,
        stats.unmapped,
        stats.repetitive
    );
    Ok(stats)
}
