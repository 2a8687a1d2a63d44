use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use tailor_fm::align::{self, SearchOpt};
use tailor_fm::index::builder::build_index;
use tailor_fm::index::fm::{IndexMeta, IndexParams};
use tailor_fm::index::sa::{BucketSorter, MAX_BUCKET_LEN};
use tailor_fm::io::reference::Reference;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "tailor-fm", author, version, about = "FM-index short read search with 3' tail detection", arg_required_else_help = true)]
struct Cli {
    /// -v info, -vv debug, -vvv trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

/// Must match between `index` and `align`.
#[derive(Args, Debug, Clone, Copy)]
struct IndexArgs {
    /// Checkpoint / sampling interval is 2^log_interval
    #[arg(long = "log-interval", default_value_t = 4)]
    log_interval: u32,
    /// k-mer length of the lookup table
    #[arg(long = "lookup-len", default_value_t = 10)]
    lookup_len: u32,
    /// Symbols the suffix sort is guaranteed to order
    #[arg(long = "prefix-len", default_value_t = 256)]
    prefix_len: u32,
}

impl IndexArgs {
    fn params(self) -> Result<IndexParams> {
        Ok(IndexParams::new(self.log_interval, self.lookup_len, self.prefix_len)?)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build forward and reverse-complement indexes of the reference
    Index {
        /// Reference FASTA file
        reference: String,
        /// Output prefix (<prefix>.table, <prefix>.rc_table)
        #[arg(short, long, default_value = "ref")]
        prefix: String,
        #[command(flatten)]
        index: IndexArgs,
        /// Seed for replacing ambiguous bases
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Leading symbols used to split suffixes into sort groups
        #[arg(long = "bucket-len", default_value_t = 4,
              value_parser = clap::value_parser!(u32).range(1..=MAX_BUCKET_LEN as i64))]
        bucket_len: u32,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
    },
    /// Align reads (FASTQ) allowing a seed and a tail mismatch
    Align {
        /// Index prefix given to `index`
        #[arg(short, long, default_value = "ref")]
        prefix: String,
        /// Reads FASTQ file
        reads: String,
        /// Output SAM path (stdout if omitted)
        #[arg(short, long)]
        out: Option<String>,
        #[command(flatten)]
        index: IndexArgs,
        #[arg(long = "min-seed-len", default_value_t = 18)]
        min_seed_len: usize,
        /// Drop reads with more placements (0 = unlimited)
        #[arg(long = "max-multi", default_value_t = 0)]
        max_multi: usize,
        /// Exact matching only
        #[arg(long = "no-mismatch")]
        no_mismatch: bool,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_target(false)
        .init();

    match cli.command {
        Commands::Index { reference, prefix, index, seed, bucket_len, threads } => {
            run_index(&reference, &prefix, index.params()?, seed, bucket_len, threads)
        }
        Commands::Align {
            prefix,
            reads,
            out,
            index,
            min_seed_len,
            max_multi,
            no_mismatch,
            threads,
        } => {
            let opt = SearchOpt { min_seed_len, max_multi, allow_mismatch: !no_mismatch, threads };
            align::align_fastq_with_opt(&prefix, &index.params()?, &reads, out.as_deref(), opt)
                .map_err(|e| anyhow::anyhow!("alignment of '{}' against '{}' failed: {}", reads, prefix, e))?;
            Ok(())
        }
    }
}

fn run_index(
    reference: &str,
    prefix: &str,
    params: IndexParams,
    seed: u64,
    bucket_len: u32,
    threads: usize,
) -> Result<()> {
    let fh = std::fs::File::open(reference)
        .map_err(|e| anyhow::anyhow!("cannot open reference FASTA '{}': {}", reference, e))?;
    let mut rng = SmallRng::seed_from_u64(seed);
    let forward = Reference::from_fasta(std::io::BufReader::new(fh), &mut rng)
        .map_err(|e| anyhow::anyhow!("cannot load reference FASTA '{}': {}", reference, e))?;
    let ambiguous: u32 = forward.n_runs.iter().map(|r| r.len).sum();

    println!("reference: {}", reference);
    println!("sequences: {}", forward.contigs.len());
    println!("total_len: {}", forward.len());
    println!("ambiguous: {}", ambiguous);

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads.max(1)).build()?;
    let sorter = BucketSorter::new(bucket_len as usize)?;
    let meta = IndexMeta {
        reference_file: Some(reference.to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    };

    let reverse = forward.reverse_complement();
    for (text, suffix) in [(&forward, "table"), (&reverse, "rc_table")] {
        let mut fm = pool.install(|| build_index(text, params, &sorter))?;
        fm.set_meta(meta.clone());
        let out_path = format!("{}.{}", prefix, suffix);
        fm.save_to_file(&out_path)
            .map_err(|e| anyhow::anyhow!("cannot write index to '{}': {}", out_path, e))?;
        println!("FM index saved: {}", out_path);
    }
    Ok(())
}
