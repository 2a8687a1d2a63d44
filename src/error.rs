use crate::index::fm::IndexParams;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the index, the search layer and the file collaborators can report.
///
/// "Too many candidates" is deliberately absent: it is a search result, not an error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Index parameters violate a structural requirement, e.g.
    /// `prefix_len < lookup_len + interval`.
    #[error("invalid index parameters: {0}")]
    InvalidParams(String),

    /// The query cannot be searched safely with the configured prefix bound.
    #[error("query of length {len} exceeds the searchable length {max} (prefix_len - interval)")]
    QueryTooLong { len: usize, max: usize },

    /// A symbol outside the A/C/G/T alphabet was found where a rank was required.
    #[error("invalid base {base:?} at position {pos}")]
    InvalidBase { pos: usize, base: char },

    /// A persisted snapshot was written with different parameters.
    #[error("index snapshot header mismatch: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        expected: IndexParams,
        found: IndexParams,
    },

    /// The sorter produced a suffix start outside the reference.
    #[error("suffix array value {value} out of range for reference of length {len}")]
    SuffixOutOfRange { value: u32, len: usize },

    /// The sorter delivered the wrong number of suffixes.
    #[error("suffix array incomplete: expected {expected} suffixes, received {received}")]
    IncompleteSuffixArray { expected: usize, received: usize },

    #[error("reference contains no sequence")]
    EmptyReference,

    #[error("reference of length {0} does not fit a 32-bit index")]
    ReferenceTooLong(usize),

    /// Malformed FASTA/FASTQ input.
    #[error("format error: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error("cannot start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
