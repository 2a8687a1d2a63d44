//! # tailor-fm
//!
//! 无哨兵（sentinel-free）FM 索引与容错短序列检索。
//!
//! 本 crate 提供：
//!
//! - **索引构建**：按秩顺序消费分组后缀数组，单遍生成 BWT、检查点 Occ、稀疏 SA 采样与 k-mer 查找表
//! - **精确匹配**：查找表加速的反向搜索，可记录每一步的区间以便续搜
//! - **位置解析**：LF 回溯，或对整段区间递归展开，同时过滤跨 contig / 跨 N 区的命中
//! - **容错检索**：正向与反向互补两套索引上的 seed-and-extend，允许种子与尾部各一个错配
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use tailor_fm::align::{MismatchSearcher, SearchOpt, SearchOutcome};
//! use tailor_fm::index::{builder::build_index, fm::IndexParams, sa::BucketSorter, search::ExactMatch};
//! use tailor_fm::io::reference::Reference;
//! use tailor_fm::util::dna;
//!
//! let reference = Reference::from_ascii("ref", b"ACGTACGTAGCTGATCGTAGCTAGCTAGCTGATCG").unwrap();
//! let params = IndexParams::new(2, 4, 64).unwrap();
//!
//! // 精确匹配
//! let fm = build_index(&reference, params, &BucketSorter::default()).unwrap();
//! let pattern = dna::encode(b"GCTGATC").unwrap();
//! if let ExactMatch::Full(range) = fm.exact_match(&pattern, 0).unwrap() {
//!     println!("found at {:?}", fm.range_to_seq_idx(range, pattern.len()));
//! }
//!
//! // 容错检索
//! let searcher = MismatchSearcher::build(&reference, params, &BucketSorter::default(), SearchOpt::default()).unwrap();
//! if let SearchOutcome::Aligned(alns) = searcher.align(b"ACGTACGTAGCTGATCGTAG").unwrap() {
//!     for a in &alns {
//!         println!("{:?} {} {}M{}S", a.strand, a.offset, a.matched_len, a.tail_len);
//!     }
//! }
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — FASTA / FASTQ 解析、参考序列线性化、SAM 输出
//! - [`index`] — 后缀排序、索引构建、FM 索引与检索算法
//! - [`align`] — 容错检索与批量比对驱动
//! - [`util`] — DNA 编码 / 反向互补等工具函数

pub mod align;
pub mod error;
pub mod index;
pub mod io;
pub mod util;

pub use error::{Error, Result};
