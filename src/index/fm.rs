use std::io::{BufReader, BufWriter, Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::dna::SIGMA;

/// 支持的最大 `log_interval`，区间解析的递归深度以此为上限。
pub const MAX_LOG_INTERVAL: u32 = 10;
/// 查找表 k-mer 的最大长度（4^13 项）。
pub const MAX_LOOKUP_LEN: u32 = 13;

/// 构建参数，同时也是持久化快照的文件头。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    /// 检查点与采样间隔为 `1 << log_interval`。
    pub log_interval: u32,
    pub sigma: u32,
    /// 查找表中 k-mer 的长度。
    pub lookup_len: u32,
    /// 后缀排序保证有序的前导符号数。
    pub prefix_len: u32,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self { log_interval: 4, sigma: SIGMA as u32, lookup_len: 10, prefix_len: 256 }
    }
}

impl IndexParams {
    pub fn new(log_interval: u32, lookup_len: u32, prefix_len: u32) -> Result<Self> {
        let params = Self { log_interval, sigma: SIGMA as u32, lookup_len, prefix_len };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sigma as usize != SIGMA {
            return Err(Error::InvalidParams(format!(
                "alphabet size {} is not supported (expected {})",
                self.sigma, SIGMA
            )));
        }
        if self.log_interval == 0 || self.log_interval > MAX_LOG_INTERVAL {
            return Err(Error::InvalidParams(format!(
                "log_interval {} outside 1..={}",
                self.log_interval, MAX_LOG_INTERVAL
            )));
        }
        if self.lookup_len == 0 || self.lookup_len > MAX_LOOKUP_LEN {
            return Err(Error::InvalidParams(format!(
                "lookup_len {} outside 1..={}",
                self.lookup_len, MAX_LOOKUP_LEN
            )));
        }
        if (self.prefix_len as u64) < self.lookup_len as u64 + self.interval() as u64 {
            return Err(Error::InvalidParams(format!(
                "prefix_len {} is shorter than lookup_len {} + interval {}",
                self.prefix_len,
                self.lookup_len,
                self.interval()
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn interval(&self) -> u32 {
        1 << self.log_interval
    }

    /// `exact_match` 接受的最长查询。
    #[inline]
    pub fn max_query_len(&self) -> usize {
        (self.prefix_len - self.interval()) as usize
    }

    /// 不同 k-mer 的个数（查找表另有一个末尾哨兵项）。
    #[inline]
    pub fn lookup_size(&self) -> usize {
        1usize << (2 * self.lookup_len)
    }
}

/// 线性化参考序列上的半开区间 `[offset, offset + len)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Segment {
    pub offset: u32,
    pub len: u32,
}

impl Segment {
    #[inline]
    pub fn end(&self) -> u32 {
        self.offset + self.len
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub len: u32,
    pub offset: u32,
}

/// 稀疏后缀数组采样中的一项。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledPos {
    pub bwt_idx: u32,
    pub seq_idx: u32,
}

/// 当短于查找长度的后缀夹在某个 k-mer 块与下一个块之间时，
/// 记录该 k-mer 在 BWT 中真正的结束行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupException {
    pub code: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

/// 每个 BWT 行一位的位图。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitVec {
    words: Vec<u64>,
    len: usize,
}

impl BitVec {
    pub fn with_capacity(bits: usize) -> Self {
        Self { words: Vec::with_capacity((bits + 63) / 64), len: 0 }
    }

    pub fn push(&mut self, bit: bool) {
        if self.len % 64 == 0 {
            self.words.push(0);
        }
        if bit {
            self.words[self.len / 64] |= 1u64 << (self.len % 64);
        }
        self.len += 1;
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        self.words[i / 64] >> (i % 64) & 1 == 1
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// 无哨兵（sentinel-free）FM 索引，字母表为 A/C/G/T：
/// - BWT 共 `N + 1` 行。第 0 行是从隐式结束符开始的轮转；第 `seq_end_pos` 行
///   对应后缀 0，它没有前驱字符，该行存放占位值 0，从不计入 `c_table` 与 `occ_table`。
/// - `occ_table[k][c]` 为 `bwt[0..k * interval)` 中 `c` 的真实出现次数。
/// - `loc_table` 按行号排序，保存所有 SA 值为间隔整数倍的行。
/// - `lookup_table[code]` 为 k-mer `code` 的首行；表尾另有一个等于 BWT 长度的哨兵。
///
/// 由 [`IndexBuilder`](crate::index::builder::IndexBuilder) 一次构建，之后只读。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FMIndex {
    pub(crate) params: IndexParams,
    pub(crate) bwt: Vec<u8>,
    pub(crate) seq_end_pos: u32,
    pub(crate) c_table: [u32; SIGMA],
    pub(crate) occ_table: Vec<[u32; SIGMA]>,
    pub(crate) loc_table: Vec<SampledPos>,
    pub(crate) is_sampled: BitVec,
    pub(crate) lookup_table: Vec<u32>,
    pub(crate) lookup_exceptions: Vec<LookupException>,
    pub(crate) contigs: Vec<Contig>,
    pub(crate) n_runs: Vec<Segment>,
    pub(crate) meta: IndexMeta,
}

impl FMIndex {
    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn bwt(&self) -> &[u8] {
        &self.bwt
    }

    /// BWT 行数，即 `N + 1`。
    pub fn len(&self) -> usize {
        self.bwt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bwt.is_empty()
    }

    /// 被索引参考序列的长度 `N`。
    pub fn reference_len(&self) -> usize {
        self.bwt.len() - 1
    }

    pub fn seq_end_pos(&self) -> u32 {
        self.seq_end_pos
    }

    pub fn c_table(&self) -> &[u32; SIGMA] {
        &self.c_table
    }

    pub fn occ_checkpoints(&self) -> &[[u32; SIGMA]] {
        &self.occ_table
    }

    pub fn loc_table(&self) -> &[SampledPos] {
        &self.loc_table
    }

    #[inline]
    pub fn is_sampled(&self, idx: u32) -> bool {
        self.is_sampled.get(idx as usize)
    }

    pub fn lookup_table(&self) -> &[u32] {
        &self.lookup_table
    }

    pub fn lookup_exceptions(&self) -> &[LookupException] {
        &self.lookup_exceptions
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    pub fn n_runs(&self) -> &[Segment] {
        &self.n_runs
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta = meta;
    }

    /// 将文本位置映射到 (contig_index, contig_offset)。
    pub fn locate(&self, pos: u32) -> Option<(usize, u32)> {
        let i = self.contigs.partition_point(|c| c.offset <= pos).checked_sub(1)?;
        let c = &self.contigs[i];
        (pos < c.offset + c.len).then(|| (i, pos - c.offset))
    }

    pub fn save_to_writer<W: Write>(&self, mut w: W) -> Result<()> {
        bincode::serialize_into(&mut w, &self.params)?;
        bincode::serialize_into(&mut w, self)?;
        w.flush()?;
        Ok(())
    }

    /// 读取快照；文件头与 `expected` 不一致时，在读取正文之前就返回错误。
    pub fn load_from_reader<R: Read>(mut r: R, expected: &IndexParams) -> Result<Self> {
        let found: IndexParams = bincode::deserialize_from(&mut r)?;
        if found != *expected {
            return Err(Error::HeaderMismatch { expected: *expected, found });
        }
        let idx: Self = bincode::deserialize_from(&mut r)?;
        if idx.params != found {
            return Err(Error::HeaderMismatch { expected: found, found: idx.params });
        }
        Ok(idx)
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let f = std::fs::File::create(path)?;
        self.save_to_writer(BufWriter::new(f))?;
        log::info!("FM index saved: {} ({} rows)", path, self.len());
        Ok(())
    }

    pub fn load_from_file(path: &str, expected: &IndexParams) -> Result<Self> {
        let f = std::fs::File::open(path)?;
        let idx = Self::load_from_reader(BufReader::new(f), expected)?;
        log::info!("FM index loaded: {} ({} rows, {} contigs)", path, idx.len(), idx.contigs.len());
        Ok(idx)
    }
}
