use std::fmt;

use crate::error::{Error, Result};
use crate::index::builder::build_index;
use crate::index::fm::{Contig, FMIndex, IndexParams};
use crate::index::sa::SuffixSorter;
use crate::index::search::{BwtRange, ExactMatch};
use crate::io::reference::Reference;
use crate::util::dna::{self, SIGMA};

use super::SearchOpt;

/// 索引所基于的文本。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStrand {
    /// 原始参考序列。
    Forward,
    /// 参考序列的反向互补。
    ReverseComplement,
}

impl IndexStrand {
    /// read 以反向互补形式检索，因此正向索引上的命中意味着 read 位于反义链，反之亦然。
    pub fn read_strand(self) -> Strand {
        match self {
            Self::Forward => Strand::Reverse,
            Self::ReverseComplement => Strand::Forward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn sam_flag(self) -> u16 {
        match self {
            Self::Forward => 0,
            Self::Reverse => 16,
        }
    }
}

/// 一个替换错配，按 read 方向记录，碱基为大写 ASCII。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub query_pos: usize,
    pub query_base: u8,
    pub reference_base: u8,
}

impl Mismatch {
    // `alt` 是替换后的检索符号，即参考碱基的互补
    fn substituted(read: &[u8], pos: usize, alt: u8) -> Self {
        Self {
            query_pos: pos,
            query_base: dna::from_rank(read[pos]),
            reference_base: dna::from_rank(dna::complement_rank(alt)),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}>{}", self.query_pos, self.reference_base as char, self.query_base as char)
    }
}

/// read 的一处比对位置。5' 端锚定，3' 端未匹配的 `tail_len` 个碱基做软剪切。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub reference_id: usize,
    /// 匹配部分在参考上最左端的位置（0-based）。
    pub offset: u32,
    pub strand: Strand,
    pub matched_len: usize,
    pub tail_len: usize,
    pub seed_mismatch: Option<Mismatch>,
    pub tail_mismatch: Option<Mismatch>,
    /// 与本条比对共享匹配前缀与尾巴的位置数。
    pub hits: usize,
}

impl Alignment {
    pub fn mismatches(&self) -> impl Iterator<Item = &Mismatch> {
        self.seed_mismatch.iter().chain(self.tail_mismatch.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Unmapped,
    /// 位置数超过 `max_multi`，跳过该 read。
    Repetitive,
    Aligned(Vec<Alignment>),
}

// 位置解析之前已接受的 (range, matched)
#[derive(Debug, Clone, Copy)]
struct Hit {
    range: BwtRange,
    matched: usize,
    fixed_pos: Option<u32>,
    seed_mismatch: Option<Mismatch>,
    tail_mismatch: Option<Mismatch>,
}

impl Hit {
    fn exact(range: BwtRange, matched: usize) -> Self {
        Self { range, matched, fixed_pos: None, seed_mismatch: None, tail_mismatch: None }
    }
}

struct SeedRepair {
    pos: u32,
    range: BwtRange,
    matched: usize,
    mismatch: Mismatch,
}

/// 用 `stream[from..]` 继续扩展 `range`，返回最后一个非空区间及总共匹配的符号数。
fn continue_match(index: &FMIndex, stream: &[u8], mut range: BwtRange, from: usize) -> (BwtRange, usize) {
    for (pos, &ch) in stream.iter().enumerate().skip(from) {
        let next = index.extend(range, ch);
        if next.is_empty() {
            return (range, pos);
        }
        range = next;
    }
    (range, stream.len())
}

/// 在正向与反向互补两套索引上做 seed-and-extend 检索，
/// 种子内与尾部边界处各容忍一个替换。
pub struct MismatchSearcher {
    forward: FMIndex,
    reverse: FMIndex,
    opt: SearchOpt,
}

impl MismatchSearcher {
    pub fn new(forward: FMIndex, reverse: FMIndex, opt: SearchOpt) -> Result<Self> {
        if forward.params() != reverse.params() {
            return Err(Error::InvalidParams(format!(
                "forward index {:?} and reverse-complement index {:?} disagree",
                forward.params(),
                reverse.params()
            )));
        }
        if forward.reference_len() != reverse.reference_len() {
            return Err(Error::InvalidParams(format!(
                "forward index covers {} bp but reverse-complement index covers {} bp",
                forward.reference_len(),
                reverse.reference_len()
            )));
        }
        Ok(Self { forward, reverse, opt })
    }

    /// 在内存中构建两套索引。
    pub fn build<S: SuffixSorter + ?Sized>(
        reference: &Reference,
        params: IndexParams,
        sorter: &S,
        opt: SearchOpt,
    ) -> Result<Self> {
        let forward = build_index(reference, params, sorter)?;
        let reverse = build_index(&reference.reverse_complement(), params, sorter)?;
        Self::new(forward, reverse, opt)
    }

    /// 加载 `<prefix>.table` 与 `<prefix>.rc_table`。
    pub fn load(prefix: &str, params: &IndexParams, opt: SearchOpt) -> Result<Self> {
        let forward = FMIndex::load_from_file(&format!("{}.table", prefix), params)?;
        let reverse = FMIndex::load_from_file(&format!("{}.rc_table", prefix), params)?;
        Self::new(forward, reverse, opt)
    }

    pub fn contigs(&self) -> &[Contig] {
        self.forward.contigs()
    }

    pub fn opt(&self) -> &SearchOpt {
        &self.opt
    }

    fn index(&self, strand: IndexStrand) -> &FMIndex {
        match strand {
            IndexStrand::Forward => &self.forward,
            IndexStrand::ReverseComplement => &self.reverse,
        }
    }

    /// 比对一条 ASCII 碱基表示的 read。
    ///
    /// 仅当 read 超过索引可检索的长度时返回错误。
    pub fn align(&self, read: &[u8]) -> Result<SearchOutcome> {
        if read.is_empty() || read.len() < self.opt.min_seed_len {
            return Ok(SearchOutcome::Unmapped);
        }
        let Ok(ranks) = dna::encode(read) else {
            return Ok(SearchOutcome::Unmapped);
        };

        // 对反向互补做反向搜索，相当于从 5' 到 3' 消费 read
        let probe = dna::revcomp_ranks(&ranks);
        let stream: Vec<u8> = ranks.iter().map(|&r| dna::complement_rank(r)).collect();

        let mut fwd_history = Vec::new();
        let mut rc_history = Vec::new();
        let fwd = self.forward.exact_match_with_history(&probe, 0, &mut fwd_history)?;
        let rc = self.reverse.exact_match_with_history(&probe, 0, &mut rc_history)?;

        let max_multi = self.opt.max_multi;
        let full_width = |m: &ExactMatch| match m {
            ExactMatch::Full(r) | ExactMatch::Overflow(r) => r.width() as usize,
            ExactMatch::Partial { .. } => 0,
        };
        if max_multi != 0 && full_width(&fwd) + full_width(&rc) > max_multi {
            return Ok(SearchOutcome::Repetitive);
        }

        let mut on_reverse = Vec::new();
        self.search_strand(IndexStrand::Forward, &ranks, &stream, fwd, &fwd_history, &mut on_reverse);
        let mut on_forward = Vec::new();
        self.search_strand(IndexStrand::ReverseComplement, &ranks, &stream, rc, &rc_history, &mut on_forward);

        if max_multi != 0
            && !on_reverse.is_empty()
            && !on_forward.is_empty()
            && on_reverse.len() + on_forward.len() > max_multi
        {
            return Ok(SearchOutcome::Repetitive);
        }

        on_reverse.append(&mut on_forward);
        if on_reverse.is_empty() {
            Ok(SearchOutcome::Unmapped)
        } else {
            Ok(SearchOutcome::Aligned(on_reverse))
        }
    }

    fn search_strand(
        &self,
        strand: IndexStrand,
        read: &[u8],
        stream: &[u8],
        found: ExactMatch,
        history: &[BwtRange],
        out: &mut Vec<Alignment>,
    ) {
        let index = self.index(strand);
        let hits = match found {
            ExactMatch::Full(range) | ExactMatch::Overflow(range) => vec![Hit::exact(range, stream.len())],
            ExactMatch::Partial { matched, .. } if matched < self.opt.min_seed_len => {
                if !self.opt.allow_mismatch {
                    return;
                }
                self.repair_seed(index, read, stream, history, matched)
            }
            ExactMatch::Partial { matched, .. } => {
                let range = history[matched];
                let repaired = if self.opt.allow_mismatch {
                    Self::repair_tail(index, read, stream, range, matched)
                } else {
                    Vec::new()
                };
                if repaired.is_empty() {
                    vec![Hit::exact(range, matched)]
                } else {
                    repaired
                }
            }
        };

        for hit in hits {
            self.record(strand, index, stream.len(), hit, out);
        }
    }

    /// 种子在 `min_seed_len` 之前失配：在失配位置或其之前的任一位置做替换，
    /// 保留尾巴最短的延伸（从 3' 向 5' 扫描，长度相同时先找到者优先）。
    fn repair_seed(
        &self,
        index: &FMIndex,
        read: &[u8],
        stream: &[u8],
        history: &[BwtRange],
        matched: usize,
    ) -> Vec<Hit> {
        let n = stream.len();
        let mut best: Option<SeedRepair> = None;

        for k in (0..=matched.min(n - 1)).rev() {
            for alt in 0..SIGMA as u8 {
                if alt == stream[k] {
                    continue;
                }
                let start = index.extend(history[k], alt);
                if start.is_empty() {
                    continue;
                }
                let (range, reached) = continue_match(index, stream, start, k + 1);
                if reached < self.opt.min_seed_len {
                    continue;
                }
                if best.as_ref().is_some_and(|b| b.matched >= reached) {
                    continue;
                }
                let Some(&pos) = index.range_to_seq_idx_bounded(range, reached, 1).first() else {
                    continue;
                };
                best = Some(SeedRepair { pos, range, matched: reached, mismatch: Mismatch::substituted(read, k, alt) });
            }
        }

        let Some(seed) = best else {
            return Vec::new();
        };
        let tails = Self::repair_tail(index, read, stream, seed.range, seed.matched);
        if tails.is_empty() {
            vec![Hit {
                range: seed.range,
                matched: seed.matched,
                fixed_pos: Some(seed.pos),
                seed_mismatch: Some(seed.mismatch),
                tail_mismatch: None,
            }]
        } else {
            tails
                .into_iter()
                .map(|h| Hit { seed_mismatch: Some(seed.mismatch), ..h })
                .collect()
        }
    }

    /// 替换尾巴的第一个碱基，保留每个能越过下一个碱基的延伸；短于两个碱基的尾巴不处理。
    fn repair_tail(index: &FMIndex, read: &[u8], stream: &[u8], range: BwtRange, matched: usize) -> Vec<Hit> {
        let n = stream.len();
        let mut hits = Vec::new();
        if n - matched < 2 {
            return hits;
        }

        for alt in 0..SIGMA as u8 {
            if alt == stream[matched] {
                continue;
            }
            let start = index.extend(range, alt);
            if start.is_empty() {
                continue;
            }
            let (cont, reached) = continue_match(index, stream, start, matched + 1);
            if reached == matched + 1 {
                continue;
            }
            hits.push(Hit {
                range: cont,
                matched: reached,
                fixed_pos: None,
                seed_mismatch: None,
                tail_mismatch: Some(Mismatch::substituted(read, matched, alt)),
            });
        }
        hits
    }

    fn record(&self, strand: IndexStrand, index: &FMIndex, read_len: usize, hit: Hit, out: &mut Vec<Alignment>) {
        let max_multi = self.opt.max_multi;
        // 多解析一个位置即可判断是否丢弃
        let cap = if max_multi == 0 { 0 } else { max_multi.saturating_add(1) };
        let positions = match hit.fixed_pos {
            Some(pos) => vec![pos],
            None => index.range_to_seq_idx_bounded(hit.range, hit.matched, cap),
        };
        if positions.is_empty() {
            return;
        }
        if max_multi != 0 && positions.len() > max_multi {
            log::debug!("more than {} placements on {:?}, hit dropped", max_multi, strand);
            return;
        }

        let total = index.reference_len() as u32;
        for &pos in &positions {
            let global = match strand {
                IndexStrand::Forward => pos,
                IndexStrand::ReverseComplement => total - pos - hit.matched as u32,
            };
            let Some((reference_id, offset)) = self.forward.locate(global) else {
                log::debug!("placement {} on {:?} falls outside every contig", global, strand);
                continue;
            };
            out.push(Alignment {
                reference_id,
                offset,
                strand: strand.read_strand(),
                matched_len: hit.matched,
                tail_len: read_len - hit.matched,
                seed_mismatch: hit.seed_mismatch,
                tail_mismatch: hit.tail_mismatch,
                hits: positions.len(),
            });
        }
    }
}
