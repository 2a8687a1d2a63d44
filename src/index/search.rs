use crate::error::{Error, Result};
use crate::index::fm::FMIndex;
use crate::util::dna::{self, SIGMA};

/// BWT 行的半开区间 `[lo, hi)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BwtRange {
    pub lo: u32,
    pub hi: u32,
}

impl BwtRange {
    #[inline]
    pub fn new(lo: u32, hi: u32) -> Self {
        Self { lo, hi }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.hi.saturating_sub(self.lo)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lo >= self.hi
    }
}

/// 反向搜索的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExactMatch {
    /// 整条查询匹配成功，区间内每一行都是一次出现。
    Full(BwtRange),
    /// 只有查询末尾 `matched` 个符号出现过；`range` 是第一个失配符号
    /// 产生的（空）区间。
    Partial { matched: usize, range: BwtRange },
    /// 完整匹配，但行数超过调用方给定的候选上限。
    Overflow(BwtRange),
}

impl ExactMatch {
    /// 已匹配的查询末尾符号数。
    pub fn matched(&self, query_len: usize) -> usize {
        match self {
            Self::Partial { matched, .. } => *matched,
            Self::Full(_) | Self::Overflow(_) => query_len,
        }
    }

    pub fn range(&self) -> BwtRange {
        match self {
            Self::Full(r) | Self::Overflow(r) | Self::Partial { range: r, .. } => *r,
        }
    }
}

impl FMIndex {
    #[inline]
    fn interval(&self) -> usize {
        self.params.interval() as usize
    }

    /// `bwt[lo..hi)` 中 `ch` 的真实出现次数，占位行不计。
    #[inline]
    fn count_window(&self, ch: u8, lo: usize, hi: usize) -> u32 {
        let mut hits = self.bwt[lo..hi].iter().filter(|&&b| b == ch).count() as u32;
        if ch == 0 && (lo..hi).contains(&(self.seq_end_pos as usize)) {
            hits -= 1;
        }
        hits
    }

    /// 返回 BWT[0..idx) 中 ch 的出现次数（不含占位行）。
    ///
    /// 从较近的检查点出发，最多顺扫 `interval / 2` 行。
    pub fn occ(&self, ch: u8, idx: u32) -> u32 {
        let idx = idx as usize;
        let interval = self.interval();
        let len = self.bwt.len();
        debug_assert!(idx <= len);

        let mut lower = idx & !(interval - 1);
        if lower == len {
            lower -= interval;
        }
        let upper = lower + interval;

        if idx - lower < interval / 2 || upper >= len {
            self.occ_table[lower / interval][ch as usize] + self.count_window(ch, lower, idx)
        } else {
            self.occ_table[upper / interval][ch as usize] - self.count_window(ch, idx, upper)
        }
    }

    /// 在第 `idx` 行的轮转前加上 `ch` 后所在的行。
    #[inline]
    pub fn lf_mapping(&self, idx: u32, ch: u8) -> u32 {
        self.c_table[ch as usize] + self.occ(ch, idx)
    }

    /// 反向搜索的一步。
    #[inline]
    pub fn extend(&self, range: BwtRange, ch: u8) -> BwtRange {
        BwtRange::new(self.lf_mapping(range.lo, ch), self.lf_mapping(range.hi, ch))
    }

    /// 全部行，即空模式的区间。
    #[inline]
    pub fn full_range(&self) -> BwtRange {
        BwtRange::new(0, self.bwt.len() as u32)
    }

    /// 以查找表 k-mer `code` 开头的后缀所在的行。
    pub fn lookup(&self, code: u32) -> BwtRange {
        let code = code as usize;
        let lo = self.lookup_table[code];
        let hi = match self.lookup_exceptions.binary_search_by_key(&(code as u32), |e| e.code) {
            Ok(i) => self.lookup_exceptions[i].end,
            Err(_) => self.lookup_table[code + 1],
        };
        BwtRange::new(lo, hi)
    }

    fn check_query(&self, query: &[u8]) -> Result<()> {
        let max = self.params.max_query_len();
        if query.len() > max {
            return Err(Error::QueryTooLong { len: query.len(), max });
        }
        if let Some(pos) = query.iter().position(|&c| c as usize >= SIGMA) {
            return Err(Error::InvalidBase { pos, base: dna::from_rank(query[pos]) as char });
        }
        Ok(())
    }

    #[inline]
    fn classify(range: BwtRange, max_candidates: usize) -> ExactMatch {
        if max_candidates != 0 && range.width() as usize > max_candidates {
            ExactMatch::Overflow(range)
        } else {
            ExactMatch::Full(range)
        }
    }

    /// 对数值化查询做反向搜索；查询不短于 k-mer 时先用查找表定位起始区间。
    ///
    /// `max_candidates == 0` 表示不做溢出检查。
    pub fn exact_match(&self, query: &[u8], max_candidates: usize) -> Result<ExactMatch> {
        self.check_query(query)?;
        let k = self.params.lookup_len as usize;

        let (mut range, mut remaining) = (self.full_range(), query.len());
        if query.len() >= k {
            let seeded = self.lookup(dna::kmer_code(&query[query.len() - k..]));
            // k-mer 不存在时退回逐符号搜索，保证 `matched` 准确
            if !seeded.is_empty() {
                range = seeded;
                remaining -= k;
            }
        }

        for pos in (0..remaining).rev() {
            let next = self.extend(range, query[pos]);
            if next.is_empty() {
                return Ok(ExactMatch::Partial { matched: query.len() - pos - 1, range: next });
            }
            range = next;
        }
        Ok(Self::classify(range, max_candidates))
    }

    /// 与 [`exact_match`](Self::exact_match) 相同，但不走查找表；
    /// `history[d]` 记录匹配 `d` 个符号后的区间，从 `history[0]`（全部行）
    /// 一直到最后一个非空区间。
    pub fn exact_match_with_history(
        &self,
        query: &[u8],
        max_candidates: usize,
        history: &mut Vec<BwtRange>,
    ) -> Result<ExactMatch> {
        self.check_query(query)?;
        history.clear();
        history.reserve(query.len() + 1);

        let mut range = self.full_range();
        history.push(range);
        for pos in (0..query.len()).rev() {
            let next = self.extend(range, query[pos]);
            if next.is_empty() {
                return Ok(ExactMatch::Partial { matched: query.len() - pos - 1, range: next });
            }
            range = next;
            history.push(range);
        }
        Ok(Self::classify(range, max_candidates))
    }

    /// 沿 LF 回溯到采样行，得到该行的后缀数组值。
    pub fn bwt_idx_to_seq_idx(&self, idx: u32) -> u32 {
        let mut idx = idx;
        let mut steps = 0u32;
        while !self.is_sampled(idx) {
            idx = self.lf_mapping(idx, self.bwt[idx as usize]);
            steps += 1;
        }
        self.sampled_value(idx) + steps
    }

    fn sampled_value(&self, idx: u32) -> u32 {
        match self.loc_table.binary_search_by_key(&idx, |s| s.bwt_idx) {
            Ok(i) => self.loc_table[i].seq_idx,
            Err(_) => panic!("row {} is flagged as sampled but missing from loc_table", idx),
        }
    }

    /// 返回 `range` 中各行的参考位置，只保留长度为 `query_len` 的匹配
    /// 落在单个 contig 内且不与 N 区重叠的命中。
    ///
    /// 不逐行回溯，而是把整个区间依次用四个字母扩展，最多 `interval - 1` 层；
    /// 深度 `d` 处遇到的采样行给出位置 `sa + d`。输出顺序即遍历顺序。
    pub fn range_to_seq_idx(&self, range: BwtRange, query_len: usize) -> Vec<u32> {
        self.range_to_seq_idx_bounded(range, query_len, 0)
    }

    /// 遍历方式同 [`range_to_seq_idx`](Self::range_to_seq_idx)，但收集到
    /// `max_positions` 个位置后立即停止，结果是不设上限时结果的前缀。
    /// `0` 表示不设上限。
    pub fn range_to_seq_idx_bounded(&self, range: BwtRange, query_len: usize, max_positions: usize) -> Vec<u32> {
        let mut positions = Vec::new();
        if range.is_empty() {
            return positions;
        }
        let cap = if max_positions == 0 { usize::MAX } else { max_positions };
        positions.reserve((range.width() as usize).min(cap));
        let mut budget = range.width();
        let resolved = self.resolve_range(range, 0, query_len, &mut budget, cap, &mut positions);
        if positions.len() < cap {
            assert_eq!(
                resolved,
                range.width(),
                "range {:?} resolved {} rows; index tables are inconsistent",
                range,
                resolved
            );
        }
        positions
    }

    // 返回本层及更深层解析出的 `range` 行数
    fn resolve_range(
        &self,
        range: BwtRange,
        depth: u32,
        query_len: usize,
        budget: &mut u32,
        cap: usize,
        out: &mut Vec<u32>,
    ) -> u32 {
        if *budget == 0 || depth as usize == self.interval() || out.len() >= cap {
            return 0;
        }

        let mut resolved = 0;
        let start = self.loc_table.partition_point(|s| s.bwt_idx < range.lo);
        for sample in self.loc_table[start..].iter().take_while(|s| s.bwt_idx < range.hi) {
            let pos = sample.seq_idx + depth;
            if self.is_valid_span(pos, query_len) {
                out.push(pos);
            }
            resolved += 1;
            *budget -= 1;
            if *budget == 0 || out.len() >= cap {
                return resolved;
            }
        }

        // 由已解析行派生的行，要到深度 >= interval 才会再遇到采样，在那里被截断
        for ch in 0..SIGMA as u8 {
            if out.len() >= cap {
                break;
            }
            let child = self.extend(range, ch);
            if child.is_empty() {
                continue;
            }
            let mut child_budget = child.width();
            resolved += self.resolve_range(child, depth + 1, query_len, &mut child_budget, cap, out);
        }
        resolved
    }

    /// `[pos, pos + len)` 在参考序列范围内、位于单个 contig 中，且不与 N 区重叠。
    pub fn is_valid_span(&self, pos: u32, len: usize) -> bool {
        let end = pos as u64 + len as u64;
        if end > self.reference_len() as u64 {
            return false;
        }
        let end = end as u32;
        let last = end.saturating_sub(1).max(pos);
        match (self.locate(pos), self.locate(last)) {
            (Some((a, _)), Some((b, _))) if a == b => {}
            _ => return false,
        }
        let i = self.n_runs.partition_point(|r| r.end() <= pos);
        self.n_runs.get(i).map_or(true, |r| r.offset >= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::builder::build_index;
    use crate::index::fm::{Contig, IndexParams, Segment};
    use crate::index::sa::DoublingSorter;
    use crate::io::reference::Reference;
    use std::collections::BTreeSet;

    fn make_bases(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                dna::BASES[((x >> 16) % 4) as usize]
            })
            .collect()
    }

    fn index_of(bases: &[u8], log_interval: u32, lookup_len: u32) -> (Reference, FMIndex) {
        let reference = Reference::from_ascii("chr1", bases).unwrap();
        let params = IndexParams::new(log_interval, lookup_len, 64).unwrap();
        let idx = build_index(&reference, params, &DoublingSorter).unwrap();
        (reference, idx)
    }

    fn naive_positions(text: &[u8], pat: &[u8]) -> BTreeSet<u32> {
        if pat.is_empty() || pat.len() > text.len() {
            return BTreeSet::new();
        }
        text.windows(pat.len())
            .enumerate()
            .filter(|(_, w)| *w == pat)
            .map(|(i, _)| i as u32)
            .collect()
    }

    fn walked_positions(idx: &FMIndex, range: BwtRange) -> BTreeSet<u32> {
        (range.lo..range.hi).map(|row| idx.bwt_idx_to_seq_idx(row)).collect()
    }

    #[test]
    fn occ_matches_naive_count_for_every_row() {
        for (len, log_interval) in [(63, 1), (64, 2), (101, 3), (257, 4)] {
            let (_, idx) = index_of(&make_bases(len, len as u32), log_interval, 2);
            let end = idx.seq_end_pos() as usize;
            for ch in 0..SIGMA as u8 {
                let mut naive = 0;
                for i in 0..=idx.len() {
                    assert_eq!(idx.occ(ch, i as u32), naive, "len={} ch={} idx={}", len, ch, i);
                    if i < idx.len() && i != end && idx.bwt()[i] == ch {
                        naive += 1;
                    }
                }
            }
        }
    }

    #[test]
    fn every_substring_resolves_back_to_its_positions() {
        let bases = make_bases(180, 77);
        let (reference, idx) = index_of(&bases, 3, 3);
        for len in [1, 2, 3, 5, 12, 30] {
            for p in (0..=reference.len() - len).step_by(7) {
                let pat = &reference.seq[p..p + len];
                let range = match idx.exact_match(pat, 0).unwrap() {
                    ExactMatch::Full(r) => r,
                    other => panic!("substring at {} len {} not found: {:?}", p, len, other),
                };
                let walked = walked_positions(&idx, range);
                assert!(walked.contains(&(p as u32)));
                assert_eq!(walked, naive_positions(&reference.seq, pat));

                let resolved: BTreeSet<u32> = idx.range_to_seq_idx(range, len).into_iter().collect();
                assert_eq!(resolved, walked);
            }
        }
    }

    #[test]
    fn lookup_start_equals_exact_match_start() {
        let (reference, idx) = index_of(&make_bases(300, 5), 2, 3);
        let kmers: BTreeSet<&[u8]> = reference.seq.windows(3).collect();
        for kmer in kmers {
            let code = dna::kmer_code(kmer);
            let mut history = Vec::new();
            let plain = idx.exact_match_with_history(kmer, 0, &mut history).unwrap();
            assert_eq!(idx.lookup(code), plain.range());
            assert_eq!(idx.lookup_table()[code as usize], plain.range().lo);
        }
    }

    #[test]
    fn partial_match_reports_matched_suffix_length() {
        let (_, idx) = index_of(b"ACGTACGGTCA", 1, 2);
        // "TTACG"："TACG" 出现，"TTACG" 不出现
        let query = dna::encode(b"TTACG").unwrap();
        let m = idx.exact_match(&query, 0).unwrap();
        assert!(matches!(m, ExactMatch::Partial { matched: 4, range } if range.is_empty()));

        let mut history = Vec::new();
        let h = idx.exact_match_with_history(&query, 0, &mut history).unwrap();
        assert_eq!(h.matched(query.len()), 4);
        assert_eq!(history.len(), 5);
        assert_eq!(history[0], idx.full_range());
        assert!(history.windows(2).all(|w| w[1].width() <= w[0].width()));
    }

    #[test]
    fn absent_lookup_kmer_still_counts_matched_symbols() {
        let (_, idx) = index_of(b"AAAACCCCAAAAC", 1, 2);
        // 末尾 k-mer "GG" 不存在
        let query = dna::encode(b"ACGG").unwrap();
        assert!(matches!(idx.exact_match(&query, 0).unwrap(), ExactMatch::Partial { matched: 0, .. }));
        let query = dna::encode(b"CCAA").unwrap();
        assert!(matches!(idx.exact_match(&query, 0).unwrap(), ExactMatch::Full(r) if r.width() == 1));
    }

    #[test]
    fn history_and_lookup_searches_agree() {
        let bases = make_bases(250, 19);
        let (reference, idx) = index_of(&bases, 2, 4);
        let mut history = Vec::new();
        for p in (0..200).step_by(13) {
            let pat = &reference.seq[p..p + 20];
            let a = idx.exact_match(pat, 0).unwrap();
            let b = idx.exact_match_with_history(pat, 0, &mut history).unwrap();
            assert_eq!(a, b);
            assert_eq!(history.len(), 21);
            assert_eq!(*history.last().unwrap(), a.range());
        }
    }

    #[test]
    fn too_many_candidates_is_reported_as_overflow() {
        let (_, idx) = index_of(b"ACGTACGTACGTACGTACGT", 2, 2);
        let query = dna::encode(b"ACGT").unwrap();
        match idx.exact_match(&query, 3).unwrap() {
            ExactMatch::Overflow(r) => assert_eq!(r.width(), 5),
            other => panic!("expected overflow, got {:?}", other),
        }
        assert!(matches!(idx.exact_match(&query, 5).unwrap(), ExactMatch::Full(r) if r.width() == 5));
        assert!(matches!(idx.exact_match(&query, 0).unwrap(), ExactMatch::Full(_)));
    }

    #[test]
    fn over_long_or_invalid_queries_are_rejected() {
        let (_, idx) = index_of(&make_bases(100, 3), 2, 2);
        let too_long = vec![0u8; idx.params().max_query_len() + 1];
        assert!(matches!(idx.exact_match(&too_long, 0), Err(Error::QueryTooLong { len: 61, max: 60 })));
        let mut history = Vec::new();
        assert!(idx.exact_match_with_history(&too_long, 0, &mut history).is_err());
        assert!(matches!(idx.exact_match(&[0, 1, 4], 0), Err(Error::InvalidBase { pos: 2, .. })));
    }

    #[test]
    fn ambiguous_runs_reject_overlapping_hits() {
        // ACGTNNACGTT，N 区被回填为 "AC"
        let seq = dna::encode(b"ACGTACACGTT").unwrap();
        let reference = Reference::from_parts(
            seq,
            vec![Contig { name: "chr1".into(), len: 11, offset: 0 }],
            vec![Segment { offset: 4, len: 2 }],
        );
        let params = IndexParams::new(2, 2, 64).unwrap();
        let idx = build_index(&reference, params, &DoublingSorter).unwrap();

        let acgt = dna::encode(b"ACGT").unwrap();
        let range = idx.exact_match(&acgt, 0).unwrap().range();
        let mut hits = idx.range_to_seq_idx(range, 4);
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 6]);

        // 只出现在跨越回填区的位置
        let gtac = dna::encode(b"GTAC").unwrap();
        let range = idx.exact_match(&gtac, 0).unwrap().range();
        assert_eq!(range.width(), 1);
        assert!(idx.range_to_seq_idx(range, 4).is_empty());
    }

    #[test]
    fn hits_across_contig_boundaries_are_rejected() {
        let seq = dna::encode(b"ACGTTGCA").unwrap();
        let reference = Reference::from_parts(
            seq,
            vec![
                Contig { name: "a".into(), len: 4, offset: 0 },
                Contig { name: "b".into(), len: 4, offset: 4 },
            ],
            Vec::new(),
        );
        let idx = build_index(&reference, IndexParams::new(1, 2, 16).unwrap(), &DoublingSorter).unwrap();
        let gttg = dna::encode(b"GTTG").unwrap();
        let range = idx.exact_match(&gttg, 0).unwrap().range();
        assert_eq!(walked_positions(&idx, range), BTreeSet::from([2]));
        assert!(idx.range_to_seq_idx(range, 4).is_empty());
        let tgca = dna::encode(b"TGCA").unwrap();
        let range = idx.exact_match(&tgca, 0).unwrap().range();
        assert_eq!(idx.range_to_seq_idx(range, 4), vec![4]);
    }

    #[test]
    fn bounded_resolution_stops_at_the_cap() {
        let (_, idx) = index_of(b"ACGTACGTACGTACGTACGTACGTACGTAC", 2, 2);
        let acgt = dna::encode(b"ACGT").unwrap();
        let range = idx.exact_match(&acgt, 0).unwrap().range();
        let all = idx.range_to_seq_idx(range, 4);
        assert_eq!(all.len(), 7);

        for cap in 1..=7 {
            let some = idx.range_to_seq_idx_bounded(range, 4, cap);
            assert_eq!(some, all[..cap], "cap={}", cap);
        }
        assert_eq!(idx.range_to_seq_idx_bounded(range, 4, 100), all);
        assert_eq!(idx.range_to_seq_idx_bounded(range, 4, 0), all);
    }

    #[test]
    fn valid_span_checks_reference_end() {
        let (_, idx) = index_of(b"ACGTACGTAC", 1, 2);
        assert!(idx.is_valid_span(6, 4));
        assert!(!idx.is_valid_span(7, 4));
        assert!(!idx.is_valid_span(10, 1));
    }
}
