use std::time::Instant;

use crate::error::{Error, Result};
use crate::index::fm::{BitVec, FMIndex, IndexMeta, IndexParams, LookupException, SampledPos};
use crate::index::sa::SuffixSorter;
use crate::io::reference::Reference;
use crate::util::dna::{self, SIGMA};

const UNDEFINED: u32 = u32::MAX;

/// 单遍构建 FM 索引：按秩顺序消费后缀数组。
///
/// 秩 0（从结束符开始的轮转）由 [`new`](Self::new) 写入；
/// 每次传给 [`push_group`](Self::push_group) 的分组从下一个秩继续。
pub struct IndexBuilder<'a> {
    reference: &'a Reference,
    params: IndexParams,
    mask: u32,
    bwt: Vec<u8>,
    seq_end_pos: Option<u32>,
    counts: [u32; SIGMA],
    occ_table: Vec<[u32; SIGMA]>,
    loc_table: Vec<SampledPos>,
    is_sampled: BitVec,
    lookup_table: Vec<u32>,
    lookup_exceptions: Vec<LookupException>,
    // 最近一个足够长的后缀的 k-mer
    last_code: Option<u32>,
    next_rank: u32,
}

impl<'a> IndexBuilder<'a> {
    /// 在分配任何内存之前先校验参数与参考序列。
    pub fn new(reference: &'a Reference, params: IndexParams) -> Result<Self> {
        params.validate()?;
        let text = &reference.seq;
        let n = text.len();
        if n == 0 {
            return Err(Error::EmptyReference);
        }
        if n >= u32::MAX as usize {
            return Err(Error::ReferenceTooLong(n));
        }

        let interval = params.interval();
        let rows = n + 1;
        let checkpoints = rows / interval as usize + 1;
        let mut builder = Self {
            reference,
            params,
            mask: interval - 1,
            bwt: Vec::with_capacity(rows),
            seq_end_pos: None,
            counts: [0; SIGMA],
            occ_table: Vec::with_capacity(checkpoints),
            loc_table: Vec::with_capacity(checkpoints),
            is_sampled: BitVec::with_capacity(rows),
            lookup_table: vec![UNDEFINED; params.lookup_size() + 1],
            lookup_exceptions: Vec::new(),
            last_code: None,
            next_rank: 1,
        };

        // 秩 0：空后缀，其前驱为参考序列的最后一个符号
        builder.occ_table.push([0; SIGMA]);
        let sampled = n as u32 & builder.mask == 0;
        if sampled {
            builder.loc_table.push(SampledPos { bwt_idx: 0, seq_idx: n as u32 });
        }
        builder.is_sampled.push(sampled);
        let last = text[n - 1];
        builder.bwt.push(last);
        builder.counts[last as usize] += 1;

        Ok(builder)
    }

    /// 已消费的后缀数（不含秩 0）。
    pub fn consumed(&self) -> usize {
        self.next_rank as usize - 1
    }

    /// 追加一个有序分组，其首元素的秩紧接上一分组的末元素。
    pub fn push_group(&mut self, group: &[u32]) -> Result<()> {
        let text = &self.reference.seq;
        let n = text.len();
        let lookup_len = self.params.lookup_len as usize;

        for &sa in group {
            if sa as usize >= n {
                return Err(Error::SuffixOutOfRange { value: sa, len: n });
            }
            if self.next_rank as usize > n {
                return Err(Error::IncompleteSuffixArray { expected: n, received: self.consumed() + 1 });
            }
            let i = self.next_rank;

            if i & self.mask == 0 {
                self.occ_table.push(self.counts);
            }

            if sa & self.mask == 0 {
                self.loc_table.push(SampledPos { bwt_idx: i, seq_idx: sa });
                self.is_sampled.push(true);
            } else {
                self.is_sampled.push(false);
            }

            let start = sa as usize;
            if start + lookup_len <= n {
                let code = dna::kmer_code(&text[start..start + lookup_len]);
                if self.lookup_table[code as usize] == UNDEFINED {
                    self.lookup_table[code as usize] = i;
                }
                self.last_code = Some(code);
            } else if let Some(code) = self.last_code {
                // 短后缀结束前一个 k-mer 的块
                if self.lookup_exceptions.last().map_or(true, |e| e.code != code) {
                    self.lookup_exceptions.push(LookupException { code, end: i });
                }
            }

            if sa == 0 {
                self.bwt.push(0);
                self.seq_end_pos = Some(i);
            } else {
                let ch = text[start - 1];
                self.bwt.push(ch);
                self.counts[ch as usize] += 1;
            }

            self.next_rank += 1;
        }
        Ok(())
    }

    pub fn finish(self) -> Result<FMIndex> {
        let n = self.reference.seq.len();
        if self.consumed() != n {
            return Err(Error::IncompleteSuffixArray { expected: n, received: self.consumed() });
        }
        let seq_end_pos = self
            .seq_end_pos
            .ok_or(Error::IncompleteSuffixArray { expected: n, received: self.consumed() })?;

        // 不含自身的前缀和，第 0 行留给结束符轮转
        let mut c_table = [0u32; SIGMA];
        let mut acc = 1u32;
        for (c, &count) in self.counts.iter().enumerate() {
            c_table[c] = acc;
            acc += count;
        }

        let mut lookup_table = self.lookup_table;
        let last = lookup_table.len() - 1;
        lookup_table[last] = self.bwt.len() as u32;
        for code in (0..last).rev() {
            if lookup_table[code] == UNDEFINED {
                lookup_table[code] = lookup_table[code + 1];
            }
        }

        log::debug!(
            "index finished: {} rows, {} checkpoints, {} samples, {} lookup exceptions",
            self.bwt.len(),
            self.occ_table.len(),
            self.loc_table.len(),
            self.lookup_exceptions.len()
        );

        Ok(FMIndex {
            params: self.params,
            bwt: self.bwt,
            seq_end_pos,
            c_table,
            occ_table: self.occ_table,
            loc_table: self.loc_table,
            is_sampled: self.is_sampled,
            lookup_table,
            lookup_exceptions: self.lookup_exceptions,
            contigs: self.reference.contigs.clone(),
            n_runs: self.reference.n_runs.clone(),
            meta: IndexMeta::default(),
        })
    }
}

/// 用 `sorter` 对 `reference` 排序，并把各分组交给 [`IndexBuilder`]。
pub fn build_index<S: SuffixSorter + ?Sized>(
    reference: &Reference,
    params: IndexParams,
    sorter: &S,
) -> Result<FMIndex> {
    let mut builder = IndexBuilder::new(reference, params)?;

    let t0 = Instant::now();
    let groups = sorter.sorted_groups(&reference.seq, params.prefix_len as usize);
    let sort_time = t0.elapsed();

    let t1 = Instant::now();
    for group in &groups {
        builder.push_group(group)?;
        log::debug!("consumed {} / {} suffixes", builder.consumed(), reference.len());
    }
    let idx = builder.finish()?;
    log::info!(
        "built FM index over {} bp in {} groups (sort {:.2?}, build {:.2?})",
        reference.len(),
        groups.len(),
        sort_time,
        t1.elapsed()
    );
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::sa::{build_sa, BucketSorter, DoublingSorter};

    fn make_reference(len: usize, seed: u32) -> Reference {
        let mut x = seed;
        let bases: Vec<u8> = (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                dna::BASES[((x >> 16) % 4) as usize]
            })
            .collect();
        Reference::from_ascii("chr1", &bases).unwrap()
    }

    fn params(log_interval: u32, lookup_len: u32) -> IndexParams {
        IndexParams::new(log_interval, lookup_len, 64).unwrap()
    }

    #[test]
    fn rejects_prefix_shorter_than_lookup_plus_interval() {
        let reference = make_reference(50, 1);
        let bad = IndexParams { log_interval: 3, sigma: 4, lookup_len: 4, prefix_len: 11 };
        assert!(matches!(IndexBuilder::new(&reference, bad), Err(Error::InvalidParams(_))));
    }

    #[test]
    fn bwt_matches_suffix_array_definition() {
        let reference = make_reference(97, 3);
        let idx = build_index(&reference, params(2, 3), &DoublingSorter).unwrap();
        let sa = build_sa(&reference.seq);
        let n = reference.len();

        assert_eq!(idx.len(), n + 1);
        assert_eq!(idx.bwt()[0], reference.seq[n - 1]);
        for (k, &s) in sa.iter().enumerate() {
            let row = k + 1;
            if s == 0 {
                assert_eq!(idx.seq_end_pos() as usize, row);
                assert_eq!(idx.bwt()[row], 0);
            } else {
                assert_eq!(idx.bwt()[row], reference.seq[s as usize - 1]);
            }
        }
    }

    #[test]
    fn c_table_counts_smaller_suffixes() {
        let reference = make_reference(200, 5);
        let idx = build_index(&reference, params(3, 3), &DoublingSorter).unwrap();
        for ch in 0..SIGMA as u8 {
            let smaller = reference.seq.iter().filter(|&&c| c < ch).count() as u32;
            assert_eq!(idx.c_table()[ch as usize], 1 + smaller);
        }
        assert_eq!(idx.c_table()[0], 1);
    }

    #[test]
    fn checkpoints_hold_prefix_counts() {
        let reference = make_reference(150, 11);
        let idx = build_index(&reference, params(3, 2), &DoublingSorter).unwrap();
        let interval = idx.params().interval() as usize;
        for (k, row) in idx.occ_checkpoints().iter().enumerate() {
            let end = k * interval;
            for ch in 0..SIGMA as u8 {
                let naive = (0..end)
                    .filter(|&j| j != idx.seq_end_pos() as usize && idx.bwt()[j] == ch)
                    .count() as u32;
                assert_eq!(row[ch as usize], naive, "checkpoint {} symbol {}", k, ch);
            }
        }
    }

    #[test]
    fn loc_table_samples_every_interval_multiple() {
        let reference = make_reference(128, 9);
        let idx = build_index(&reference, params(2, 2), &DoublingSorter).unwrap();
        let sa = build_sa(&reference.seq);
        let interval = idx.params().interval();

        let expected: Vec<SampledPos> = std::iter::once((0u32, reference.len() as u32))
            .chain(sa.iter().enumerate().map(|(k, &s)| (k as u32 + 1, s)))
            .filter(|&(_, s)| s % interval == 0)
            .map(|(bwt_idx, seq_idx)| SampledPos { bwt_idx, seq_idx })
            .collect();
        assert_eq!(idx.loc_table(), &expected[..]);
        for row in 0..idx.len() as u32 {
            let in_table = idx.loc_table().binary_search_by_key(&row, |s| s.bwt_idx).is_ok();
            assert_eq!(idx.is_sampled(row), in_table);
        }
    }

    #[test]
    fn lookup_table_is_monotonic_with_sentinel() {
        let reference = make_reference(300, 21);
        let idx = build_index(&reference, params(2, 3), &DoublingSorter).unwrap();
        let table = idx.lookup_table();
        assert_eq!(table.len(), idx.params().lookup_size() + 1);
        assert_eq!(*table.last().unwrap() as usize, idx.len());
        assert!(table.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn lookup_exception_marks_short_suffix_boundary() {
        // T A C：按秩排列的后缀为 $, "AC"(1), "C"(2), "TAC"(0)
        let reference = Reference::from_ascii("t", b"TAC").unwrap();
        let idx = build_index(&reference, params(1, 2), &DoublingSorter).unwrap();
        // "AC" 块只有第 1 行；第 2 行的 "C"（过短）结束该块
        let ac = dna::kmer_code(&[0, 1]);
        assert_eq!(idx.lookup_table()[ac as usize], 1);
        assert_eq!(idx.lookup_exceptions(), &[LookupException { code: ac, end: 2 }]);
    }

    #[test]
    fn grouped_and_single_pass_builds_agree() {
        let reference = make_reference(400, 17);
        let p = params(3, 3);
        let single = build_index(&reference, p, &DoublingSorter).unwrap();
        let grouped = build_index(&reference, p, &BucketSorter { bucket_len: 2 }).unwrap();
        assert_eq!(single.bwt(), grouped.bwt());
        assert_eq!(single.occ_checkpoints(), grouped.occ_checkpoints());
        assert_eq!(single.loc_table(), grouped.loc_table());
        assert_eq!(single.lookup_table(), grouped.lookup_table());
        assert_eq!(single.lookup_exceptions(), grouped.lookup_exceptions());
    }

    #[test]
    fn incomplete_or_invalid_suffix_arrays_are_rejected() {
        let reference = make_reference(20, 2);
        let p = params(1, 2);
        let sa = build_sa(&reference.seq);

        let mut builder = IndexBuilder::new(&reference, p).unwrap();
        builder.push_group(&sa[..10]).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(Error::IncompleteSuffixArray { expected: 20, received: 10 })
        ));

        let mut builder = IndexBuilder::new(&reference, p).unwrap();
        assert!(matches!(builder.push_group(&[20]), Err(Error::SuffixOutOfRange { value: 20, len: 20 })));

        let mut builder = IndexBuilder::new(&reference, p).unwrap();
        builder.push_group(&sa).unwrap();
        assert!(matches!(builder.push_group(&[0]), Err(Error::IncompleteSuffixArray { .. })));
    }
}
