use rayon::prelude::*;

use crate::error::{Error, Result};

/// `BucketSorter::bucket_len` 的上限；排序器会分配 `5^bucket_len` 个桶。
pub const MAX_BUCKET_LEN: usize = 8;

/// 以连续的有序分组形式产生数值化文本的后缀数组。
///
/// 分组必须按最终秩递增返回，索引构建器逐组消费。空后缀不在其中：
/// 它总是秩 0，由构建器自行处理。
pub trait SuffixSorter {
    fn sorted_groups(&self, text: &[u8], prefix_len: usize) -> Vec<Vec<u32>>;
}

/// 倍增法完整排序，结果作为单个分组返回。
#[derive(Debug, Clone, Copy, Default)]
pub struct DoublingSorter;

impl SuffixSorter for DoublingSorter {
    fn sorted_groups(&self, text: &[u8], _prefix_len: usize) -> Vec<Vec<u32>> {
        vec![build_sa(text)]
    }
}

/// 构建后缀数组（基于倍增法，O(n log^2 n) 排序）。
/// 文本末尾视为比任何字母都小的隐式结束符，因此无需显式 `$`。
pub fn build_sa(text: &[u8]) -> Vec<u32> {
    let n = text.len();
    if n == 0 {
        return Vec::new();
    }
    let mut sa: Vec<usize> = (0..n).collect();
    let mut rank: Vec<i32> = text.iter().map(|&b| b as i32).collect();
    let mut tmp: Vec<i32> = vec![0; n];

    let mut k = 1usize;
    loop {
        let key = |i: usize, rank: &[i32]| (rank[i], if i + k < n { rank[i + k] } else { -1 });
        sa.sort_unstable_by(|&i, &j| key(i, &rank).cmp(&key(j, &rank)));

        tmp[sa[0]] = 0;
        for w in 1..n {
            let (a, b) = (sa[w - 1], sa[w]);
            tmp[b] = tmp[a] + i32::from(key(a, &rank) != key(b, &rank));
        }
        rank.copy_from_slice(&tmp);

        if rank[sa[n - 1]] as usize == n - 1 || k >= n {
            break;
        }
        k <<= 1;
    }

    sa.into_iter().map(|x| x as u32).collect()
}

/// 先按前 `bucket_len` 个符号分桶，再在各桶内并行比较排序（只比较前 `prefix_len` 个符号）。
///
/// 前 `prefix_len` 个符号相同的后缀保持位置顺序，因此生成的索引只支持
/// 长度不超过 `prefix_len - interval` 的查询。
#[derive(Debug, Clone, Copy)]
pub struct BucketSorter {
    pub bucket_len: usize,
}

impl Default for BucketSorter {
    fn default() -> Self {
        Self { bucket_len: 4 }
    }
}

impl BucketSorter {
    pub fn new(bucket_len: usize) -> Result<Self> {
        if !(1..=MAX_BUCKET_LEN).contains(&bucket_len) {
            return Err(Error::InvalidParams(format!(
                "bucket_len {} outside 1..={}",
                bucket_len, MAX_BUCKET_LEN
            )));
        }
        Ok(Self { bucket_len })
    }

    #[inline]
    fn key_len(&self) -> usize {
        self.bucket_len.min(MAX_BUCKET_LEN)
    }

    // 每位 5 进制：越过文本末尾为 0，否则为秩 + 1
    fn bucket_of(&self, text: &[u8], pos: usize) -> usize {
        (0..self.key_len()).fold(0usize, |key, j| {
            let digit = text.get(pos + j).map_or(0, |&r| r as usize + 1);
            key * 5 + digit
        })
    }
}

impl SuffixSorter for BucketSorter {
    fn sorted_groups(&self, text: &[u8], prefix_len: usize) -> Vec<Vec<u32>> {
        let n = text.len();
        let limit = if prefix_len == 0 { n } else { prefix_len };
        let mut buckets: Vec<Vec<u32>> = vec![Vec::new(); 5usize.pow(self.key_len() as u32)];
        for pos in 0..n {
            buckets[self.bucket_of(text, pos)].push(pos as u32);
        }
        buckets.retain(|b| !b.is_empty());

        buckets.par_iter_mut().for_each(|bucket| {
            bucket.sort_by(|&a, &b| {
                let (a, b) = (a as usize, b as usize);
                text[a..(a + limit).min(n)].cmp(&text[b..(b + limit).min(n)])
            });
        });
        log::debug!("bucket sorter: {} suffixes in {} groups", n, buckets.len());
        buckets
    }
}
