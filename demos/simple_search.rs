//! 演示如何在 library 模式下使用 tailor-fm 构建索引并检索短序列。
//!
//! 运行方式：
//! ```bash
//! cargo run --example simple_search
//! ```

use tailor_fm::align::{MismatchSearcher, SearchOpt, SearchOutcome};
use tailor_fm::index::builder::build_index;
use tailor_fm::index::fm::IndexParams;
use tailor_fm::index::sa::BucketSorter;
use tailor_fm::index::search::ExactMatch;
use tailor_fm::io::reference::Reference;
use tailor_fm::util::dna;

fn main() -> tailor_fm::Result<()> {
    // 1. 构建参考序列
    let bases = b"GATTACAGGCTAGCTTACGATCGATCGGCTAAGCTTGACCTAGGATCCATGCAAGTCGTACGGATTCAGTCCAGT";
    let reference = Reference::from_ascii("ref1", bases)?;
    println!("参考序列: {}", String::from_utf8_lossy(bases));
    println!("参考长度: {} bp", reference.len());

    // 2. 构建 FM 索引
    let params = IndexParams::new(2, 4, 64)?;
    let sorter = BucketSorter::default();
    let fm_idx = build_index(&reference, params, &sorter)?;
    println!(
        "FM 索引构建完成：BWT 长度={}, 采样数={}, 查找表大小={}",
        fm_idx.len(),
        fm_idx.loc_table().len(),
        fm_idx.lookup_table().len()
    );

    // 3. 精确匹配搜索
    let pattern = b"GATCG";
    match fm_idx.exact_match(&dna::encode(pattern)?, 0)? {
        ExactMatch::Full(range) => {
            let positions = fm_idx.range_to_seq_idx(range, pattern.len());
            println!("\n精确匹配 '{}': 找到 {} 处", String::from_utf8_lossy(pattern), positions.len());
            for pos in &positions {
                if let Some((ci, off)) = fm_idx.locate(*pos) {
                    println!("  contig={}, offset={}", fm_idx.contigs()[ci].name, off);
                }
            }
        }
        other => println!("\n精确匹配 '{}': {:?}", String::from_utf8_lossy(pattern), other),
    }

    // 4. 容错检索：一个种子错配 + 3' 尾巴
    let opt = SearchOpt { min_seed_len: 12, ..SearchOpt::default() };
    let searcher = MismatchSearcher::build(&reference, params, &sorter, opt)?;
    let reads: [&[u8]; 3] = [
        b"GCTAGCTTACGATCGATCGGC",     // 精确
        b"GCTAGCTAACGATCGATCGGCTTTT", // 第 7 位错配，3' 端多出 TTTT
        b"CTGGACTGAATCCGTACGAC",      // 反向互补
    ];
    for read in reads {
        println!("\nread: {}", String::from_utf8_lossy(read));
        match searcher.align(read)? {
            SearchOutcome::Aligned(alns) => {
                for a in &alns {
                    let mms: Vec<String> = a.mismatches().map(ToString::to_string).collect();
                    println!(
                        "  {:?} offset={} matched={} tail={} mismatches=[{}]",
                        a.strand,
                        a.offset,
                        a.matched_len,
                        a.tail_len,
                        mms.join(",")
                    );
                }
            }
            other => println!("  {:?}", other),
        }
    }

    println!("\n完成！");
    Ok(())
}
