use crate::error::{Error, Result};

/// Number of real symbols in the alphabet.
pub const SIGMA: usize = 4; // {0:A, 1:C, 2:G, 3:T}

/// Rank reserved for the end-of-text marker. It never appears in a BWT.
pub const SENTINEL: u8 = 4;

/// Rank → ASCII, in rank order.
pub const BASES: [u8; SIGMA] = *b"ACGT";

#[inline]
pub fn to_rank(b: u8) -> Option<u8> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' | b'U' => Some(3),
        _ => None,
    }
}

#[inline]
pub fn from_rank(r: u8) -> u8 {
    match r {
        0..=3 => BASES[r as usize],
        _ => b'$',
    }
}

#[inline]
pub fn complement_rank(r: u8) -> u8 {
    debug_assert!((r as usize) < SIGMA);
    3 - r
}

#[inline]
pub fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' | b'U' => b'A',
        _ => b'N',
    }
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

pub fn revcomp_ranks(ranks: &[u8]) -> Vec<u8> {
    ranks.iter().rev().map(|&r| complement_rank(r)).collect()
}

/// Strictly encodes ASCII bases into ranks; anything but A/C/G/T/U is rejected.
pub fn encode(seq: &[u8]) -> Result<Vec<u8>> {
    seq.iter()
        .enumerate()
        .map(|(pos, &b)| to_rank(b).ok_or(Error::InvalidBase { pos, base: b as char }))
        .collect()
}

pub fn decode(ranks: &[u8]) -> Vec<u8> {
    ranks.iter().map(|&r| from_rank(r)).collect()
}

/// Base-4 code of a k-mer given as ranks, first symbol most significant.
#[inline]
pub fn kmer_code(ranks: &[u8]) -> u32 {
    ranks.iter().fold(0u32, |code, &r| (code << 2) | r as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_roundtrip_is_bijective() {
        for r in 0..SIGMA as u8 {
            assert_eq!(to_rank(from_rank(r)), Some(r));
        }
        assert_eq!(to_rank(b'u'), Some(3));
        assert_eq!(to_rank(b'N'), None);
        assert_eq!(from_rank(SENTINEL), b'$');
    }

    #[test]
    fn revcomp_ascii_and_ranks_agree() {
        let seq = b"AACGTTG";
        assert_eq!(revcomp(seq), b"CAACGTT");
        let ranks = encode(seq).unwrap();
        assert_eq!(decode(&revcomp_ranks(&ranks)), revcomp(seq));
    }

    #[test]
    fn encode_reports_first_invalid_base() {
        match encode(b"ACNGT") {
            Err(Error::InvalidBase { pos, base }) => {
                assert_eq!(pos, 2);
                assert_eq!(base, 'N');
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn kmer_code_is_most_significant_first() {
        assert_eq!(kmer_code(&[0, 0, 0]), 0);
        assert_eq!(kmer_code(&[0, 0, 1]), 1);
        assert_eq!(kmer_code(&[1, 0, 0]), 16);
        assert_eq!(kmer_code(&[3, 3]), 15);
    }
}
