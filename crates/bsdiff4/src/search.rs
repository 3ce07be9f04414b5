//! Longest-match search over a sorted suffix array

use crate::error::{Bsdiff4Error, Bsdiff4Result};

/// Longest match of a new-buffer suffix in the old buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Match {
    /// Offset of the match in the old buffer
    pub pos: usize,
    /// Number of matching bytes
    pub len: usize,
}

/// Count matching prefix bytes between two slices.
pub fn matchlen(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Bisect ranks `st..=en` of `sa` for the longest prefix of `new_suffix` in `old`.
///
/// Suffixes are compared lexicographically, a suffix that runs out first
/// ordering below one that still has bytes. Once two neighbouring ranks are
/// left, the longer of their two matches wins, the lower rank on a tie.
pub fn search(
    sa: &[usize],
    old: &[u8],
    new_suffix: &[u8],
    mut st: usize,
    mut en: usize,
) -> Bsdiff4Result<Match> {
    if st > en || en >= sa.len() {
        return Err(Bsdiff4Error::invariant(format!(
            "search range {st}..={en} outside suffix array of {} entries",
            sa.len()
        )));
    }

    while en - st >= 2 {
        let mid = st + (en - st) / 2;
        if suffix_at(sa, old, mid)? < new_suffix {
            st = mid;
        } else {
            en = mid;
        }
    }

    let low = Match {
        pos: sa[st],
        len: matchlen(suffix_at(sa, old, st)?, new_suffix),
    };
    let high = Match {
        pos: sa[en],
        len: matchlen(suffix_at(sa, old, en)?, new_suffix),
    };

    Ok(if low.len >= high.len { low } else { high })
}

/// Suffix of `old` at rank `rank`, empty for the sentinel
fn suffix_at<'a>(sa: &[usize], old: &'a [u8], rank: usize) -> Bsdiff4Result<&'a [u8]> {
    sa.get(rank)
        .and_then(|&offset| old.get(offset..))
        .ok_or_else(|| {
            Bsdiff4Error::invariant(format!(
                "rank {rank} does not name a suffix of a {}-byte buffer",
                old.len()
            ))
        })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::suffix::SuffixArray;

    #[test]
    fn test_matchlen_basic() {
        assert_eq!(matchlen(b"hello", b"hello"), 5);
        assert_eq!(matchlen(b"hello", b"help"), 3);
        assert_eq!(matchlen(b"hello", b"world"), 0);
        assert_eq!(matchlen(b"", b"hello"), 0);
        assert_eq!(matchlen(b"hello", b""), 0);
    }

    #[test]
    fn test_search_empty_old() {
        let old = b"";
        let suffix_array = SuffixArray::build(old).expect("build should succeed");
        let found = suffix_array
            .longest_match(old, b"hello")
            .expect("search should succeed");
        assert_eq!(found, Match { pos: 0, len: 0 });
    }

    #[test]
    fn test_search_finds_match() {
        let old = b"the quick brown fox";
        let suffix_array = SuffixArray::build(old).expect("build should succeed");

        let found = suffix_array
            .longest_match(old, b"brown")
            .expect("search should succeed");
        assert_eq!(found.len, 5);
        assert_eq!(&old[found.pos..found.pos + 5], b"brown");
    }

    #[test]
    fn test_search_partial_match() {
        let old = b"abcdefgh";
        let suffix_array = SuffixArray::build(old).expect("build should succeed");

        let found = suffix_array
            .longest_match(old, b"defxyz")
            .expect("search should succeed");
        assert_eq!(found, Match { pos: 3, len: 3 });
    }

    #[test]
    fn test_search_new_longer_than_old_suffix() {
        let old = b"xxabc";
        let suffix_array = SuffixArray::build(old).expect("build should succeed");

        let found = suffix_array
            .longest_match(old, b"abcabc")
            .expect("search should succeed");
        assert_eq!(found, Match { pos: 2, len: 3 });
    }

    #[test]
    fn test_search_no_common_byte() {
        let old = b"aaaa";
        let suffix_array = SuffixArray::build(old).expect("build should succeed");

        let found = suffix_array
            .longest_match(old, b"zzz")
            .expect("search should succeed");
        assert_eq!(found.len, 0);
    }

    #[test]
    fn test_search_matches_brute_force() {
        use rand::{RngExt, SeedableRng};

        let mut rng = rand::rngs::StdRng::seed_from_u64(99);
        let old: Vec<u8> = (0..512).map(|_| rng.random_range(0..4u8)).collect();
        let suffix_array = SuffixArray::build(&old).expect("build should succeed");

        for _ in 0..200 {
            let len = rng.random_range(0..24usize);
            let probe: Vec<u8> = (0..len).map(|_| rng.random_range(0..4u8)).collect();

            let found = suffix_array
                .longest_match(&old, &probe)
                .expect("search should succeed");
            let best = (0..=old.len())
                .map(|offset| matchlen(&old[offset..], &probe))
                .max()
                .unwrap_or(0);

            assert_eq!(found.len, best);
            assert_eq!(&old[found.pos..found.pos + found.len], &probe[..found.len]);
        }
    }

    #[test]
    fn test_search_rejects_bad_range() {
        let sa = [0usize, 1];
        assert!(search(&sa, b"a", b"a", 0, 2).is_err());
        assert!(search(&sa, b"a", b"a", 1, 0).is_err());
    }
}
