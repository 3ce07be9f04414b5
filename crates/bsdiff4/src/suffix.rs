//! Suffix array construction (Larsson-Sadakane qsufsort)
//!
//! Builds the sorted suffix array `I` and its inverse rank array `V` over the
//! old buffer with one virtual sentinel appended. The sentinel sits at offset
//! `n`, ranks below every real byte, and therefore always lands at rank 0.
//!
//! Sorting starts from a 256-bucket counting sort on the first byte, then
//! doubles the compared prefix length `h` each pass. During a pass every group
//! of suffixes still tied on their first `h` bytes is refined by a ternary
//! split keyed on the rank of the suffix `h` bytes further along. Group ranks
//! are updated in place as groups split, left to right, which is what lets a
//! single pass sort on `2h` bytes.
//!
//! The array is owned by the builder while it is being sorted and handed out
//! read-only afterwards.

use crate::error::{Bsdiff4Error, Bsdiff4Result};
use crate::search::{Match, search};
use tracing::debug;

/// Groups shorter than this are refined with a selection sort instead of a
/// ternary split.
const SMALL_GROUP: usize = 16;

/// State of one slot of the suffix array during construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Offset of a suffix whose group is still tied at the current depth
    Open(usize),
    /// First slot of a run of this many fully ranked suffixes
    Sorted(usize),
}

/// Deferred work for the ternary split
#[derive(Debug, Clone, Copy)]
enum Task {
    /// Refine the group occupying `start..start + len`
    Split { start: usize, len: usize },
    /// Give every suffix in `start..end` the rank `end - 1`
    Settle { start: usize, end: usize },
}

/// Sorted suffix array over an old buffer plus its inverse
///
/// Both arrays hold `n + 1` entries: offset `n` is the sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixArray {
    sa: Vec<usize>,
    rank: Vec<usize>,
}

impl SuffixArray {
    /// Sort every suffix of `old`
    pub fn build(old: &[u8]) -> Bsdiff4Result<Self> {
        let mut sorter = Sorter::new(old);
        let passes = sorter.sort()?;
        let suffix_array = sorter.finish()?;

        debug!(len = old.len(), passes, "built suffix array");
        Ok(suffix_array)
    }

    /// Offsets in suffix order (`I`)
    pub fn as_slice(&self) -> &[usize] {
        &self.sa
    }

    /// Rank of every offset (`V`), the inverse of [`as_slice`](Self::as_slice)
    pub fn ranks(&self) -> &[usize] {
        &self.rank
    }

    /// Number of entries, including the sentinel
    pub fn len(&self) -> usize {
        self.sa.len()
    }

    /// Always false: the sentinel is present even for an empty buffer
    pub fn is_empty(&self) -> bool {
        self.sa.is_empty()
    }

    /// Longest prefix of `new_suffix` occurring anywhere in `old`
    ///
    /// `old` must be the buffer this array was built from.
    pub fn longest_match(&self, old: &[u8], new_suffix: &[u8]) -> Bsdiff4Result<Match> {
        if old.len() + 1 != self.sa.len() {
            return Err(Bsdiff4Error::invariant(format!(
                "suffix array covers {} bytes but old buffer has {}",
                self.sa.len() - 1,
                old.len()
            )));
        }
        search(&self.sa, old, new_suffix, 0, old.len())
    }
}

/// Exclusive owner of `I` and `V` while the sort is in progress
struct Sorter<'a> {
    old: &'a [u8],
    slots: Vec<Slot>,
    rank: Vec<usize>,
    stack: Vec<Task>,
}

impl<'a> Sorter<'a> {
    /// Bucket suffixes by their first byte
    fn new(old: &'a [u8]) -> Self {
        let n = old.len();

        let mut counts = [0usize; 256];
        for &byte in old {
            counts[byte as usize] += 1;
        }

        // Last slot of each byte's bucket; slot 0 is the sentinel's.
        let mut bucket_end = [0usize; 256];
        let mut end = 0;
        for (byte, &count) in counts.iter().enumerate() {
            end += count;
            bucket_end[byte] = end;
        }

        let mut next = [0usize; 256];
        for byte in 0..256 {
            next[byte] = bucket_end[byte] - counts[byte];
        }

        let mut slots = vec![Slot::Sorted(1); n + 1];
        for (offset, &byte) in old.iter().enumerate() {
            next[byte as usize] += 1;
            slots[next[byte as usize]] = Slot::Open(offset);
        }

        let mut rank = vec![0usize; n + 1];
        for (offset, &byte) in old.iter().enumerate() {
            rank[offset] = bucket_end[byte as usize];
        }

        for byte in 0..256 {
            if counts[byte] == 1 {
                slots[bucket_end[byte]] = Slot::Sorted(1);
            }
        }

        Self {
            old,
            slots,
            rank,
            stack: Vec::new(),
        }
    }

    /// Run doubling passes until one sorted run spans the array
    ///
    /// Returns the number of passes.
    fn sort(&mut self) -> Bsdiff4Result<usize> {
        let total = self.slots.len();
        let mut h = 1usize;
        let mut passes = 0usize;

        while self.slots[0] != Slot::Sorted(total) {
            // A pass at depth `h` orders suffixes on `2h` bytes, so every rank
            // is final once `2h >= total`. One more pass then only merges the
            // settled runs, which keeps `h` below `2 * total`.
            if h >= total.saturating_mul(2) {
                return Err(Bsdiff4Error::invariant(format!(
                    "suffix sort did not converge at depth {h} for {} bytes",
                    self.old.len()
                )));
            }

            let mut sorted_len = 0usize;
            let mut i = 0usize;
            while i < total {
                match self.slots[i] {
                    Slot::Sorted(run) => {
                        if run == 0 {
                            return Err(Bsdiff4Error::invariant(format!(
                                "empty sorted run at slot {i}"
                            )));
                        }
                        i += run;
                        sorted_len += run;
                    }
                    Slot::Open(offset) => {
                        if sorted_len > 0 {
                            self.slots[i - sorted_len] = Slot::Sorted(sorted_len);
                        }

                        let group_end = self.rank_of(offset)? + 1;
                        if group_end <= i || group_end > total {
                            return Err(Bsdiff4Error::invariant(format!(
                                "group at slot {i} ends at {group_end}"
                            )));
                        }
                        let len = group_end - i;
                        self.refine(i, len, h)?;

                        i = group_end;
                        sorted_len = 0;
                    }
                }
            }
            if sorted_len > 0 {
                self.slots[i - sorted_len] = Slot::Sorted(sorted_len);
            }

            h += h;
            passes += 1;
        }

        Ok(passes)
    }

    /// Rebuild `I` from the settled ranks and hand both arrays out
    fn finish(self) -> Bsdiff4Result<SuffixArray> {
        let total = self.rank.len();
        let mut sa = vec![usize::MAX; total];

        for (offset, &rank) in self.rank.iter().enumerate() {
            match sa.get_mut(rank) {
                Some(slot) if *slot == usize::MAX => *slot = offset,
                Some(_) => {
                    return Err(Bsdiff4Error::invariant(format!(
                        "rank {rank} assigned to more than one suffix"
                    )));
                }
                None => {
                    return Err(Bsdiff4Error::invariant(format!(
                        "rank {rank} of offset {offset} exceeds {}",
                        total - 1
                    )));
                }
            }
        }

        Ok(SuffixArray {
            sa,
            rank: self.rank,
        })
    }

    /// Refine one tied group using the ranks `h` bytes further along
    fn refine(&mut self, start: usize, len: usize, h: usize) -> Bsdiff4Result<()> {
        self.stack.push(Task::Split { start, len });

        while let Some(task) = self.stack.pop() {
            match task {
                Task::Split { start, len } if len < SMALL_GROUP => {
                    self.selection_split(start, len, h)?;
                }
                Task::Split { start, len } => self.ternary_split(start, len, h)?,
                Task::Settle { start, end } => self.settle(start, end)?,
            }
        }

        Ok(())
    }

    /// Repeatedly pull the smallest key to the front and settle it
    fn selection_split(&mut self, start: usize, len: usize, h: usize) -> Bsdiff4Result<()> {
        let end = start + len;
        let mut k = start;

        while k < end {
            let mut min = self.key(k, h)?;
            let mut tied = 1usize;

            for i in 1..end - k {
                let key = self.key(k + i, h)?;
                if key < min {
                    min = key;
                    tied = 0;
                }
                if key == min {
                    self.slots.swap(k + tied, k + i);
                    tied += 1;
                }
            }

            self.settle(k, k + tied)?;
            k += tied;
        }

        Ok(())
    }

    /// Three-way partition around the middle key
    ///
    /// The lesser part is fully refined before the pivot group's rank is
    /// written, and the pivot group before the greater part.
    fn ternary_split(&mut self, start: usize, len: usize, h: usize) -> Bsdiff4Result<()> {
        let end = start + len;
        let pivot = self.key(start + len / 2, h)?;

        let mut less = 0usize;
        let mut equal = 0usize;
        for i in start..end {
            let key = self.key(i, h)?;
            if key < pivot {
                less += 1;
            } else if key == pivot {
                equal += 1;
            }
        }
        let lo = start + less;
        let hi = lo + equal;

        // Fill the lesser partition, sending other keys to their own regions.
        let mut i = start;
        let mut j = 0usize;
        let mut k = 0usize;
        while i < lo {
            let key = self.key(i, h)?;
            if key < pivot {
                i += 1;
            } else if key == pivot {
                self.slots.swap(i, lo + j);
                j += 1;
            } else {
                self.slots.swap(i, hi + k);
                k += 1;
            }
        }

        // Whatever is left in the pivot region and not equal belongs above it.
        while lo + j < hi {
            if self.key(lo + j, h)? == pivot {
                j += 1;
            } else {
                self.slots.swap(lo + j, hi + k);
                k += 1;
            }
        }

        if end > hi {
            self.stack.push(Task::Split {
                start: hi,
                len: end - hi,
            });
        }
        self.stack.push(Task::Settle { start: lo, end: hi });
        if lo > start {
            self.stack.push(Task::Split {
                start,
                len: lo - start,
            });
        }

        Ok(())
    }

    /// Resolve `start..end` into one group ranked `end - 1`
    fn settle(&mut self, start: usize, end: usize) -> Bsdiff4Result<()> {
        if end <= start {
            return Err(Bsdiff4Error::invariant(format!(
                "empty group {start}..{end}"
            )));
        }

        for i in start..end {
            let offset = self.offset_at(i)?;
            self.rank[offset] = end - 1;
        }
        if end - start == 1 {
            self.slots[start] = Slot::Sorted(1);
        }

        Ok(())
    }

    /// Sort key of the suffix in slot `i`: the rank `h` bytes further along
    fn key(&self, i: usize, h: usize) -> Bsdiff4Result<usize> {
        let offset = self.offset_at(i)?;
        self.rank_of(offset + h)
    }

    fn offset_at(&self, i: usize) -> Bsdiff4Result<usize> {
        match self.slots.get(i) {
            Some(Slot::Open(offset)) => Ok(*offset),
            Some(Slot::Sorted(_)) => Err(Bsdiff4Error::invariant(format!(
                "slot {i} is already sorted"
            ))),
            None => Err(Bsdiff4Error::invariant(format!(
                "slot {i} is out of range"
            ))),
        }
    }

    fn rank_of(&self, offset: usize) -> Bsdiff4Result<usize> {
        self.rank.get(offset).copied().ok_or_else(|| {
            Bsdiff4Error::invariant(format!(
                "rank lookup at offset {offset} beyond {}",
                self.old.len()
            ))
        })
    }
}
