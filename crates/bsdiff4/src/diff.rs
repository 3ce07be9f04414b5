//! Greedy diff/extra partitioning over a suffix array
//!
//! Scans the new buffer left to right. At each position the longest match in
//! the old buffer is compared with how well the alignment currently in effect
//! would do. When the new match is clearly better (or the old alignment
//! already explains it) a boundary is committed: the stretch since the last
//! boundary is split into a forward extension of the old alignment, a literal
//! gap, and a backward extension of the new match, and one control triple is
//! emitted for it.

use crate::control::{ControlBlockStats, ControlEntry};
use crate::error::{Bsdiff4Error, Bsdiff4Result};
use crate::search::Match;
use crate::suffix::SuffixArray;
use tracing::{debug, trace};

/// A new match must beat the running alignment by more than this many bytes
/// before a boundary is committed.
const MATCH_MARGIN: i64 = 8;

/// Uncompressed output of a diff: control triples plus the diff and extra blocks
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delta {
    /// Control triples in replay order
    pub control: Vec<ControlEntry>,
    /// `(new - old) mod 256` for every copied byte
    pub diff: Vec<u8>,
    /// Literal bytes for every inserted byte
    pub extra: Vec<u8>,
}

impl Delta {
    /// Summarise the control triples
    pub fn stats(&self) -> ControlBlockStats {
        ControlBlockStats::from_entries(&self.control)
    }

    /// Rebuild the new buffer from `old`
    pub fn apply(&self, old: &[u8]) -> Bsdiff4Result<Vec<u8>> {
        crate::patcher::apply_delta(old, self)
    }
}

/// Byte of `old` at a signed offset, if there is one
fn old_byte(old: &[u8], offset: i64) -> Option<u8> {
    usize::try_from(offset).ok().and_then(|i| old.get(i).copied())
}

fn signed(value: usize) -> Bsdiff4Result<i64> {
    i64::try_from(value)
        .map_err(|_| Bsdiff4Error::invariant(format!("offset {value} exceeds i64")))
}

/// Compute the delta turning `old` into `new`.
//
// Comparisons like `old[lastpos + i] == new[lastscan + i]` index two different
// buffers through two different cursors on purpose.
#[allow(clippy::suspicious_operation_groupings)]
pub fn compute_diff(old: &[u8], new: &[u8]) -> Bsdiff4Result<Delta> {
    let suffix_array = SuffixArray::build(old)?;
    let old_size = old.len();
    let new_size = new.len();

    let mut delta = Delta::default();

    let mut scan: usize = 0;
    let mut len: usize = 0;
    let mut pos: usize = 0;
    let mut lastscan: usize = 0;
    let mut lastpos: usize = 0;
    let mut lastoffset: i64 = 0;

    while scan < new_size {
        let mut oldscore: i64 = 0;
        scan += len;
        let mut scsc = scan;

        while scan < new_size {
            let found = suffix_array.longest_match(old, &new[scan..])?;
            check_match(found, old_size, new_size - scan)?;
            pos = found.pos;
            len = found.len;

            // Credit bytes the alignment in effect already gets right
            while scsc < scan + len {
                if old_byte(old, signed(scsc)? + lastoffset) == Some(new[scsc]) {
                    oldscore += 1;
                }
                scsc += 1;
            }

            let len_score = signed(len)?;
            if (len_score == oldscore && len != 0) || len_score > oldscore + MATCH_MARGIN {
                break;
            }

            // The byte at `scan` is about to leave the window
            if old_byte(old, signed(scan)? + lastoffset) == Some(new[scan]) {
                oldscore -= 1;
            }

            scan += 1;
        }

        if signed(len)? != oldscore || scan == new_size {
            let mut lenf = forward_extension(old, new, lastscan, lastpos, scan);
            let mut lenb = if scan < new_size {
                backward_extension(old, new, lastscan, scan, pos)
            } else {
                0
            };

            if lastscan + lenf > scan - lenb {
                let overlap = (lastscan + lenf) - (scan - lenb);
                let lens = overlap_split(
                    old,
                    new,
                    lastscan + lenf - overlap,
                    lastpos + lenf - overlap,
                    scan - lenb,
                    pos - lenb,
                    overlap,
                );
                lenf = lenf + lens - overlap;
                lenb -= lens;
            }

            let extra_start = lastscan + lenf;
            let extra_end = scan
                .checked_sub(lenb)
                .filter(|end| *end >= extra_start)
                .ok_or_else(|| {
                    Bsdiff4Error::invariant(format!(
                        "extra region {extra_start}..{scan}-{lenb} is inverted"
                    ))
                })?;

            let old_end = lastpos + lenf;
            if old_end > old_size {
                return Err(Bsdiff4Error::invariant(format!(
                    "copy region ends at {old_end} beyond {old_size}"
                )));
            }

            delta.diff.extend(
                new[lastscan..lastscan + lenf]
                    .iter()
                    .zip(&old[lastpos..old_end])
                    .map(|(n, o)| n.wrapping_sub(*o)),
            );
            delta.extra.extend_from_slice(&new[extra_start..extra_end]);

            // Nothing is copied after the final triple, so its seek is left at 0.
            let seek_delta = if scan == new_size {
                0
            } else {
                signed(pos - lenb)? - signed(old_end)?
            };
            let entry = ControlEntry::new(
                signed(lenf)?,
                signed(extra_end - extra_start)?,
                seek_delta,
            );
            trace!(
                scan,
                pos,
                copy_len = entry.copy_len,
                extra_len = entry.extra_len,
                seek_delta = entry.seek_delta,
                "committed boundary"
            );
            delta.control.push(entry);

            lastscan = scan - lenb;
            lastpos = pos - lenb;
            lastoffset = signed(pos)? - signed(scan)?;
        }
    }

    debug!(
        old_len = old_size,
        new_len = new_size,
        triples = delta.control.len(),
        diff_len = delta.diff.len(),
        extra_len = delta.extra.len(),
        "computed delta"
    );
    Ok(delta)
}

/// A match must lie inside both buffers
fn check_match(found: Match, old_size: usize, remaining: usize) -> Bsdiff4Result<()> {
    if found.pos > old_size || found.len > old_size - found.pos || found.len > remaining {
        return Err(Bsdiff4Error::invariant(format!(
            "match at {} of length {} leaves old ({old_size}) or new ({remaining}) bounds",
            found.pos, found.len
        )));
    }
    Ok(())
}

/// Length of the forward extension from the last boundary maximising `2 * matches - length`
fn forward_extension(old: &[u8], new: &[u8], lastscan: usize, lastpos: usize, scan: usize) -> usize {
    let mut s: i64 = 0;
    let mut best: i64 = 0;
    let mut lenf: usize = 0;

    let limit = (scan - lastscan).min(old.len().saturating_sub(lastpos));
    for i in 0..limit {
        if old[lastpos + i] == new[lastscan + i] {
            s += 1;
        }
        let score = s * 2 - (i as i64 + 1);
        if score > best {
            best = score;
            lenf = i + 1;
        }
    }

    lenf
}

/// Length of the backward extension ending at the new match, same criterion
fn backward_extension(old: &[u8], new: &[u8], lastscan: usize, scan: usize, pos: usize) -> usize {
    let mut s: i64 = 0;
    let mut best: i64 = 0;
    let mut lenb: usize = 0;

    let limit = (scan - lastscan).min(pos);
    for i in 1..=limit {
        if old[pos - i] == new[scan - i] {
            s += 1;
        }
        let score = s * 2 - i as i64;
        if score > best {
            best = score;
            lenb = i;
        }
    }

    lenb
}

/// How much of an overlapping window goes to the forward extension
///
/// Walks the overlap once, scoring +1 where the forward alignment agrees and
/// -1 where the backward one does, and returns the prefix length with the
/// best running score.
fn overlap_split(
    old: &[u8],
    new: &[u8],
    forward_new: usize,
    forward_old: usize,
    backward_new: usize,
    backward_old: usize,
    overlap: usize,
) -> usize {
    let mut s: i64 = 0;
    let mut best: i64 = 0;
    let mut lens: usize = 0;

    for i in 0..overlap {
        if new[forward_new + i] == old[forward_old + i] {
            s += 1;
        }
        if new[backward_new + i] == old[backward_old + i] {
            s -= 1;
        }
        if s > best {
            best = s;
            lens = i + 1;
        }
    }

    lens
}
