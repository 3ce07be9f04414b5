//! BSDIFF40 patch application
//!
//! Replays control triples against the old buffer. Each triple copies
//! `copy_len` bytes from the old cursor with a diff byte added to each,
//! appends `extra_len` literal bytes, then moves the old cursor by
//! `copy_len + seek_delta`. Old bytes outside `0..old.len()` read as zero.

use crate::diff::Delta;
use crate::error::{Block, Bsdiff4Error, Bsdiff4Result};
use crate::patch::PatchCodec;
use tracing::debug;

/// Apply a BSDIFF40 patch using the default zlib codec
///
/// # Examples
///
/// ```rust
/// let old = b"The quick brown fox jumps over the lazy dog";
/// let new = b"The quick brown cat jumps over the lazy dog!";
///
/// let patch = bsdiff4::diff(old, new)?;
/// assert_eq!(bsdiff4::apply_patch(old, &patch)?, new.to_vec());
/// # Ok::<(), bsdiff4::Bsdiff4Error>(())
/// ```
pub fn apply_patch(old: &[u8], patch: &[u8]) -> Bsdiff4Result<Vec<u8>> {
    PatchCodec::default().apply(old, patch)
}

/// Rebuild the new buffer from `old` and an uncompressed delta
pub fn apply_delta(old: &[u8], delta: &Delta) -> Bsdiff4Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut diff_pos = 0usize;
    let mut extra_pos = 0usize;
    let mut old_pos: i64 = 0;

    for (index, entry) in delta.control.iter().enumerate() {
        entry.validate(index)?;
        let copy_len = length(index, entry.copy_len)?;
        let extra_len = length(index, entry.extra_len)?;

        let diff = take(Block::Diff, &delta.diff, &mut diff_pos, copy_len)?;
        let extra = take(Block::Extra, &delta.extra, &mut extra_pos, extra_len)?;

        output.reserve(copy_len + extra_len);
        output.extend(diff.iter().zip(old_pos..).map(|(&delta_byte, offset)| {
            let old_byte = usize::try_from(offset)
                .ok()
                .and_then(|i| old.get(i).copied())
                .unwrap_or(0);
            old_byte.wrapping_add(delta_byte)
        }));
        output.extend_from_slice(extra);

        old_pos = old_pos
            .checked_add(entry.copy_len)
            .and_then(|p| p.checked_add(entry.seek_delta))
            .ok_or_else(|| Bsdiff4Error::invalid_control_entry(index, "old cursor overflows"))?;
    }

    debug!(
        old = old.len(),
        new = output.len(),
        triples = delta.control.len(),
        "applied delta"
    );

    Ok(output)
}

fn length(index: usize, value: i64) -> Bsdiff4Result<usize> {
    usize::try_from(value).map_err(|_| {
        Bsdiff4Error::invalid_control_entry(index, format!("length {value} out of range"))
    })
}

/// Next `len` bytes of `data` starting at `*pos`
fn take<'a>(block: Block, data: &'a [u8], pos: &mut usize, len: usize) -> Bsdiff4Result<&'a [u8]> {
    let available = data.len() - *pos;
    if len > available {
        return Err(Bsdiff4Error::InsufficientData {
            block,
            needed: len,
            available,
        });
    }

    let bytes = &data[*pos..*pos + len];
    *pos += len;
    Ok(bytes)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::control::ControlEntry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_copy_insert_seek() {
        let old = b"abcdefgh";
        let delta = Delta {
            control: vec![ControlEntry::new(3, 2, 2), ControlEntry::new(3, 0, 0)],
            diff: vec![0, 1, 0, 0, 0, 0],
            extra: b"XY".to_vec(),
        };

        // abc with +1 on b, XY, skip de, then fgh
        assert_eq!(
            apply_delta(old, &delta).expect("apply should succeed"),
            b"accXYfgh".to_vec()
        );
    }

    #[test]
    fn test_apply_negative_seek_rereads_old() {
        let old = b"abcd";
        let delta = Delta {
            control: vec![ControlEntry::new(4, 0, -4), ControlEntry::new(4, 0, 0)],
            diff: vec![0; 8],
            extra: Vec::new(),
        };

        assert_eq!(
            apply_delta(old, &delta).expect("apply should succeed"),
            b"abcdabcd".to_vec()
        );
    }

    #[test]
    fn test_out_of_range_old_bytes_read_as_zero() {
        let old = b"ab";
        let delta = Delta {
            control: vec![ControlEntry::new(0, 0, -2), ControlEntry::new(6, 0, 0)],
            diff: vec![7, 7, 0, 0, 5, 5],
            extra: Vec::new(),
        };

        assert_eq!(
            apply_delta(old, &delta).expect("apply should succeed"),
            vec![7, 7, b'a', b'b', 5, 5]
        );
    }

    #[test]
    fn test_apply_empty_delta() {
        assert!(apply_delta(b"anything", &Delta::default())
            .expect("apply should succeed")
            .is_empty());
    }

    #[test]
    fn test_apply_rejects_short_blocks() {
        let delta = Delta {
            control: vec![ControlEntry::new(4, 0, 0)],
            diff: vec![0; 3],
            extra: Vec::new(),
        };
        assert!(matches!(
            apply_delta(b"abcd", &delta),
            Err(Bsdiff4Error::InsufficientData {
                block: Block::Diff,
                needed: 4,
                available: 3
            })
        ));

        let delta = Delta {
            control: vec![ControlEntry::new(0, 2, 0)],
            diff: Vec::new(),
            extra: vec![1],
        };
        assert!(matches!(
            apply_delta(b"", &delta),
            Err(Bsdiff4Error::InsufficientData {
                block: Block::Extra,
                ..
            })
        ));
    }

    #[test]
    fn test_apply_rejects_negative_lengths() {
        let delta = Delta {
            control: vec![ControlEntry::new(1, 0, 0), ControlEntry::new(0, -1, 0)],
            diff: vec![0],
            extra: Vec::new(),
        };
        let err = apply_delta(b"a", &delta).expect_err("negative length should fail");
        assert!(matches!(
            err,
            Bsdiff4Error::InvalidControlEntry { index: 1, .. }
        ));
        assert!(err.is_format_error());
    }

    #[test]
    fn test_apply_patch_round_trip() {
        let old = b"The quick brown fox jumps over the lazy dog".repeat(20);
        let mut new = old.clone();
        new[200..205].copy_from_slice(b"CAT!!");
        new.extend_from_slice(b" and then some");

        let patch = crate::diff(&old, &new).expect("diff should succeed");
        assert_eq!(apply_patch(&old, &patch).expect("apply should succeed"), new);
    }
}
