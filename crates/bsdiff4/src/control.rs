//! Control triples and their wire encoding
//!
//! On the wire the control block is a flat run of little-endian `i32`
//! values, three per triple, in emission order.

use crate::error::{Bsdiff4Error, Bsdiff4Result};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

/// Encoded size of one control triple in bytes
pub const CONTROL_ENTRY_SIZE: usize = 12;

/// One copy-then-insert-then-seek step of reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlEntry {
    /// Bytes copied from old with a diff byte added to each
    pub copy_len: i64,
    /// Literal bytes taken from the extra block
    pub extra_len: i64,
    /// Signed jump of the old cursor before the next copy
    pub seek_delta: i64,
}

/// Wire layout of a control entry
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
struct RawControlEntry {
    copy_len: i32,
    extra_len: i32,
    seek_delta: i32,
}

impl ControlEntry {
    /// Create a new control entry
    pub fn new(copy_len: i64, extra_len: i64, seek_delta: i64) -> Self {
        Self {
            copy_len,
            extra_len,
            seek_delta,
        }
    }

    /// Check that this entry can be replayed
    pub fn validate(&self, index: usize) -> Bsdiff4Result<()> {
        if self.copy_len < 0 {
            return Err(Bsdiff4Error::invalid_control_entry(
                index,
                format!("negative copy length {}", self.copy_len),
            ));
        }
        if self.extra_len < 0 {
            return Err(Bsdiff4Error::invalid_control_entry(
                index,
                format!("negative extra length {}", self.extra_len),
            ));
        }
        Ok(())
    }

    /// Bytes this entry contributes to the new buffer
    pub fn output_bytes(&self) -> i64 {
        self.copy_len + self.extra_len
    }

    fn to_raw(self, index: usize) -> Bsdiff4Result<RawControlEntry> {
        let narrow = |value: i64| {
            i32::try_from(value)
                .map_err(|_| Bsdiff4Error::ControlValueOutOfRange { index, value })
        };
        Ok(RawControlEntry {
            copy_len: narrow(self.copy_len)?,
            extra_len: narrow(self.extra_len)?,
            seek_delta: narrow(self.seek_delta)?,
        })
    }
}

impl From<RawControlEntry> for ControlEntry {
    fn from(raw: RawControlEntry) -> Self {
        Self::new(
            i64::from(raw.copy_len),
            i64::from(raw.extra_len),
            i64::from(raw.seek_delta),
        )
    }
}

/// Flatten entries into the uncompressed control block
pub fn encode_control(entries: &[ControlEntry]) -> Bsdiff4Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(entries.len() * CONTROL_ENTRY_SIZE);
    let mut cursor = Cursor::new(&mut bytes);

    for (index, entry) in entries.iter().enumerate() {
        entry.to_raw(index)?.write(&mut cursor)?;
    }

    Ok(bytes)
}

/// Regroup an uncompressed control block into entries
pub fn decode_control(bytes: &[u8]) -> Bsdiff4Result<Vec<ControlEntry>> {
    if bytes.len() % CONTROL_ENTRY_SIZE != 0 {
        return Err(Bsdiff4Error::CorruptControlBlock(format!(
            "{} bytes is not a whole number of {CONTROL_ENTRY_SIZE}-byte entries",
            bytes.len()
        )));
    }

    let count = bytes.len() / CONTROL_ENTRY_SIZE;
    let mut cursor = Cursor::new(bytes);
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(RawControlEntry::read(&mut cursor)?.into());
    }

    Ok(entries)
}

/// Summary of a control array
#[derive(Debug, Clone, PartialEq)]
pub struct ControlBlockStats {
    /// Number of entries
    pub entry_count: usize,
    /// Total bytes copied with correction
    pub total_copy_bytes: i64,
    /// Total literal bytes
    pub total_extra_bytes: i64,
    /// Size of the reconstructed buffer
    pub total_output_bytes: i64,
    /// Average seek distance
    pub avg_seek_distance: f64,
}

impl ControlBlockStats {
    /// Calculate statistics for a control array
    pub fn from_entries(entries: &[ControlEntry]) -> Self {
        if entries.is_empty() {
            return Self {
                entry_count: 0,
                total_copy_bytes: 0,
                total_extra_bytes: 0,
                total_output_bytes: 0,
                avg_seek_distance: 0.0,
            };
        }

        let total_copy_bytes: i64 = entries.iter().map(|e| e.copy_len).sum();
        let total_extra_bytes: i64 = entries.iter().map(|e| e.extra_len).sum();
        let total_seek_distance: i64 = entries.iter().map(|e| e.seek_delta.abs()).sum();

        Self {
            entry_count: entries.len(),
            total_copy_bytes,
            total_extra_bytes,
            total_output_bytes: total_copy_bytes + total_extra_bytes,
            avg_seek_distance: total_seek_distance as f64 / entries.len() as f64,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_control_entry_validation() {
        assert!(ControlEntry::new(10, 5, -3).validate(0).is_ok());
        assert!(ControlEntry::new(0, 0, 0).validate(0).is_ok());

        let negative_copy = ControlEntry::new(-1, 5, 0).validate(4);
        assert!(matches!(
            negative_copy,
            Err(Bsdiff4Error::InvalidControlEntry { index: 4, .. })
        ));

        assert!(ControlEntry::new(10, -1, 0).validate(0).is_err());
    }

    #[test]
    fn test_control_entry_output_bytes() {
        assert_eq!(ControlEntry::new(10, 5, 100).output_bytes(), 15);
    }

    #[test]
    fn test_encode_layout_is_little_endian_i32() {
        let bytes = encode_control(&[ControlEntry::new(1, 2, -3)]).expect("encode should succeed");

        assert_eq!(bytes.len(), CONTROL_ENTRY_SIZE);
        assert_eq!(&bytes[0..4], &1i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &(-3i32).to_le_bytes());
    }

    #[test]
    fn test_decode_preserves_order() {
        let entries = vec![
            ControlEntry::new(10, 5, -3),
            ControlEntry::new(0, 20, 100),
            ControlEntry::new(15, 0, -50),
        ];

        let bytes = encode_control(&entries).expect("encode should succeed");
        let decoded = decode_control(&bytes).expect("decode should succeed");
        assert_eq!(decoded, entries);
    }

    #[test]
    fn test_empty_control_block() {
        assert!(encode_control(&[]).expect("encode should succeed").is_empty());
        assert!(decode_control(&[]).expect("decode should succeed").is_empty());
    }

    #[test]
    fn test_decode_rejects_partial_entry() {
        let err = decode_control(&[0u8; 20]).expect_err("partial entry should fail");
        assert!(matches!(err, Bsdiff4Error::CorruptControlBlock(_)));
        assert!(err.is_format_error());
    }

    #[test]
    fn test_encode_rejects_values_beyond_i32() {
        let entries = [
            ControlEntry::new(1, 1, 1),
            ControlEntry::new(1, 0, i64::from(i32::MIN) - 1),
        ];
        let err = encode_control(&entries).expect_err("overflow should fail");
        assert!(matches!(
            err,
            Bsdiff4Error::ControlValueOutOfRange { index: 1, .. }
        ));
    }

    #[test]
    fn test_control_block_stats() {
        let entries = vec![
            ControlEntry::new(10, 5, -3),
            ControlEntry::new(0, 20, 100),
            ControlEntry::new(15, 0, -50),
        ];

        let stats = ControlBlockStats::from_entries(&entries);
        assert_eq!(stats.entry_count, 3);
        assert_eq!(stats.total_copy_bytes, 25);
        assert_eq!(stats.total_extra_bytes, 25);
        assert_eq!(stats.total_output_bytes, 50);
        assert_eq!(stats.avg_seek_distance, 51.0);

        let empty = ControlBlockStats::from_entries(&[]);
        assert_eq!(empty.entry_count, 0);
        assert_eq!(empty.avg_seek_distance, 0.0);
    }
}
