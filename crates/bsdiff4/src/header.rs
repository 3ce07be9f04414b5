//! BSDIFF40 header structure and validation
//!
//! The header is 32 bytes:
//! - 8-byte magic "BSDIFF40"
//! - 8-byte compressed control block length
//! - 8-byte compressed diff block length
//! - 8-byte compressed extra block length
//!
//! Lengths are ASCII decimal, left-aligned and NUL padded, so no block can
//! reach 10^8 bytes.

use crate::error::{Block, Bsdiff4Error, Bsdiff4Result};
use binrw::{BinRead, BinWrite};

/// BSDIFF40 magic
pub const BSDIFF40_MAGIC: [u8; 8] = *b"BSDIFF40";

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Width of a length field
const FIELD_WIDTH: usize = 8;

/// Largest length an 8-digit field can hold
pub const MAX_BLOCK_LEN: usize = 99_999_999;

/// BSDIFF40 header as stored, with length fields still in text form
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct Bsdiff4Header {
    /// Must be [`BSDIFF40_MAGIC`]
    pub magic: [u8; 8],
    /// Compressed control block length field
    pub control_field: [u8; 8],
    /// Compressed diff block length field
    pub diff_field: [u8; 8],
    /// Compressed extra block length field
    pub extra_field: [u8; 8],
}

impl Bsdiff4Header {
    /// Create a header for blocks of the given compressed lengths
    pub fn new(control_len: usize, diff_len: usize, extra_len: usize) -> Bsdiff4Result<Self> {
        Ok(Self {
            magic: BSDIFF40_MAGIC,
            control_field: encode_length(Block::Control, control_len)?,
            diff_field: encode_length(Block::Diff, diff_len)?,
            extra_field: encode_length(Block::Extra, extra_len)?,
        })
    }

    /// Check the magic and that every length field parses
    pub fn validate(&self) -> Bsdiff4Result<()> {
        if self.magic != BSDIFF40_MAGIC {
            return Err(Bsdiff4Error::InvalidMagic(self.magic));
        }
        self.block_lengths()?;
        Ok(())
    }

    /// Compressed lengths of the control, diff and extra blocks
    pub fn block_lengths(&self) -> Bsdiff4Result<[usize; 3]> {
        Ok([
            decode_length(Block::Control, &self.control_field)?,
            decode_length(Block::Diff, &self.diff_field)?,
            decode_length(Block::Extra, &self.extra_field)?,
        ])
    }

    /// Header plus all three blocks
    pub fn patch_size(&self) -> Bsdiff4Result<usize> {
        let [control, diff, extra] = self.block_lengths()?;
        Ok(HEADER_SIZE + control + diff + extra)
    }
}

/// Write `len` as left-aligned decimal, NUL padded to 8 bytes
fn encode_length(block: Block, len: usize) -> Bsdiff4Result<[u8; 8]> {
    if len > MAX_BLOCK_LEN {
        return Err(Bsdiff4Error::BlockTooLarge { block, len });
    }

    let digits = len.to_string();
    let mut field = [0u8; FIELD_WIDTH];
    field[..digits.len()].copy_from_slice(digits.as_bytes());
    Ok(field)
}

/// Parse a length field: one or more ASCII digits, then NUL padding
fn decode_length(block: Block, field: &[u8; 8]) -> Bsdiff4Result<usize> {
    let invalid = || Bsdiff4Error::InvalidLengthField {
        field: block,
        raw: *field,
    };

    let digits = field
        .iter()
        .position(|&b| b == 0)
        .map_or(&field[..], |end| &field[..end]);
    if digits.is_empty() || field[digits.len()..].iter().any(|&b| b != 0) {
        return Err(invalid());
    }

    digits.iter().try_fold(0usize, |acc, &b| {
        if b.is_ascii_digit() {
            Ok(acc * 10 + usize::from(b - b'0'))
        } else {
            Err(invalid())
        }
    })
}
