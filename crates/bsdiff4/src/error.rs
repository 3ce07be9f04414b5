//! Error types for BSDIFF40 operations
//!
//! Every failure falls into one of three kinds:
//!
//! - **Format**: the patch bytes (or a value headed for them) do not fit the
//!   container layout.
//! - **Internal invariant**: the suffix sort or the diff loop produced a value
//!   outside its domain. This is always a defect, never a property of the input.
//! - **Compression**: the block compressor failed. Its error is carried as is.
//!
//! Nothing is retried internally and no partial output is returned.

use std::fmt;
use thiserror::Error;

/// The three compressed blocks of a patch, in container order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    /// Flattened control triples
    Control,
    /// Byte-wise deltas for copied regions
    Diff,
    /// Literal bytes for inserted regions
    Extra,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::Control => f.write_str("control"),
            Block::Diff => f.write_str("diff"),
            Block::Extra => f.write_str("extra"),
        }
    }
}

/// BSDIFF40-specific error types
#[derive(Error, Debug)]
pub enum Bsdiff4Error {
    /// First 8 bytes are not `BSDIFF40`
    #[error("invalid BSDIFF40 magic: got {0:02X?}")]
    InvalidMagic([u8; 8]),

    /// A header length field is not ASCII decimal
    #[error("invalid {field} length field: {raw:02X?}")]
    InvalidLengthField {
        /// Which block the field describes
        field: Block,
        /// Raw field bytes
        raw: [u8; 8],
    },

    /// A compressed block does not fit in an 8-digit length field
    #[error("compressed {block} block is {len} bytes (limit is 99999999)")]
    BlockTooLarge {
        /// Block that overflowed
        block: Block,
        /// Its compressed size
        len: usize,
    },

    /// Patch ends before the header or a block does
    #[error("truncated patch: need {needed} bytes, got {available} bytes")]
    Truncated {
        /// Bytes needed
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Bytes remain after the extra block
    #[error("{0} trailing bytes after extra block")]
    TrailingData(usize),

    /// Decompressed control block is not a whole number of triples
    #[error("corrupt control block: {0}")]
    CorruptControlBlock(String),

    /// A control value does not fit the 32-bit wire encoding
    #[error("control value {value} at entry {index} does not fit in 32 bits")]
    ControlValueOutOfRange {
        /// Index of the offending entry
        index: usize,
        /// The value that overflowed
        value: i64,
    },

    /// A control entry cannot be replayed
    #[error("invalid control entry at index {index}: {reason}")]
    InvalidControlEntry {
        /// Index of the invalid entry
        index: usize,
        /// Description of why the entry is invalid
        reason: String,
    },

    /// Diff or extra block ran out during reconstruction
    #[error("insufficient {block} data: need {needed} bytes, got {available} bytes")]
    InsufficientData {
        /// Block that ran out
        block: Block,
        /// Bytes needed
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Binary layout could not be read or written
    #[error("binary format error: {0}")]
    BinaryFormat(binrw::Error),

    /// Suffix sort or match search left its domain
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// Block compressor failed
    #[error("{block} block compression failed: {source}")]
    Compression {
        /// Block being compressed or decompressed
        block: Block,
        /// Error reported by the compressor
        #[source]
        source: std::io::Error,
    },
}

/// Result type for BSDIFF40 operations
pub type Bsdiff4Result<T> = Result<T, Bsdiff4Error>;

impl Bsdiff4Error {
    /// Create an internal invariant error
    pub fn invariant<S: Into<String>>(reason: S) -> Self {
        Self::InternalInvariant(reason.into())
    }

    /// Create an invalid control entry error
    pub fn invalid_control_entry<S: Into<String>>(index: usize, reason: S) -> Self {
        Self::InvalidControlEntry {
            index,
            reason: reason.into(),
        }
    }

    /// Create a compression error for the given block
    pub fn compression(block: Block, source: std::io::Error) -> Self {
        Self::Compression { block, source }
    }

    /// Check if the patch bytes or their layout are at fault
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Bsdiff4Error::InvalidMagic(_)
                | Bsdiff4Error::InvalidLengthField { .. }
                | Bsdiff4Error::BlockTooLarge { .. }
                | Bsdiff4Error::Truncated { .. }
                | Bsdiff4Error::TrailingData(_)
                | Bsdiff4Error::CorruptControlBlock(_)
                | Bsdiff4Error::ControlValueOutOfRange { .. }
                | Bsdiff4Error::InvalidControlEntry { .. }
                | Bsdiff4Error::InsufficientData { .. }
                | Bsdiff4Error::BinaryFormat(_)
        )
    }

    /// Check if this error indicates a defect in the diff machinery
    pub fn is_internal_error(&self) -> bool {
        matches!(self, Bsdiff4Error::InternalInvariant(_))
    }

    /// Check if this error came from the block compressor
    pub fn is_compression_error(&self) -> bool {
        matches!(self, Bsdiff4Error::Compression { .. })
    }
}

impl From<binrw::Error> for Bsdiff4Error {
    fn from(error: binrw::Error) -> Self {
        Bsdiff4Error::BinaryFormat(error)
    }
}
