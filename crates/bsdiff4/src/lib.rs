//! BSDIFF40 binary delta generation
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_sign_loss)] // Ranks and offsets are checked before narrowing
#![allow(clippy::cast_precision_loss)] // Statistics
#![allow(clippy::doc_markdown)] // Format names don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // lastscan/lastpos and friends
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::use_self)] // Type clarity
//! This crate computes binary deltas between two byte buffers and serializes
//! them in the BSDIFF40 patch format, following Colin Percival's bsdiff.
//!
//! # Pipeline
//!
//! - **Suffix array**: Larsson-Sadakane prefix doubling over the old buffer
//! - **Match finder**: binary search over the suffix array for the longest
//!   prefix of the remaining new data
//! - **Diff engine**: greedy partitioning of the new buffer into approximate
//!   copies (stored as byte-wise differences) and literal insertions
//! - **Patch codec**: 32-byte header followed by three independently
//!   compressed blocks (control, diff, extra)
//!
//! # Examples
//!
//! ```rust
//! let old = b"Hello, World! This is the old version of the file.";
//! let new = b"Hello, World! This is the new version of the file!";
//!
//! let patch = bsdiff4::diff(old, new)?;
//! assert_eq!(&patch[..8], b"BSDIFF40");
//!
//! let rebuilt = bsdiff4::apply_patch(old, &patch)?;
//! assert_eq!(rebuilt, new.to_vec());
//! # Ok::<(), bsdiff4::Bsdiff4Error>(())
//! ```
//!
//! Blocks are compressed with zlib unless a different [`Compressor`] is
//! chosen through [`PatchCodec`]:
//!
//! ```rust
//! use bsdiff4::{PatchCodec, Stored};
//!
//! let codec = PatchCodec::new(Stored);
//! let patch = codec.diff(b"abcdefgh", b"abcXefgh")?;
//! assert_eq!(codec.apply(b"abcdefgh", &patch)?, b"abcXefgh".to_vec());
//! # Ok::<(), bsdiff4::Bsdiff4Error>(())
//! ```

#![warn(missing_docs)]

pub mod compression;
/// Control triples and the control block wire encoding
pub mod control;
/// Diff engine producing control triples and diff/extra blocks
///
/// See [`compute_diff`] for the partitioning algorithm.
pub mod diff;
pub mod error;
pub mod header;
pub mod patch;
pub mod patcher;
/// Longest-match search over a suffix array
pub mod search;
/// Suffix array construction (Larsson-Sadakane qsufsort)
///
/// The suffix array of an `n`-byte buffer has `n + 1` entries; the empty
/// suffix always sorts first.
pub mod suffix;

pub use compression::{Compressor, MAX_DECOMPRESSION_SIZE, Stored, Zlib};
#[cfg(feature = "lz4")]
pub use compression::Lz4;
#[cfg(feature = "snappy")]
pub use compression::Snappy;
pub use control::{ControlBlockStats, ControlEntry};
pub use diff::{Delta, compute_diff};
pub use error::{Block, Bsdiff4Error, Bsdiff4Result};
pub use header::{BSDIFF40_MAGIC, Bsdiff4Header, HEADER_SIZE};
pub use patch::{Bsdiff4Patch, PatchCodec};
pub use patcher::{apply_delta, apply_patch};
pub use search::Match;
pub use suffix::SuffixArray;

/// Compute a BSDIFF40 patch turning `old` into `new`, compressed with zlib
pub fn diff(old: &[u8], new: &[u8]) -> Bsdiff4Result<Vec<u8>> {
    PatchCodec::default().diff(old, new)
}

/// Compute the uncompressed delta turning `old` into `new`
///
/// Applying the result to `old` yields `new` exactly.
pub fn diff_only(old: &[u8], new: &[u8]) -> Bsdiff4Result<Delta> {
    compute_diff(old, new)
}

/// Serialize a delta as a zlib-compressed BSDIFF40 patch
pub fn write_patch(delta: &Delta) -> Bsdiff4Result<Vec<u8>> {
    PatchCodec::default().encode(delta)
}

/// Parse a zlib-compressed BSDIFF40 patch back into a delta
pub fn read_patch(patch: &[u8]) -> Bsdiff4Result<Delta> {
    PatchCodec::default().decode(patch)
}

/// Common trait for patch container formats
pub trait PatchFormat: Sized {
    /// Parse from bytes
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>>;

    /// Build to bytes
    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// Verify round-trip correctness
    fn verify_round_trip(data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        let parsed = Self::parse(data)?;
        let rebuilt = parsed.build()?;
        if data != rebuilt.as_slice() {
            return Err("Round-trip verification failed".into());
        }
        Ok(())
    }
}
