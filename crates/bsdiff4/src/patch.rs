//! BSDIFF40 container: header plus three compressed blocks
//!
//! [`Bsdiff4Patch`] is the container with its blocks still compressed.
//! [`PatchCodec`] pairs the container with a [`Compressor`] to move between
//! patch bytes and an uncompressed [`Delta`].

use crate::compression::{Compressor, Zlib};
use crate::control::{decode_control, encode_control};
use crate::diff::{Delta, compute_diff};
use crate::error::{Block, Bsdiff4Error, Bsdiff4Result};
use crate::header::{Bsdiff4Header, HEADER_SIZE};
use binrw::{BinRead, BinWrite};
use std::io::{Cursor, Write};
use std::sync::Arc;
use tracing::debug;

/// Parsed BSDIFF40 patch with compressed blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bsdiff4Patch {
    /// 32-byte header with magic and block lengths
    pub header: Bsdiff4Header,
    /// Compressed control block
    pub control_data: Vec<u8>,
    /// Compressed diff block
    pub diff_data: Vec<u8>,
    /// Compressed extra block
    pub extra_data: Vec<u8>,
}

impl Bsdiff4Patch {
    /// Assemble a patch from compressed blocks
    pub fn new(
        control_data: Vec<u8>,
        diff_data: Vec<u8>,
        extra_data: Vec<u8>,
    ) -> Bsdiff4Result<Self> {
        let header = Bsdiff4Header::new(control_data.len(), diff_data.len(), extra_data.len())?;
        Ok(Self {
            header,
            control_data,
            diff_data,
            extra_data,
        })
    }

    /// Parse a complete BSDIFF40 patch from bytes
    ///
    /// The extra block must end exactly where the buffer does. Some writers'
    /// readers take everything after the diff block as the extra block; this
    /// one is stricter and fails with [`Bsdiff4Error::TrailingData`] instead.
    pub fn parse(data: &[u8]) -> Bsdiff4Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Bsdiff4Error::Truncated {
                needed: HEADER_SIZE,
                available: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let header = Bsdiff4Header::read(&mut cursor)?;
        header.validate()?;

        let [control_len, diff_len, extra_len] = header.block_lengths()?;
        let total = header.patch_size()?;
        if data.len() < total {
            return Err(Bsdiff4Error::Truncated {
                needed: total,
                available: data.len(),
            });
        }
        if data.len() > total {
            return Err(Bsdiff4Error::TrailingData(data.len() - total));
        }

        let (control_data, rest) = data[HEADER_SIZE..].split_at(control_len);
        let (diff_data, extra_data) = rest.split_at(diff_len);
        debug_assert_eq!(extra_data.len(), extra_len);

        Ok(Self {
            header,
            control_data: control_data.to_vec(),
            diff_data: diff_data.to_vec(),
            extra_data: extra_data.to_vec(),
        })
    }

    /// Build the BSDIFF40 patch bytes
    pub fn build(&self) -> Bsdiff4Result<Vec<u8>> {
        let mut patch = Vec::with_capacity(
            HEADER_SIZE + self.control_data.len() + self.diff_data.len() + self.extra_data.len(),
        );
        let mut cursor = Cursor::new(&mut patch);

        self.header.write(&mut cursor)?;

        cursor
            .write_all(&self.control_data)
            .and_then(|()| cursor.write_all(&self.diff_data))
            .and_then(|()| cursor.write_all(&self.extra_data))
            .map_err(binrw::Error::Io)?;

        Ok(patch)
    }
}

impl crate::PatchFormat for Bsdiff4Patch {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::parse(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(self.build()?)
    }
}

/// Patch reader and writer bound to one block compressor
///
/// The default codec compresses with zlib.
#[derive(Debug, Clone)]
pub struct PatchCodec {
    compressor: Arc<dyn Compressor>,
}

impl Default for PatchCodec {
    fn default() -> Self {
        Self::new(Zlib::default())
    }
}

impl PatchCodec {
    /// Create a codec using `compressor` for all three blocks
    pub fn new(compressor: impl Compressor + 'static) -> Self {
        Self {
            compressor: Arc::new(compressor),
        }
    }

    /// The block compressor in use
    pub fn compressor(&self) -> &dyn Compressor {
        self.compressor.as_ref()
    }

    /// Diff `old` against `new` and serialize the result
    pub fn diff(&self, old: &[u8], new: &[u8]) -> Bsdiff4Result<Vec<u8>> {
        let delta = compute_diff(old, new)?;
        self.encode(&delta)
    }

    /// Serialize a delta into patch bytes
    pub fn encode(&self, delta: &Delta) -> Bsdiff4Result<Vec<u8>> {
        let control = encode_control(&delta.control)?;

        let control_data = self.compress(Block::Control, &control)?;
        let diff_data = self.compress(Block::Diff, &delta.diff)?;
        let extra_data = self.compress(Block::Extra, &delta.extra)?;

        debug!(
            compressor = self.compressor.name(),
            control = control_data.len(),
            diff = diff_data.len(),
            extra = extra_data.len(),
            "compressed patch blocks"
        );

        Bsdiff4Patch::new(control_data, diff_data, extra_data)?.build()
    }

    /// Parse patch bytes back into a delta
    pub fn decode(&self, patch: &[u8]) -> Bsdiff4Result<Delta> {
        let parsed = Bsdiff4Patch::parse(patch)?;

        let control = self.decompress(Block::Control, &parsed.control_data)?;
        let diff = self.decompress(Block::Diff, &parsed.diff_data)?;
        let extra = self.decompress(Block::Extra, &parsed.extra_data)?;

        let control = decode_control(&control)?;
        debug!(
            compressor = self.compressor.name(),
            triples = control.len(),
            diff = diff.len(),
            extra = extra.len(),
            "decoded patch"
        );

        Ok(Delta {
            control,
            diff,
            extra,
        })
    }

    /// Rebuild the new buffer from `old` and patch bytes
    pub fn apply(&self, old: &[u8], patch: &[u8]) -> Bsdiff4Result<Vec<u8>> {
        let delta = self.decode(patch)?;
        crate::patcher::apply_delta(old, &delta)
    }

    fn compress(&self, block: Block, data: &[u8]) -> Bsdiff4Result<Vec<u8>> {
        self.compressor
            .compress(data)
            .map_err(|e| Bsdiff4Error::compression(block, e))
    }

    fn decompress(&self, block: Block, data: &[u8]) -> Bsdiff4Result<Vec<u8>> {
        self.compressor
            .decompress(data)
            .map_err(|e| Bsdiff4Error::compression(block, e))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::PatchFormat;
    use crate::compression::Stored;
    use crate::control::ControlEntry;
    use pretty_assertions::assert_eq;
    use std::io;

    fn sample_delta() -> Delta {
        Delta {
            control: vec![ControlEntry::new(3, 2, -1), ControlEntry::new(4, 0, 0)],
            diff: vec![0, 1, 255, 0, 0, 0, 7],
            extra: b"hi".to_vec(),
        }
    }

    #[test]
    fn test_stored_layout() {
        let codec = PatchCodec::new(Stored);
        let patch = codec.encode(&sample_delta()).expect("encode should succeed");

        assert_eq!(&patch[0..8], b"BSDIFF40");
        assert_eq!(&patch[8..16], b"24\0\0\0\0\0\0");
        assert_eq!(&patch[16..24], b"7\0\0\0\0\0\0\0");
        assert_eq!(&patch[24..32], b"2\0\0\0\0\0\0\0");
        assert_eq!(patch.len(), 32 + 24 + 7 + 2);
        assert_eq!(&patch[32..36], &3i32.to_le_bytes());
        assert_eq!(&patch[56..63], &[0u8, 1, 255, 0, 0, 0, 7]);
        assert_eq!(&patch[63..], b"hi");
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let codec = PatchCodec::default();
        let delta = sample_delta();

        let patch = codec.encode(&delta).expect("encode should succeed");
        assert_eq!(codec.decode(&patch).expect("decode should succeed"), delta);
    }

    #[test]
    fn test_empty_delta_round_trip() {
        let codec = PatchCodec::default();
        let patch = codec.encode(&Delta::default()).expect("encode should succeed");
        assert_eq!(
            codec.decode(&patch).expect("decode should succeed"),
            Delta::default()
        );
    }

    #[test]
    fn test_container_parse_build_round_trip() {
        let patch = PatchCodec::default()
            .encode(&sample_delta())
            .expect("encode should succeed");

        let parsed = Bsdiff4Patch::parse(&patch).expect("parse should succeed");
        assert_eq!(parsed.build().expect("build should succeed"), patch);
        assert!(Bsdiff4Patch::verify_round_trip(&patch).is_ok());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut patch = PatchCodec::default()
            .encode(&sample_delta())
            .expect("encode should succeed");
        patch[0..8].copy_from_slice(b"ZBSDIFF1");

        let err = PatchCodec::default()
            .decode(&patch)
            .expect_err("bad magic should fail");
        assert!(matches!(err, Bsdiff4Error::InvalidMagic(_)));
        assert!(err.is_format_error());
    }

    #[test]
    fn test_rejects_truncation_and_trailing_bytes() {
        let patch = PatchCodec::new(Stored)
            .encode(&sample_delta())
            .expect("encode should succeed");

        assert!(matches!(
            Bsdiff4Patch::parse(&patch[..20]),
            Err(Bsdiff4Error::Truncated {
                needed: 32,
                available: 20
            })
        ));
        assert!(matches!(
            Bsdiff4Patch::parse(&patch[..patch.len() - 1]),
            Err(Bsdiff4Error::Truncated { .. })
        ));

        let mut padded = patch.clone();
        padded.extend_from_slice(&[0, 0]);
        assert!(matches!(
            Bsdiff4Patch::parse(&padded),
            Err(Bsdiff4Error::TrailingData(2))
        ));
    }

    #[test]
    fn test_rejects_ragged_control_block() {
        let patch = Bsdiff4Patch::new(vec![0u8; 13], Vec::new(), Vec::new())
            .expect("assemble should succeed")
            .build()
            .expect("build should succeed");

        let err = PatchCodec::new(Stored)
            .decode(&patch)
            .expect_err("13-byte control block should fail");
        assert!(matches!(err, Bsdiff4Error::CorruptControlBlock(_)));
    }

    #[derive(Debug)]
    struct Failing;

    impl Compressor for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn compress(&self, _data: &[u8]) -> io::Result<Vec<u8>> {
            Err(io::Error::other("out of quota"))
        }

        fn decompress(&self, _data: &[u8]) -> io::Result<Vec<u8>> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad block"))
        }
    }

    #[test]
    fn test_compressor_errors_propagate() {
        let codec = PatchCodec::new(Failing);

        let err = codec
            .encode(&sample_delta())
            .expect_err("compression should fail");
        match err {
            Bsdiff4Error::Compression { block, source } => {
                assert_eq!(block, Block::Control);
                assert_eq!(source.to_string(), "out of quota");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let patch = PatchCodec::new(Stored)
            .encode(&sample_delta())
            .expect("encode should succeed");
        let err = codec.decode(&patch).expect_err("decompression should fail");
        assert!(err.is_compression_error());
    }
}
