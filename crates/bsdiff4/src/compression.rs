//! Block compressors
//!
//! Each of the three patch blocks is compressed on its own. Any lossless
//! byte compressor works as long as `decompress(compress(x)) == x`; the
//! container records nothing about which one was used, so both ends have to
//! agree on it.

use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use std::fmt::Debug;
use std::io::{self, Read};

/// Maximum allowed decompression size (1 GB)
///
/// Limits decompression output to prevent denial of service via
/// compression bombs.
pub const MAX_DECOMPRESSION_SIZE: usize = 1024 * 1024 * 1024;

/// Lossless byte compressor used for the control, diff and extra blocks
pub trait Compressor: Debug + Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Compress a whole block
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Reverse [`compress`](Self::compress)
    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

/// zlib via flate2
#[derive(Debug, Clone, Copy)]
pub struct Zlib {
    level: Compression,
    max_decompressed_size: usize,
}

impl Zlib {
    /// zlib at the given level (0-9)
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
            max_decompressed_size: MAX_DECOMPRESSION_SIZE,
        }
    }

    /// Cap the size a single block may decompress to
    pub fn with_max_decompressed_size(mut self, limit: usize) -> Self {
        self.max_decompressed_size = limit;
        self
    }
}

impl Default for Zlib {
    fn default() -> Self {
        Self {
            level: Compression::default(),
            max_decompressed_size: MAX_DECOMPRESSION_SIZE,
        }
    }
}

impl Compressor for Zlib {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(data, self.level);
        let mut compressed = Vec::new();
        encoder.read_to_end(&mut compressed)?;
        Ok(compressed)
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut decompressed = Vec::new();

        // Read in chunks to enforce size limit
        let mut buffer = [0u8; 8192];
        loop {
            let bytes_read = decoder.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            if decompressed.len() + bytes_read > self.max_decompressed_size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "decompressed size exceeds limit of {} bytes",
                        self.max_decompressed_size
                    ),
                ));
            }

            decompressed.extend_from_slice(&buffer[..bytes_read]);
        }

        Ok(decompressed)
    }
}

/// LZ4 blocks via lz4_flex, each prefixed with its decompressed size
#[cfg(feature = "lz4")]
#[derive(Debug, Clone, Copy)]
pub struct Lz4 {
    max_decompressed_size: usize,
}

#[cfg(feature = "lz4")]
impl Lz4 {
    /// Cap the size a single block may decompress to
    pub fn with_max_decompressed_size(mut self, limit: usize) -> Self {
        self.max_decompressed_size = limit;
        self
    }
}

#[cfg(feature = "lz4")]
impl Default for Lz4 {
    fn default() -> Self {
        Self {
            max_decompressed_size: MAX_DECOMPRESSION_SIZE,
        }
    }
}

#[cfg(feature = "lz4")]
impl Compressor for Lz4 {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(lz4_flex::block::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let size_header: [u8; 4] = data
            .get(..4)
            .and_then(|prefix| prefix.try_into().ok())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "LZ4 data too short - missing size header",
                )
            })?;

        let decompressed_size = u32::from_le_bytes(size_header) as usize;
        if decompressed_size > self.max_decompressed_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "LZ4 decompressed size {} exceeds limit of {} bytes",
                    decompressed_size, self.max_decompressed_size
                ),
            ));
        }

        lz4_flex::block::decompress_size_prepended(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Raw Snappy blocks via snap, without the framing format
///
/// This is the block layout JavaScript bsdiff4 writers produce, so patches
/// from those tools decode with this compressor.
#[cfg(feature = "snappy")]
#[derive(Debug, Clone, Copy)]
pub struct Snappy {
    max_decompressed_size: usize,
}

#[cfg(feature = "snappy")]
impl Snappy {
    /// Cap the size a single block may decompress to
    pub fn with_max_decompressed_size(mut self, limit: usize) -> Self {
        self.max_decompressed_size = limit;
        self
    }
}

#[cfg(feature = "snappy")]
impl Default for Snappy {
    fn default() -> Self {
        Self {
            max_decompressed_size: MAX_DECOMPRESSION_SIZE,
        }
    }
}

#[cfg(feature = "snappy")]
impl Compressor for Snappy {
    fn name(&self) -> &'static str {
        "snappy"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let decompressed_size = snap::raw::decompress_len(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if decompressed_size > self.max_decompressed_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Snappy decompressed size {} exceeds limit of {} bytes",
                    decompressed_size, self.max_decompressed_size
                ),
            ));
        }

        snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// No compression; blocks are stored as is
#[derive(Debug, Clone, Copy, Default)]
pub struct Stored;

impl Compressor for Stored {
    fn name(&self) -> &'static str {
        "stored"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}
