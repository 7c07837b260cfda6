use crate::error::{ProtocolError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::str::FromStr;

/// Body compression algorithm. Peers must agree out of band; the preamble only
/// carries a compressed/uncompressed flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// zlib stream (RFC 1950), the longerpull wire default
    #[default]
    Zlib,
    Lz4,
    Zstd,
}

impl CompressionKind {
    pub fn name(self) -> &'static str {
        match self {
            CompressionKind::Zlib => "zlib",
            CompressionKind::Lz4 => "lz4",
            CompressionKind::Zstd => "zstd",
        }
    }

    /// Inclusive range of accepted compression levels.
    /// lz4_flex has no levels; any value in range is ignored.
    pub fn level_range(self) -> (i32, i32) {
        match self {
            CompressionKind::Zlib => (0, 9),
            CompressionKind::Lz4 => (0, 12),
            CompressionKind::Zstd => (1, 22),
        }
    }
}

impl FromStr for CompressionKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "zlib" => Ok(CompressionKind::Zlib),
            "lz4" => Ok(CompressionKind::Lz4),
            "zstd" => Ok(CompressionKind::Zstd),
            other => Err(ProtocolError::ConfigError(format!(
                "Unknown compression kind: {other}"
            ))),
        }
    }
}

/// Compresses data using the specified compression algorithm
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if compression fails
pub fn compress(data: &[u8], kind: &CompressionKind, level: i32) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Zlib => {
            let level = flate2::Compression::new(level.clamp(0, 9) as u32);
            let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), level);
            encoder
                .write_all(data)
                .map_err(|_| ProtocolError::CompressionFailure)?;
            encoder
                .finish()
                .map_err(|_| ProtocolError::CompressionFailure)
        }
        CompressionKind::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionKind::Zstd => {
            let mut out = Vec::new();
            zstd::stream::copy_encode(data, &mut out, level)
                .map_err(|_| ProtocolError::CompressionFailure)?;
            Ok(out)
        }
    }
}

/// Drain a decompressing reader, failing as soon as the output passes `max_size`.
fn read_limited<R: Read>(mut reader: R, max_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buffer = [0u8; 8192];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&buffer[..n]);
                if out.len() > max_size {
                    return Err(ProtocolError::DecompressionFailure);
                }
            }
            Err(_) => return Err(ProtocolError::DecompressionFailure),
        }
    }
    Ok(out)
}

/// Decompresses data that was compressed with the specified algorithm
///
/// Output larger than `max_size` is rejected to prevent decompression bombs.
///
/// # Errors
/// Returns `ProtocolError::DecompressionFailure` if:
/// - Decompression fails
/// - Output size exceeds `max_size`
pub fn decompress(data: &[u8], kind: &CompressionKind, max_size: usize) -> Result<Vec<u8>> {
    match *kind {
        CompressionKind::Zlib => read_limited(ZlibDecoder::new(data), max_size),
        CompressionKind::Lz4 => {
            // lz4_flex prepends the uncompressed size as 4-byte little-endian;
            // check it before lz4_flex allocates
            if data.len() < 4 {
                return Err(ProtocolError::DecompressionFailure);
            }

            let claimed_size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
            if claimed_size > max_size {
                return Err(ProtocolError::DecompressionFailure);
            }

            let decompressed = lz4_flex::decompress_size_prepended(data)
                .map_err(|_| ProtocolError::DecompressionFailure)?;

            if decompressed.len() > max_size {
                return Err(ProtocolError::DecompressionFailure);
            }
            Ok(decompressed)
        }
        CompressionKind::Zstd => {
            let reader = zstd::stream::Decoder::new(data)
                .map_err(|_| ProtocolError::DecompressionFailure)?;
            read_limited(reader, max_size)
        }
    }
}

/// Compress data if it meets the configured threshold, otherwise return it unchanged.
/// Returns the output bytes and a flag indicating whether compression was applied.
pub fn maybe_compress(
    data: &[u8],
    kind: &CompressionKind,
    level: i32,
    threshold_bytes: usize,
) -> Result<(Vec<u8>, bool)> {
    if data.len() < threshold_bytes {
        Ok((data.to_vec(), false))
    } else {
        Ok((compress(data, kind, level)?, true))
    }
}

/// Decompress data only if it was previously compressed; otherwise return as-is.
pub fn maybe_decompress(
    data: &[u8],
    kind: &CompressionKind,
    was_compressed: bool,
    max_size: usize,
) -> Result<Vec<u8>> {
    if was_compressed {
        decompress(data, kind, max_size)
    } else if data.len() > max_size {
        Err(ProtocolError::OversizedBody(data.len()))
    } else {
        Ok(data.to_vec())
    }
}
