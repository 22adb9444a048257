use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Compression algorithm used for frame bodies.
///
/// Both sides of a connection must agree on the algorithm; the wire header
/// only records *whether* a body is compressed, not how. The raw
/// (decompressed) length travels in the frame header, so block modes without
/// embedded size prefixes are used for both algorithms.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    Lz4,
    Zstd,
}

/// Zstd level used for frame bodies. Frames are small and latency-sensitive.
const ZSTD_LEVEL: i32 = 1;

/// Compresses data using the specified compression algorithm
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if compression fails
pub fn compress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Lz4 => Ok(lz4_flex::block::compress(data)),
        CompressionKind::Zstd => {
            zstd::bulk::compress(data, ZSTD_LEVEL).map_err(|_| ProtocolError::CompressionFailure)
        }
    }
}

/// Decompresses a frame body whose raw length is known from the frame header.
///
/// The declared length bounds the allocation, and the output must match it
/// exactly - a mismatch means the header lied about the body and the frame is
/// rejected rather than decoded into garbage.
///
/// # Errors
/// Returns `ProtocolError::DecompressionFailure` if:
/// - Decompression fails
/// - Output size differs from `raw_len`
pub fn decompress(data: &[u8], raw_len: usize, kind: CompressionKind) -> Result<Vec<u8>> {
    let out = match kind {
        CompressionKind::Lz4 => lz4_flex::block::decompress(data, raw_len)
            .map_err(|_| ProtocolError::DecompressionFailure)?,
        CompressionKind::Zstd => zstd::bulk::decompress(data, raw_len)
            .map_err(|_| ProtocolError::DecompressionFailure)?,
    };

    if out.len() != raw_len {
        return Err(ProtocolError::DecompressionFailure);
    }
    Ok(out)
}

/// Compress data if it meets the size floor and the result is strictly
/// smaller than the input; otherwise return `None`.
///
/// Incompressible payloads (already compressed, encrypted, random) expand
/// under block compression. The caller sends the original bytes whenever
/// `None` comes back, so the wire never carries an expanded body.
pub fn compress_if_smaller(
    data: &[u8],
    kind: CompressionKind,
    floor_bytes: usize,
) -> Result<Option<Vec<u8>>> {
    if data.len() < floor_bytes {
        return Ok(None);
    }

    let compressed = compress(data, kind)?;
    if compressed.len() < data.len() {
        Ok(Some(compressed))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_lz4_compression_roundtrip() {
        let original = b"Hello, World! This is a test of LZ4 compression. aaaaaaaaaaaaaaaa";
        let compressed = compress(original, CompressionKind::Lz4).unwrap();
        let decompressed = decompress(&compressed, original.len(), CompressionKind::Lz4).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_zstd_compression_roundtrip() {
        let original = b"Hello, World! This is a test of Zstd compression. aaaaaaaaaaaaaaa";
        let compressed = compress(original, CompressionKind::Zstd).unwrap();
        let decompressed = decompress(&compressed, original.len(), CompressionKind::Zstd).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_raw_length_mismatch_rejected() {
        let original = vec![0u8; 256];
        let compressed = compress(&original, CompressionKind::Lz4).unwrap();

        // Claiming the wrong raw length must not yield a silently wrong body.
        assert!(decompress(&compressed, 255, CompressionKind::Lz4).is_err());
    }

    #[test]
    fn test_malformed_compressed_data() {
        let malformed = vec![0xff, 0xff, 0xff, 0x00, 0x12];
        for kind in [CompressionKind::Lz4, CompressionKind::Zstd] {
            assert!(
                decompress(&malformed, 1024, kind).is_err(),
                "should reject malformed compressed data"
            );
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_below_floor_not_compressed() {
        let data = b"tiny";
        let out = compress_if_smaller(data, CompressionKind::Lz4, 16).unwrap();
        assert!(out.is_none());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_compressible_payload_adopted() {
        let data = vec![7u8; 1024];
        let out = compress_if_smaller(&data, CompressionKind::Lz4, 16)
            .unwrap()
            .expect("repetitive payload should shrink");
        assert!(out.len() < data.len());
        let roundtrip = decompress(&out, data.len(), CompressionKind::Lz4).unwrap();
        assert_eq!(roundtrip, data);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_incompressible_payload_skipped() {
        // Every byte value once: no repetition for a block compressor to find.
        let data: Vec<u8> = (0..=255).collect();
        let out = compress_if_smaller(&data, CompressionKind::Lz4, 16).unwrap();
        assert!(out.is_none());
    }
}
