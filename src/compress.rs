// ABOUTME: The compressed-envelope payload transform, wrapping and unwrapping zlib frames.
// ABOUTME: Falls back to storing the payload verbatim when compressing it wouldn't shrink it.

//! The compressed-envelope payload transform.
//!
//! A compressed frame's body is either the zlib-deflated payload (when that shrinks it) or
//! the original payload verbatim (when it doesn't); the sibling [`crate::wire::CompressedHeader`]
//! distinguishes the two cases with its `uncompressed_length` field.

use crate::error::FramerError;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use std::io::Read;
use tracing::debug;

/// Result of attempting to compress one frame's payload.
pub struct CompressedPayload {
    pub bytes: Vec<u8>,
    /// The original length if compression helped, or `0` if the payload is stored as-is.
    pub uncompressed_length: u32,
}

/// Compresses `payload`. Falls back to storing it uncompressed if deflating it would not
/// actually shrink it, matching the reference compressor's behavior.
pub fn compress_payload(payload: &[u8]) -> CompressedPayload {
    let mut encoder = ZlibEncoder::new(payload, Compression::default());
    let mut compressed = Vec::with_capacity(payload.len());
    if encoder.read_to_end(&mut compressed).is_ok() && compressed.len() < payload.len() {
        CompressedPayload { bytes: compressed, uncompressed_length: payload.len() as u32 }
    } else {
        debug!(len = payload.len(), "compression did not shrink payload, storing as-is");
        CompressedPayload { bytes: payload.to_vec(), uncompressed_length: 0 }
    }
}

/// Expands a compressed frame body back to its original bytes.
///
/// If `uncompressed_length == 0`, `body` is already the original payload. Otherwise `body`
/// is inflated and must yield exactly `uncompressed_length` bytes.
pub fn decompress_payload(body: &[u8], uncompressed_length: u32) -> Result<Vec<u8>, FramerError> {
    if uncompressed_length == 0 {
        return Ok(body.to_vec());
    }
    let mut decoder = ZlibDecoder::new(body);
    let mut out = Vec::with_capacity(uncompressed_length as usize);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FramerError::UncompressError { reason: e.to_string() })?;
    if out.len() != uncompressed_length as usize {
        return Err(FramerError::UncompressError {
            reason: format!(
                "expected {} bytes after decompression, got {}",
                uncompressed_length,
                out.len()
            ),
        });
    }
    Ok(out)
}
