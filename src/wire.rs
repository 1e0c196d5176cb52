// ABOUTME: Wire-level constants and header encode/decode helpers for the packet-framing layer.
// ABOUTME: Defines the plain and compressed frame header layouts byte for byte.

//! Wire-level constants and header encode/decode helpers for the packet-framing layer.
//!
//! A physical frame is a 3-byte little-endian length, a 1-byte sequence number, and the
//! payload itself. When compression is active an additional 3-byte uncompressed-length
//! field follows the sequence number (see [`CompressedHeader`]).

use bytes::{Buf, BufMut, BytesMut};

/// Size in bytes of the plain frame header (length + sequence number).
pub const HEADER_SIZE: usize = 4;

/// Size in bytes of the extra field the compressed envelope adds on top of [`HEADER_SIZE`].
pub const COMPRESSED_HEADER_EXTRA: usize = 3;

/// Largest payload a single physical frame can carry. A logical packet exactly this size,
/// or larger, is split across multiple frames (see [`crate::writer`]).
pub const MAX_FRAME_PAYLOAD: usize = 0x00FF_FFFF;

/// Rounding granularity used by the staging buffer's grow-on-demand policy.
pub const IO_GRANULARITY: usize = 4096;

/// Plain frame header: payload length and sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub sequence: u8,
}

impl FrameHeader {
    pub const SIZE: usize = HEADER_SIZE;

    /// Decodes a header from exactly [`HEADER_SIZE`] bytes.
    ///
    /// # Panics
    /// Panics if `bytes.len() < HEADER_SIZE`; callers are expected to have already read a
    /// full header into a fixed-size buffer.
    pub fn decode(bytes: &[u8]) -> Self {
        let mut cursor = bytes;
        let length = (cursor.get_u8() as u32)
            | ((cursor.get_u8() as u32) << 8)
            | ((cursor.get_u8() as u32) << 16);
        let sequence = cursor.get_u8();
        Self { length, sequence }
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.reserve(HEADER_SIZE);
        out.put_u8((self.length & 0xFF) as u8);
        out.put_u8(((self.length >> 8) & 0xFF) as u8);
        out.put_u8(((self.length >> 16) & 0xFF) as u8);
        out.put_u8(self.sequence);
    }

    pub fn encode_to(&self, out: &mut [u8; HEADER_SIZE]) {
        out[0] = (self.length & 0xFF) as u8;
        out[1] = ((self.length >> 8) & 0xFF) as u8;
        out[2] = ((self.length >> 16) & 0xFF) as u8;
        out[3] = self.sequence;
    }
}

/// The extra 3-byte field carried by every frame once compression is active: the size the
/// payload expands to after decompression, or `0` if the compressor declined to shrink it
/// and stored the payload as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedHeader {
    pub uncompressed_length: u32,
}

impl CompressedHeader {
    pub const SIZE: usize = COMPRESSED_HEADER_EXTRA;

    pub fn decode(bytes: &[u8]) -> Self {
        let mut cursor = bytes;
        let uncompressed_length = (cursor.get_u8() as u32)
            | ((cursor.get_u8() as u32) << 8)
            | ((cursor.get_u8() as u32) << 16);
        Self { uncompressed_length }
    }

    pub fn encode_to(&self, out: &mut [u8; COMPRESSED_HEADER_EXTRA]) {
        out[0] = (self.uncompressed_length & 0xFF) as u8;
        out[1] = ((self.uncompressed_length >> 8) & 0xFF) as u8;
        out[2] = ((self.uncompressed_length >> 16) & 0xFF) as u8;
    }
}

/// Rounds `len` up to the next multiple of [`IO_GRANULARITY`].
pub fn round_up_to_granularity(len: usize) -> usize {
    (len + IO_GRANULARITY - 1) & !(IO_GRANULARITY - 1)
}

/// Returns the longest contiguous slice available starting at logical offset `start` within
/// the concatenation of `segments`, without copying. Used by the non-blocking write path to
/// turn a (frame, offset) position back into a borrowed byte range.
pub fn slice_at<'a>(segments: &[&'a [u8]], start: usize) -> &'a [u8] {
    let mut remaining = start;
    for segment in segments {
        let len = segment.len();
        if remaining < len {
            return &segment[remaining..];
        }
        remaining -= len;
    }
    &[]
}
