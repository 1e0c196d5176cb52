// ABOUTME: Error types for the packet-framing layer, with a fatal/non-fatal classification.
// ABOUTME: Built on thiserror so every variant keeps a readable message and its I/O source.

//! Error types for the packet-framing layer.
//!
//! Mirrors the structured error handling used throughout this crate: a `thiserror`-derived
//! enum with readable messages and `#[source]` propagation of the underlying I/O error where
//! one exists.

use std::io;
use thiserror::Error;

/// Classifies a [`FramerError`] without the attached message or source, for callers that
/// want to `match` on outcome rather than print it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A logical packet would exceed the configured `max_allowed_packet`.
    PacketTooLarge,
    /// The staging buffer could not be grown to the required size.
    OutOfResources,
    /// A received frame's sequence number did not match the expected counter.
    SequenceError,
    /// Unrecoverable error while reading from the transport.
    ReadError,
    /// Unrecoverable error while writing to the transport.
    WriteError,
    /// A read was abandoned after exhausting the configured retry budget or timeout.
    ReadInterrupted,
    /// A write was abandoned after exhausting the configured retry budget or timeout.
    WriteInterrupted,
    /// Decompression of a compressed frame's payload failed.
    UncompressError,
    /// The peer closed the connection before a complete frame was read.
    EndOfStream,
}

/// The error type returned by every fallible operation on a [`crate::Framer`].
#[derive(Debug, Error)]
pub enum FramerError {
    #[error("logical packet of {size} bytes exceeds max_allowed_packet ({limit} bytes)")]
    PacketTooLarge { size: usize, limit: u32 },

    #[error("failed to grow staging buffer to {requested} bytes")]
    OutOfResources { requested: usize },

    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceError { expected: u8, actual: u8 },

    #[error("read error: {0}")]
    ReadError(#[source] io::Error),

    #[error("write error: {0}")]
    WriteError(#[source] io::Error),

    #[error("read interrupted after exceeding retry budget")]
    ReadInterrupted(#[source] io::Error),

    #[error("write interrupted after exceeding retry budget")]
    WriteInterrupted(#[source] io::Error),

    #[error("failed to decompress frame payload: {reason}")]
    UncompressError { reason: String },

    #[error("connection closed by peer before a complete frame was read")]
    EndOfStream,
}

impl FramerError {
    /// Returns the structured classification of this error, discarding the message/source.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FramerError::PacketTooLarge { .. } => ErrorKind::PacketTooLarge,
            FramerError::OutOfResources { .. } => ErrorKind::OutOfResources,
            FramerError::SequenceError { .. } => ErrorKind::SequenceError,
            FramerError::ReadError(_) => ErrorKind::ReadError,
            FramerError::WriteError(_) => ErrorKind::WriteError,
            FramerError::ReadInterrupted(_) => ErrorKind::ReadInterrupted,
            FramerError::WriteInterrupted(_) => ErrorKind::WriteInterrupted,
            FramerError::UncompressError { .. } => ErrorKind::UncompressError,
            FramerError::EndOfStream => ErrorKind::EndOfStream,
        }
    }

    /// Whether this error leaves the connection in a state where further operations should
    /// not be attempted. Matches the reference "connection should be closed" marker.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::PacketTooLarge | ErrorKind::OutOfResources
        )
    }
}

pub type Result<T> = std::result::Result<T, FramerError>;
