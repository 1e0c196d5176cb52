// ABOUTME: The Framer ties a staging buffer, sequence counters and a transport together
// ABOUTME: behind the blocking and non-blocking packet APIs.

//! The `Framer`: a staging buffer, sequence counters and a transport bound together behind
//! the blocking and non-blocking packet APIs.

use crate::buffer::StagingBuffer;
use crate::config::FramerConfig;
use crate::error::{ErrorKind, FramerError};
use crate::nonblocking::{ReadMachine, WriteMachine};
use crate::transport::{Direction, Transport};
use tracing::{debug, warn};

/// Tracks whether a blocking call is currently in flight, for the same reason the reference
/// implementation keeps an explicit "error" marker: so a caller that re-enters the framer
/// while an operation is outstanding fails loudly instead of corrupting the staging buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoState {
    Idle,
    Reading,
    Writing,
}

/// A single connection's packet-framing state.
///
/// Not `Send`/`Sync`-restricted beyond what `T` itself is, but a `Framer` is not safe to use
/// from more than one thread at a time: the staging buffer is exclusively owned and is reused
/// across both directions.
pub struct Framer<T: Transport> {
    pub(crate) transport: T,
    pub(crate) buffer: StagingBuffer,
    pub(crate) write_pos: usize,
    pub(crate) read_offset: usize,
    pub(crate) last_read_offset: usize,
    pub(crate) last_read_len: usize,
    pub(crate) seq_out: u8,
    pub(crate) seq_in: u8,
    pub(crate) compress_seq: u8,
    pub(crate) compress_enabled: bool,
    pub(crate) config: FramerConfig,
    pub(crate) last_error: Option<ErrorKind>,
    pub(crate) io_in_progress: IoState,
    pub(crate) usable: bool,
    pub(crate) write_machine: WriteMachine,
    pub(crate) read_machine: ReadMachine,
    pub(crate) compressed_scratch: crate::reader::CompressedScratch,
}

impl<T: Transport> Framer<T> {
    pub fn new(mut transport: T, config: FramerConfig) -> Result<Self, FramerError> {
        transport
            .set_timeout(Direction::Read, config.read_timeout())
            .map_err(FramerError::ReadError)?;
        transport
            .set_timeout(Direction::Write, config.write_timeout())
            .map_err(FramerError::WriteError)?;
        let compress_enabled = config.compress_enabled();
        let buffer = StagingBuffer::new(
            config.initial_buffer_capacity(),
            config.max_allowed_packet(),
            config.io_granularity(),
        );
        Ok(Self {
            transport,
            buffer,
            write_pos: 0,
            read_offset: 0,
            last_read_offset: 0,
            last_read_len: 0,
            seq_out: 0,
            seq_in: 0,
            compress_seq: 0,
            compress_enabled,
            config,
            last_error: None,
            io_in_progress: IoState::Idle,
            usable: true,
            write_machine: WriteMachine::new(),
            read_machine: ReadMachine::new(),
            compressed_scratch: crate::reader::CompressedScratch::new(),
        })
    }

    pub fn config(&self) -> &FramerConfig {
        &self.config
    }

    /// Prepares the framer for a new logical command: resets both sequence counters and
    /// discards any partially staged write, matching the boundary the reference protocol
    /// draws between unrelated request/response exchanges.
    ///
    /// In debug builds this also checks, via [`Transport::pending`], that the transport has at
    /// most one stray buffered byte (e.g. a lingering EOF) — the same sanity check the
    /// reference implementation performs before trusting that the peer is actually done
    /// talking.
    pub fn reset_for_new_command(&mut self) {
        if let Ok(pending) = self.transport.pending() {
            debug_assert!(
                pending <= 1,
                "{pending} stray bytes buffered on the transport at a command boundary"
            );
        }
        self.seq_out = 0;
        self.seq_in = 0;
        self.compress_seq = 0;
        self.write_pos = 0;
    }

    pub fn set_compression(&mut self, enabled: bool) {
        self.compress_enabled = enabled;
    }

    pub fn compression_enabled(&self) -> bool {
        self.compress_enabled
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// The payload of the most recently completed read, not including the trailing safety
    /// byte. For a blocking [`Framer::read_one_logical_packet`] this is the whole reassembled
    /// logical packet; for the non-blocking [`Framer::poll_read`] it is just the physical frame
    /// that most recently completed (see that method's documentation).
    pub fn payload(&self) -> &[u8] {
        self.buffer.slice(self.last_read_offset, self.last_read_len)
    }

    /// Whether the connection is still usable, i.e. has not hit a fatal error. Mirrors the
    /// reference `net->error == 2` marker.
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    /// Consumes the framer, releasing the staging buffer and returning transport ownership.
    pub fn teardown(self) -> T {
        self.transport
    }

    pub(crate) fn record_error(&mut self, err: FramerError) -> FramerError {
        self.last_error = Some(err.kind());
        if err.is_fatal() {
            warn!(kind = ?err.kind(), "framer entering unusable state");
            self.usable = false;
        }
        err
    }

    pub(crate) fn begin_io(&mut self, state: IoState) {
        debug_assert_eq!(self.io_in_progress, IoState::Idle, "overlapping I/O on one framer");
        self.io_in_progress = state;
    }

    pub(crate) fn end_io(&mut self) {
        self.io_in_progress = IoState::Idle;
    }

    /// The raw retrying write loop shared by the blocking writer paths: writes `buf` in full,
    /// tolerating up to `retry_limit` recoverable interruptions before giving up.
    pub(crate) fn write_raw_loop(&mut self, buf: &[u8]) -> Result<(), FramerError> {
        let mut written = 0usize;
        let mut retries = 0u32;
        while written < buf.len() {
            match self.transport.write(&buf[written..]) {
                Ok(0) => {
                    let err = FramerError::WriteError(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "transport accepted zero bytes",
                    ));
                    return Err(self.record_error(err));
                }
                Ok(n) => {
                    written += n;
                    retries = 0;
                }
                Err(e) if self.transport.should_retry(&e) => {
                    retries += 1;
                    if retries > self.config.retry_limit() {
                        return Err(self.record_error(FramerError::WriteInterrupted(e)));
                    }
                }
                Err(e) if self.transport.was_timeout(&e) => {
                    return Err(self.record_error(FramerError::WriteInterrupted(e)));
                }
                Err(e) => return Err(self.record_error(FramerError::WriteError(e))),
            }
        }
        Ok(())
    }

    /// The raw retrying read loop shared by the blocking reader paths: fills `buf` in full.
    pub(crate) fn read_raw_loop(&mut self, buf: &mut [u8]) -> Result<(), FramerError> {
        let mut read = 0usize;
        let mut retries = 0u32;
        while read < buf.len() {
            match self.transport.read(&mut buf[read..]) {
                Ok(0) => {
                    return Err(self.record_error(FramerError::EndOfStream));
                }
                Ok(n) => {
                    read += n;
                    retries = 0;
                }
                Err(e) if self.transport.should_retry(&e) => {
                    retries += 1;
                    if retries > self.config.retry_limit() {
                        return Err(self.record_error(FramerError::ReadInterrupted(e)));
                    }
                }
                Err(e) if self.transport.was_timeout(&e) => {
                    return Err(self.record_error(FramerError::ReadInterrupted(e)));
                }
                Err(e) => return Err(self.record_error(FramerError::ReadError(e))),
            }
        }
        Ok(())
    }

    pub(crate) fn next_seq_out(&mut self) -> u8 {
        let seq = self.seq_out;
        self.seq_out = self.seq_out.wrapping_add(1);
        seq
    }

    pub(crate) fn expect_seq_in(&mut self, actual: u8) -> Result<(), FramerError> {
        if actual != self.seq_in {
            let err = FramerError::SequenceError { expected: self.seq_in, actual };
            return Err(self.record_error(err));
        }
        self.seq_in = self.seq_in.wrapping_add(1);
        debug!(seq = actual, "frame sequence validated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TcpTransport;
    use std::net::{TcpListener, TcpStream};

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn new_framer_starts_idle_and_usable() {
        let (client, _server) = connected_pair();
        let transport = TcpTransport::new(client).unwrap();
        let framer = Framer::new(transport, FramerConfig::default()).unwrap();
        assert!(framer.is_usable());
        assert_eq!(framer.last_error(), None);
        assert_eq!(framer.io_in_progress, IoState::Idle);
    }

    #[test]
    fn reset_for_new_command_zeroes_all_counters_and_write_pos() {
        let (client, _server) = connected_pair();
        let transport = TcpTransport::new(client).unwrap();
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();
        framer.seq_out = 5;
        framer.seq_in = 9;
        framer.compress_seq = 2;
        framer.write_pos = 3;
        framer.reset_for_new_command();
        assert_eq!(framer.seq_out, 0);
        assert_eq!(framer.seq_in, 0);
        assert_eq!(framer.compress_seq, 0);
        assert_eq!(framer.write_pos, 0);
    }

    #[test]
    fn expect_seq_in_rejects_mismatch() {
        let (client, _server) = connected_pair();
        let transport = TcpTransport::new(client).unwrap();
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();
        let err = framer.expect_seq_in(7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SequenceError);
        assert!(!framer.is_usable());
    }
}
