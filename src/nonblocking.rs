// ABOUTME: Non-blocking, cooperative write and read state machines for the resumable API.
// ABOUTME: Each tick performs at most one transport call and never blocks the caller's thread.

//! Each tick performs at most one transport call and returns [`Poll::NotReady`] (call again
//! once the transport signals readiness) or [`Poll::Complete`]. Neither machine blocks; the
//! caller is responsible for waiting on external readiness between ticks. Non-blocking
//! operations use the uncompressed wire format only — combining compression with the
//! resumable driver is not supported.
//!
//! The write side builds a scatter list covering every byte not yet handed to the transport —
//! each frame contributes a header descriptor plus one or more payload descriptors borrowed
//! directly from the caller's segments — and drains it with a single `write_vectored` call per
//! tick, so a multi-frame `send_command` never copies the caller's payload.
//!
//! The read side's [`Framer::poll_read`] completes at the boundary of one *physical* frame,
//! not one logical packet: a full-size frame (`length == `[`MAX_FRAME_PAYLOAD`]) is reported as
//! `Poll::Complete(MAX_FRAME_PAYLOAD)` with `read_offset` already advanced past it, so a caller
//! reassembling a multi-frame logical packet re-enters `poll_read` and accumulates the returned
//! lengths itself until a shorter frame (including a zero-length terminator) completes the
//! sequence. `read_offset` returns to its resting value of 0 once that terminal frame lands.

use crate::connection::Framer;
use crate::error::FramerError;
use crate::transport::Transport;
use crate::wire::{slice_at, FrameHeader, HEADER_SIZE, MAX_FRAME_PAYLOAD};
use std::io::IoSlice;
use tracing::trace;

/// The outcome of one tick of a non-blocking operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll<T> {
    NotReady,
    Complete(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePhase {
    Idle,
    Writing,
    Complete,
}

struct FrameSlot {
    header: [u8; HEADER_SIZE],
    payload_start: usize,
    payload_len: usize,
}

/// Resumable state for the non-blocking write path. Lives inside the [`Framer`] so it
/// survives across [`Framer::poll_write`] calls.
pub struct WriteMachine {
    phase: WritePhase,
    frames: Vec<FrameSlot>,
    frame_index: usize,
    header_sent: usize,
    payload_sent: usize,
}

impl WriteMachine {
    pub fn new() -> Self {
        Self {
            phase: WritePhase::Idle,
            frames: Vec::new(),
            frame_index: 0,
            header_sent: 0,
            payload_sent: 0,
        }
    }

    fn is_active(&self) -> bool {
        self.phase == WritePhase::Writing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    Idle,
    ReadingHeader,
    ReadingBody,
}

/// Resumable state for the non-blocking read path. Covers exactly one physical frame; a
/// multi-frame logical packet is driven by the caller re-invoking [`Framer::poll_read`] (see
/// the module documentation).
pub struct ReadMachine {
    phase: ReadPhase,
    header_bytes: [u8; HEADER_SIZE],
    header_filled: usize,
    body_offset: usize,
    body_len: usize,
    body_filled: usize,
}

impl ReadMachine {
    pub fn new() -> Self {
        Self {
            phase: ReadPhase::Idle,
            header_bytes: [0u8; HEADER_SIZE],
            header_filled: 0,
            body_offset: 0,
            body_len: 0,
            body_filled: 0,
        }
    }
}

impl<T: Transport> Framer<T> {
    /// Begins a non-blocking write of `command_tag` (if any) followed by `header_len` bytes of
    /// header followed by `payload_len` bytes of payload. Call [`Framer::poll_write`] with the
    /// matching `[tag?, header_bytes, payload]` slices until it reports [`Poll::Complete`].
    pub fn begin_write(&mut self, command_tag: Option<u8>, header_len: usize, payload_len: usize) {
        let tag_len = if command_tag.is_some() { 1 } else { 0 };
        let total_len = tag_len + header_len + payload_len;
        let mut frames = Vec::new();
        let mut sent = 0usize;
        loop {
            let remaining = total_len - sent;
            let frame_len = remaining.min(MAX_FRAME_PAYLOAD);
            let seq = self.next_seq_out();
            let mut header = [0u8; HEADER_SIZE];
            FrameHeader { length: frame_len as u32, sequence: seq }.encode_to(&mut header);
            frames.push(FrameSlot { header, payload_start: sent, payload_len: frame_len });
            sent += frame_len;
            if frame_len < MAX_FRAME_PAYLOAD {
                break;
            }
            if sent == total_len {
                let seq = self.next_seq_out();
                let mut header = [0u8; HEADER_SIZE];
                FrameHeader { length: 0, sequence: seq }.encode_to(&mut header);
                frames.push(FrameSlot { header, payload_start: sent, payload_len: 0 });
                break;
            }
        }
        self.write_machine = WriteMachine {
            phase: WritePhase::Writing,
            frames,
            frame_index: 0,
            header_sent: 0,
            payload_sent: 0,
        };
    }

    /// Advances an in-flight non-blocking write by at most one `write_vectored` transport call.
    ///
    /// `segments` must be the same `[command_tag?, header_bytes, payload]` slices (same order,
    /// same lengths) passed to [`Framer::begin_write`] — the machine holds only offsets into
    /// their logical concatenation, not copies of the bytes themselves.
    pub fn poll_write(&mut self, segments: &[&[u8]]) -> Result<Poll<()>, FramerError> {
        if !self.write_machine.is_active() {
            return Ok(Poll::Complete(()));
        }
        if self.write_machine.frame_index >= self.write_machine.frames.len() {
            self.write_machine.phase = WritePhase::Complete;
            return Ok(Poll::Complete(()));
        }

        // Build the scatter list for every byte not yet written, across all remaining frames,
        // and remember each descriptor's (frame, is_header, length) so the write count can be
        // walked back onto the (frame_index, header_sent, payload_sent) cursor below.
        let mut descriptors: Vec<IoSlice<'_>> = Vec::new();
        let mut tags: Vec<(usize, bool, usize)> = Vec::new();
        let start_index = self.write_machine.frame_index;
        {
            let frames = &self.write_machine.frames;
            for (i, frame) in frames.iter().enumerate().skip(start_index) {
                let (header_start, payload_start_in_frame) = if i == start_index {
                    (self.write_machine.header_sent, self.write_machine.payload_sent)
                } else {
                    (0, 0)
                };
                if header_start < HEADER_SIZE {
                    let h = &frame.header[header_start..];
                    descriptors.push(IoSlice::new(h));
                    tags.push((i, true, h.len()));
                }
                let mut off = payload_start_in_frame;
                while off < frame.payload_len {
                    let chunk = slice_at(segments, frame.payload_start + off);
                    let take = chunk.len().min(frame.payload_len - off);
                    if take == 0 {
                        break;
                    }
                    descriptors.push(IoSlice::new(&chunk[..take]));
                    tags.push((i, false, take));
                    off += take;
                }
            }
        }

        if descriptors.is_empty() {
            self.write_machine.phase = WritePhase::Complete;
            return Ok(Poll::Complete(()));
        }

        let n = match self.transport.write_vectored(&descriptors) {
            Ok(n) if n > 0 => n,
            Ok(_) => return Ok(Poll::NotReady),
            Err(e) if self.transport.was_timeout(&e) || self.transport.should_retry(&e) => {
                return Ok(Poll::NotReady)
            }
            Err(e) => return Err(self.record_error(FramerError::WriteError(e))),
        };
        trace!(start_index, n, "nonblocking vectored write");
        drop(descriptors);

        let mut remaining = n;
        for (frame_idx, is_header, len) in tags {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(len);
            if frame_idx == self.write_machine.frame_index {
                if is_header {
                    self.write_machine.header_sent += take;
                } else {
                    self.write_machine.payload_sent += take;
                }
            }
            remaining -= take;
            if take == len && frame_idx == self.write_machine.frame_index {
                let frame_len = self.write_machine.frames[frame_idx].payload_len;
                if self.write_machine.header_sent >= HEADER_SIZE
                    && self.write_machine.payload_sent >= frame_len
                {
                    self.write_machine.frame_index += 1;
                    self.write_machine.header_sent = 0;
                    self.write_machine.payload_sent = 0;
                }
            }
        }

        if self.write_machine.frame_index >= self.write_machine.frames.len() {
            self.write_machine.phase = WritePhase::Complete;
            Ok(Poll::Complete(()))
        } else {
            Ok(Poll::NotReady)
        }
    }

    /// Advances an in-flight non-blocking read by at most one transport call, starting a new
    /// read if none is in flight. Completes at the boundary of a single physical frame — see
    /// the module documentation for how a caller reassembles a multi-frame logical packet from
    /// repeated calls. On completion the frame's payload is available via [`Framer::payload`].
    pub fn poll_read(&mut self) -> Result<Poll<usize>, FramerError> {
        loop {
            match self.read_machine.phase {
                ReadPhase::Idle => {
                    self.read_machine.phase = ReadPhase::ReadingHeader;
                    self.read_machine.header_filled = 0;
                }
                ReadPhase::ReadingHeader => {
                    let filled = self.read_machine.header_filled;
                    return match self.transport.read(&mut self.read_machine.header_bytes[filled..]) {
                        Ok(0) => Err(self.record_error(FramerError::EndOfStream)),
                        Ok(n) => {
                            self.read_machine.header_filled += n;
                            if self.read_machine.header_filled < HEADER_SIZE {
                                return Ok(Poll::NotReady);
                            }
                            let header = FrameHeader::decode(&self.read_machine.header_bytes);
                            self.expect_seq_in(header.sequence)?;
                            if header.length == 0 {
                                self.last_read_offset = self.read_offset;
                                self.last_read_len = 0;
                                self.buffer.terminate_at(self.read_offset);
                                self.read_offset = 0;
                                self.read_machine.phase = ReadPhase::Idle;
                                return Ok(Poll::Complete(0));
                            }
                            let length = header.length as usize;
                            self.buffer.ensure_capacity(self.read_offset + length)?;
                            self.read_machine.body_offset = self.read_offset;
                            self.read_machine.body_len = length;
                            self.read_machine.body_filled = 0;
                            self.read_machine.phase = ReadPhase::ReadingBody;
                            Ok(Poll::NotReady)
                        }
                        Err(e) if self.transport.was_timeout(&e) || self.transport.should_retry(&e) => {
                            Ok(Poll::NotReady)
                        }
                        Err(e) => Err(self.record_error(FramerError::ReadError(e))),
                    };
                }
                ReadPhase::ReadingBody => {
                    let offset = self.read_machine.body_offset + self.read_machine.body_filled;
                    let end = self.read_machine.body_offset + self.read_machine.body_len;
                    let outcome = {
                        let slice = &mut self.buffer.as_mut_slice()[offset..end];
                        self.transport.read(slice)
                    };
                    return match outcome {
                        Ok(0) => Err(self.record_error(FramerError::EndOfStream)),
                        Ok(n) => {
                            self.read_machine.body_filled += n;
                            if self.read_machine.body_filled < self.read_machine.body_len {
                                return Ok(Poll::NotReady);
                            }
                            let frame_len = self.read_machine.body_len;
                            let frame_start = self.read_machine.body_offset;
                            self.buffer.terminate_at(frame_start + frame_len);
                            self.last_read_offset = frame_start;
                            self.last_read_len = frame_len;
                            self.read_machine.phase = ReadPhase::Idle;
                            // A full-size frame signals a multi-frame logical packet: advance
                            // read_offset past it so the next physical frame lands contiguously,
                            // and report its length as-is so the caller knows to re-enter. Any
                            // shorter frame (including the zero-length terminator handled above)
                            // ends the logical packet, so read_offset returns to its resting value.
                            self.read_offset = if frame_len < MAX_FRAME_PAYLOAD {
                                0
                            } else {
                                frame_start + frame_len
                            };
                            Ok(Poll::Complete(frame_len))
                        }
                        Err(e) if self.transport.was_timeout(&e) || self.transport.should_retry(&e) => {
                            Ok(Poll::NotReady)
                        }
                        Err(e) => Err(self.record_error(FramerError::ReadError(e))),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FramerConfig;
    use crate::transport::{Direction, Transport};
    use std::collections::VecDeque;
    use std::io::{self, IoSlice};
    use std::time::Duration;

    /// A transport that accepts/returns at most `chunk` bytes per call and reports
    /// `WouldBlock` once its queue is exhausted, to exercise partial progress.
    struct ChunkyTransport {
        chunk: usize,
        outbox: Vec<u8>,
        inbox: VecDeque<u8>,
    }

    impl ChunkyTransport {
        fn new(chunk: usize, inbox: Vec<u8>) -> Self {
            Self { chunk, outbox: Vec::new(), inbox: inbox.into() }
        }
    }

    impl Transport for ChunkyTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inbox.is_empty() {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            let take = buf.len().min(self.chunk).min(self.inbox.len());
            for slot in buf.iter_mut().take(take) {
                *slot = self.inbox.pop_front().unwrap();
            }
            Ok(take)
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            let take = buf.len().min(self.chunk);
            self.outbox.extend_from_slice(&buf[..take]);
            Ok(take)
        }

        fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
            match bufs.first() {
                Some(first) => self.write(first),
                None => Ok(0),
            }
        }

        fn set_blocking(&mut self, _blocking: bool) -> io::Result<()> {
            Ok(())
        }

        fn is_blocking(&self) -> bool {
            false
        }

        fn set_timeout(&mut self, _direction: Direction, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn pending(&self) -> io::Result<usize> {
            Ok(self.inbox.len())
        }
    }

    #[test]
    fn nonblocking_write_completes_over_several_ticks() {
        let transport = ChunkyTransport::new(2, Vec::new());
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();
        let tag = 0x03u8;
        let payload = vec![0xABu8; 100];
        framer.begin_write(Some(tag), 0, payload.len());

        let tag_slice = [tag];
        let header_slice: &[u8] = &[];
        let segments = [&tag_slice[..], header_slice, &payload[..]];

        let mut ticks = 0;
        loop {
            match framer.poll_write(&segments).unwrap() {
                Poll::NotReady => {
                    ticks += 1;
                    assert!(ticks < 1000, "non-blocking write never completed");
                }
                Poll::Complete(()) => break,
            }
        }
        assert_eq!(framer.teardown().outbox.len(), HEADER_SIZE + 1 + payload.len());
    }

    #[test]
    fn nonblocking_read_completes_over_several_ticks() {
        let mut wire = vec![0x03, 0x00, 0x00, 0x00];
        wire.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        let transport = ChunkyTransport::new(2, wire);
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();

        let mut ticks = 0;
        let len = loop {
            match framer.poll_read().unwrap() {
                Poll::NotReady => {
                    ticks += 1;
                    assert!(ticks < 1000, "non-blocking read never completed");
                }
                Poll::Complete(len) => break len,
            }
        };
        assert_eq!(len, 3);
        assert_eq!(framer.payload(), &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn nonblocking_read_reports_each_frame_of_a_multi_frame_packet() {
        let first_frame = vec![0xABu8; MAX_FRAME_PAYLOAD];
        let mut wire = vec![0xFF, 0xFF, 0xFF, 0x00];
        wire.extend_from_slice(&first_frame);
        wire.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        let transport = ChunkyTransport::new(1 << 20, wire);
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();

        let mut ticks = 0;
        let first_len = loop {
            match framer.poll_read().unwrap() {
                Poll::NotReady => {
                    ticks += 1;
                    assert!(ticks < 1000, "first frame never completed");
                }
                Poll::Complete(len) => break len,
            }
        };
        assert_eq!(first_len, MAX_FRAME_PAYLOAD);
        assert_eq!(framer.read_offset, MAX_FRAME_PAYLOAD, "read_offset must advance past a full-size frame");
        assert_eq!(framer.payload(), first_frame.as_slice());

        let second_len = loop {
            match framer.poll_read().unwrap() {
                Poll::NotReady => {
                    ticks += 1;
                    assert!(ticks < 1000, "terminator frame never completed");
                }
                Poll::Complete(len) => break len,
            }
        };
        assert_eq!(second_len, 0, "a zero-length terminator ends the logical packet");
        assert_eq!(framer.read_offset, 0, "read_offset must return to its resting value");
    }
}
