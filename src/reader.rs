// ABOUTME: Blocking read path, reassembling frames into a logical packet with optional
// ABOUTME: per-frame decompression.

//! Blocking read path: reassembling frames into a logical packet, with optional
//! per-frame decompression.

use crate::connection::{Framer, IoState};
use crate::error::FramerError;
use crate::transport::Transport;
use crate::wire::{CompressedHeader, FrameHeader, COMPRESSED_HEADER_EXTRA, HEADER_SIZE, MAX_FRAME_PAYLOAD};
use tracing::trace;

/// Backlog of already-decompressed bytes spanning compressed envelopes.
///
/// One compressed envelope can contain several inner (plain-format) frames, possibly more
/// than a single logical packet's worth. This holds whatever has been decompressed but not
/// yet handed to a caller, across calls to `read_one_logical_packet`.
pub struct CompressedScratch {
    pending: Vec<u8>,
}

impl CompressedScratch {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    fn available(&self) -> usize {
        self.pending.len()
    }

    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn take(&mut self, n: usize) -> Vec<u8> {
        let rest = self.pending.split_off(n);
        std::mem::replace(&mut self.pending, rest)
    }
}

impl<T: Transport> Framer<T> {
    /// Reads one complete logical packet, reassembling continuation frames and decompressing
    /// as needed. The payload is available afterwards via [`Framer::payload`].
    pub fn read_one_logical_packet(&mut self) -> Result<usize, FramerError> {
        self.begin_io(IoState::Reading);
        let result = if self.compress_enabled {
            self.read_compressed_logical_packet()
        } else {
            self.read_uncompressed_logical_packet()
        };
        self.end_io();
        if let Ok(len) = result {
            self.last_read_offset = self.read_offset;
            self.last_read_len = len;
        }
        result
    }

    fn read_uncompressed_logical_packet(&mut self) -> Result<usize, FramerError> {
        let start = self.read_offset;
        let mut total = 0usize;
        loop {
            let frame_len = self.read_one_plain_frame(start + total)?;
            total += frame_len;
            if frame_len < MAX_FRAME_PAYLOAD {
                break;
            }
        }
        self.buffer.terminate_at(start + total);
        Ok(total)
    }

    /// Reads one physical plain-format frame into `buffer[offset..offset+length]`, validating
    /// its sequence number. Returns the frame's payload length (0 both for an empty logical
    /// packet and for the mandatory terminator of an exact-multiple multi-frame packet).
    fn read_one_plain_frame(&mut self, offset: usize) -> Result<usize, FramerError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        self.read_raw_loop(&mut header_bytes)?;
        let header = FrameHeader::decode(&header_bytes);
        self.expect_seq_in(header.sequence)?;
        trace!(length = header.length, sequence = header.sequence, "read frame");
        if header.length == 0 {
            return Ok(0);
        }
        let length = header.length as usize;
        self.buffer.ensure_capacity(offset + length)?;
        self.read_raw_into_buffer(offset, length)?;
        Ok(length)
    }

    /// Like [`Framer::read_raw_loop`] but writes directly into the staging buffer, avoiding an
    /// intermediate copy for the (common, uncompressed) case.
    fn read_raw_into_buffer(&mut self, offset: usize, len: usize) -> Result<(), FramerError> {
        let mut read = 0usize;
        let mut retries = 0u32;
        while read < len {
            let outcome = {
                let slice = &mut self.buffer.as_mut_slice()[offset + read..offset + len];
                self.transport.read(slice)
            };
            match outcome {
                Ok(0) => return Err(self.record_error(FramerError::EndOfStream)),
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

    fn read_compressed_logical_packet(&mut self) -> Result<usize, FramerError> {
        let start = self.read_offset;
        let mut total = 0usize;
        loop {
            let frame_len = self.read_one_inner_frame(start + total)?;
            total += frame_len;
            if frame_len < MAX_FRAME_PAYLOAD {
                break;
            }
        }
        self.buffer.terminate_at(start + total);
        Ok(total)
    }

    fn read_one_inner_frame(&mut self, offset: usize) -> Result<usize, FramerError> {
        self.fill_compressed_scratch(HEADER_SIZE)?;
        let header_bytes = self.compressed_scratch.take(HEADER_SIZE);
        let header = FrameHeader::decode(&header_bytes);
        self.expect_seq_in(header.sequence)?;
        if header.length == 0 {
            return Ok(0);
        }
        let length = header.length as usize;
        self.fill_compressed_scratch(length)?;
        let body = self.compressed_scratch.take(length);
        self.buffer.ensure_capacity(offset + length)?;
        self.buffer.write_at(offset, &body);
        Ok(length)
    }

    fn fill_compressed_scratch(&mut self, need: usize) -> Result<(), FramerError> {
        while self.compressed_scratch.available() < need {
            self.read_one_compressed_envelope()?;
        }
        Ok(())
    }

    fn read_one_compressed_envelope(&mut self) -> Result<(), FramerError> {
        let mut outer_header = [0u8; HEADER_SIZE];
        self.read_raw_loop(&mut outer_header)?;
        let outer = FrameHeader::decode(&outer_header);

        let mut comp_header_bytes = [0u8; COMPRESSED_HEADER_EXTRA];
        self.read_raw_loop(&mut comp_header_bytes)?;
        let comp_header = CompressedHeader::decode(&comp_header_bytes);

        let mut body = vec![0u8; outer.length as usize];
        self.read_raw_loop(&mut body)?;

        let decompressed = crate::compress::decompress_payload(&body, comp_header.uncompressed_length)
            .map_err(|e| self.record_error(e))?;
        trace!(
            envelope_sequence = outer.sequence,
            compressed_len = outer.length,
            uncompressed_len = comp_header.uncompressed_length,
            "decompressed envelope"
        );
        self.compressed_scratch.push(&decompressed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FramerConfig;
    use crate::error::ErrorKind;
    use crate::transport::TcpTransport;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn reads_small_frame() {
        let (client, mut server) = connected_pair();
        server.write_all(&[0x03, 0x00, 0x00, 0x00, 0x41, 0x42, 0x43]).unwrap();
        let transport = TcpTransport::new(client).unwrap();
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();
        let len = framer.read_one_logical_packet().unwrap();
        assert_eq!(len, 3);
        assert_eq!(framer.payload(), &[0x41, 0x42, 0x43]);
    }

    #[test]
    fn rejects_sequence_mismatch() {
        let (client, mut server) = connected_pair();
        server.write_all(&[0x03, 0x00, 0x00, 0x07, 0x41, 0x42, 0x43]).unwrap();
        let transport = TcpTransport::new(client).unwrap();
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();
        let err = framer.read_one_logical_packet().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SequenceError);
    }

    #[test]
    fn oversize_header_is_rejected() {
        let (client, mut server) = connected_pair();
        // Announce a 2,000,000 byte frame against a 1 MiB max_allowed_packet.
        server.write_all(&[0x80, 0x84, 0x1E, 0x00]).unwrap();
        let transport = TcpTransport::new(client).unwrap();
        let config = FramerConfig::builder().max_allowed_packet(1024 * 1024).build();
        let mut framer = Framer::new(transport, config).unwrap();
        let err = framer.read_one_logical_packet().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PacketTooLarge);
    }

    #[test]
    fn empty_logical_packet_reads_as_zero_length() {
        let (client, mut server) = connected_pair();
        server.write_all(&[0x00, 0x00, 0x00, 0x00]).unwrap();
        let transport = TcpTransport::new(client).unwrap();
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();
        let len = framer.read_one_logical_packet().unwrap();
        assert_eq!(len, 0);
    }
}
