// ABOUTME: Blocking write path, fragmenting a logical packet into frames and accumulating
// ABOUTME: their encoded bytes in the staging buffer before flushing to the transport.

//! Blocking write path: fragmenting a logical packet into frames, accumulating their encoded
//! bytes in the staging buffer, optional per-frame-group compression, and flushing to the
//! transport.

use crate::connection::{Framer, IoState};
use crate::error::FramerError;
use crate::transport::Transport;
use crate::wire::{CompressedHeader, FrameHeader, COMPRESSED_HEADER_EXTRA, HEADER_SIZE, MAX_FRAME_PAYLOAD};
use tracing::trace;

impl<T: Transport> Framer<T> {
    /// Sends `payload` as one logical packet, splitting it across multiple frames if it is
    /// at least [`MAX_FRAME_PAYLOAD`] bytes long. Frame bytes are accumulated in the staging
    /// buffer and flushed to the transport whenever it fills; call [`Framer::flush`] to force
    /// out whatever is left buffered.
    pub fn enqueue(&mut self, payload: &[u8]) -> Result<(), FramerError> {
        self.write_logical(&[payload])
    }

    /// Sends `command_tag` followed by `header_bytes` followed by `payload` as a single
    /// logical packet, without materializing their concatenation. `command_tag` occupies the
    /// first byte of the first frame. Unlike `enqueue`, the staging buffer is flushed
    /// afterwards.
    pub fn send_command(
        &mut self,
        command_tag: u8,
        header_bytes: &[u8],
        payload: &[u8],
    ) -> Result<(), FramerError> {
        let tag = [command_tag];
        self.write_logical(&[&tag, header_bytes, payload])?;
        self.flush()
    }

    /// Flushes whatever is currently staged in `buffer[0 .. write_pos]` to the transport.
    /// If compression is active the staged bytes are wrapped in a single compressed envelope
    /// and the plain sequence counter is re-synchronized to the compressed one, matching the
    /// reference behavior.
    pub fn flush(&mut self) -> Result<(), FramerError> {
        self.begin_io(IoState::Writing);
        let result = self.flush_staged();
        self.end_io();
        result
    }

    fn write_logical(&mut self, segments: &[&[u8]]) -> Result<(), FramerError> {
        let total_len: usize = segments.iter().map(|s| s.len()).sum();
        self.begin_io(IoState::Writing);
        let result = self.write_logical_inner(total_len, segments);
        self.end_io();
        result
    }

    fn write_logical_inner(&mut self, total_len: usize, segments: &[&[u8]]) -> Result<(), FramerError> {
        let mut sent = 0usize;
        loop {
            let remaining = total_len - sent;
            let frame_len = remaining.min(MAX_FRAME_PAYLOAD);
            self.stage_one_frame(sent, frame_len, segments)?;
            sent += frame_len;
            if frame_len < MAX_FRAME_PAYLOAD {
                break;
            }
            if sent == total_len {
                // An exact multiple of MAX_FRAME_PAYLOAD requires a zero-length terminator
                // so the reader can tell the logical packet is complete.
                self.stage_one_frame(sent, 0, segments)?;
                break;
            }
        }
        Ok(())
    }

    fn stage_one_frame(
        &mut self,
        logical_offset: usize,
        frame_len: usize,
        segments: &[&[u8]],
    ) -> Result<(), FramerError> {
        let seq = self.next_seq_out();
        let header = FrameHeader { length: frame_len as u32, sequence: seq };
        let mut header_bytes = [0u8; HEADER_SIZE];
        header.encode_to(&mut header_bytes);
        trace!(length = frame_len, sequence = seq, compressed = self.compress_enabled, "staging frame");

        self.stage_bytes(&header_bytes)?;
        self.stage_segment_range(logical_offset, frame_len, segments)
    }

    /// The per-frame grow-on-demand window: when compression is active, the staged window is
    /// capped at `MAX_FRAME_PAYLOAD` so the compressed envelope's 3-byte uncompressed-length
    /// field can never be asked to describe more bytes than it can hold.
    fn staging_window(&self) -> usize {
        let capacity = self.buffer.capacity();
        if self.compress_enabled {
            capacity.min(MAX_FRAME_PAYLOAD)
        } else {
            capacity
        }
    }

    /// Copies `bytes` into `buffer[write_pos..]`, flushing whenever the staging window fills.
    fn stage_bytes(&mut self, mut bytes: &[u8]) -> Result<(), FramerError> {
        while !bytes.is_empty() {
            let window = self.staging_window();
            if self.write_pos >= window {
                self.flush_staged()?;
                continue;
            }
            let available = window - self.write_pos;
            let take = bytes.len().min(available);
            self.buffer.write_at(self.write_pos, &bytes[..take]);
            self.write_pos += take;
            bytes = &bytes[take..];
            if self.write_pos == window {
                self.flush_staged()?;
            }
        }
        Ok(())
    }

    fn stage_segment_range(
        &mut self,
        start: usize,
        len: usize,
        segments: &[&[u8]],
    ) -> Result<(), FramerError> {
        let mut remaining_start = start;
        let mut remaining_len = len;
        for segment in segments {
            let seg_len = segment.len();
            if remaining_start >= seg_len {
                remaining_start -= seg_len;
                continue;
            }
            let available = seg_len - remaining_start;
            let take = available.min(remaining_len);
            if take > 0 {
                self.stage_bytes(&segment[remaining_start..remaining_start + take])?;
                remaining_len -= take;
            }
            remaining_start = 0;
            if remaining_len == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Emits `buffer[0 .. write_pos]` (everything accumulated so far) and resets `write_pos`.
    /// With compression active, the whole staged window is wrapped as a single compressed
    /// envelope — which may cover more than one frame, mirroring how the reference compressor
    /// wraps whatever happens to be sitting in the staging buffer at flush time.
    fn flush_staged(&mut self) -> Result<(), FramerError> {
        if self.write_pos == 0 {
            if self.compress_enabled {
                self.seq_out = self.compress_seq;
            }
            return Ok(());
        }
        let staged = self.buffer.take_staged(self.write_pos);
        let result = if self.compress_enabled {
            self.write_compressed_envelope(&staged)
        } else {
            self.write_raw_loop(&staged)
        };
        result?;
        self.write_pos = 0;
        if self.compress_enabled {
            self.seq_out = self.compress_seq;
        }
        Ok(())
    }

    fn write_compressed_envelope(&mut self, inner: &[u8]) -> Result<(), FramerError> {
        let compressed = crate::compress::compress_payload(inner);
        let compress_seq = self.compress_seq;
        self.compress_seq = self.compress_seq.wrapping_add(1);

        let outer = FrameHeader { length: compressed.bytes.len() as u32, sequence: compress_seq };
        let mut outer_bytes = [0u8; HEADER_SIZE];
        outer.encode_to(&mut outer_bytes);
        self.write_raw_loop(&outer_bytes)?;

        let mut comp_bytes = [0u8; COMPRESSED_HEADER_EXTRA];
        CompressedHeader { uncompressed_length: compressed.uncompressed_length }.encode_to(&mut comp_bytes);
        self.write_raw_loop(&comp_bytes)?;

        self.write_raw_loop(&compressed.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FramerConfig;
    use crate::transport::TcpTransport;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn small_payload_produces_one_frame() {
        let (client, mut server) = connected_pair();
        let transport = TcpTransport::new(client).unwrap();
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();
        framer.enqueue(&[0x41, 0x42, 0x43]).unwrap();
        framer.flush().unwrap();

        let mut wire = [0u8; 7];
        server.read_exact(&mut wire).unwrap();
        assert_eq!(wire, [0x03, 0x00, 0x00, 0x00, 0x41, 0x42, 0x43]);
    }

    #[test]
    fn sequence_number_advances_per_frame() {
        let (client, mut server) = connected_pair();
        let transport = TcpTransport::new(client).unwrap();
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();
        framer.enqueue(&[1]).unwrap();
        framer.flush().unwrap();
        framer.enqueue(&[2]).unwrap();
        framer.flush().unwrap();

        let mut first = [0u8; 5];
        server.read_exact(&mut first).unwrap();
        assert_eq!(first[3], 0);
        let mut second = [0u8; 5];
        server.read_exact(&mut second).unwrap();
        assert_eq!(second[3], 1);
    }

    #[test]
    fn send_command_prefixes_tag_and_header() {
        let (client, mut server) = connected_pair();
        let transport = TcpTransport::new(client).unwrap();
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();
        framer.send_command(0x03, &[0xAA, 0xBB], &[0xCC]).unwrap();

        let mut wire = [0u8; 8];
        server.read_exact(&mut wire).unwrap();
        assert_eq!(&wire[0..3], &[0x04, 0x00, 0x00]);
        assert_eq!(&wire[4..], &[0x03, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn small_writes_stay_buffered_until_flush() {
        let (client, mut server) = connected_pair();
        let transport = TcpTransport::new(client).unwrap();
        let mut framer = Framer::new(transport, FramerConfig::default()).unwrap();
        framer.enqueue(&[0x41, 0x42, 0x43]).unwrap();

        server.set_read_timeout(Some(std::time::Duration::from_millis(50))).unwrap();
        let mut probe = [0u8; 1];
        let kind = server.read(&mut probe).unwrap_err().kind();
        assert!(
            matches!(kind, std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut),
            "expected a timeout-ish error, got {kind:?}"
        );

        framer.flush().unwrap();
        let mut wire = [0u8; 7];
        server.read_exact(&mut wire).unwrap();
        assert_eq!(wire, [0x03, 0x00, 0x00, 0x00, 0x41, 0x42, 0x43]);
    }

    #[test]
    fn oversize_write_flushes_across_multiple_buffer_windows() {
        let (client, mut server) = connected_pair();
        let transport = TcpTransport::new(client).unwrap();
        let config = FramerConfig::builder().initial_buffer_capacity(16).build();
        let mut framer = Framer::new(transport, config).unwrap();
        let payload = vec![0x5Au8; 4096];
        framer.enqueue(&payload).unwrap();
        framer.flush().unwrap();

        let mut wire = vec![0u8; HEADER_SIZE + payload.len()];
        server.read_exact(&mut wire).unwrap();
        assert_eq!(&wire[0..3], &[0x00, 0x10, 0x00]);
        assert_eq!(&wire[4..], payload.as_slice());
    }
}
