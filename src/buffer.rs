// ABOUTME: The staging buffer shared by the writer and reader, a contiguously addressable
// ABOUTME: region that grows on demand via fallible allocation and never shrinks mid-operation.

use crate::error::{ErrorKind, FramerError};
use crate::wire::{round_up_to_granularity, HEADER_SIZE};
use tracing::debug;

/// Extra bytes reserved at the end of every allocation: room for the largest header
/// (plain + compressed) plus the trailing safety zero described by the wire format.
const HEADER_RESERVATION: usize = HEADER_SIZE + crate::wire::COMPRESSED_HEADER_EXTRA + 1;

/// A grow-on-demand buffer used both for outbound accumulation (writer) and inbound
/// reassembly (reader). Offsets, not raw pointers, are the only cursors this type exposes;
/// callers re-derive any transient slices after a growth.
pub struct StagingBuffer {
    data: Vec<u8>,
    max_allowed_packet: u32,
    io_granularity: usize,
}

impl StagingBuffer {
    pub fn new(initial_capacity: usize, max_allowed_packet: u32, io_granularity: usize) -> Self {
        let len = initial_capacity + HEADER_RESERVATION;
        let mut data = Vec::new();
        data.try_reserve(len).expect("initial staging buffer allocation");
        data.resize(len, 0);
        Self { data, max_allowed_packet, io_granularity: io_granularity.max(1) }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn max_allowed_packet(&self) -> u32 {
        self.max_allowed_packet
    }

    /// Ensures the buffer can hold a logical packet of `required` bytes plus header
    /// reservation, growing it if necessary. Mirrors the reference `net_realloc` policy:
    /// round up to the I/O granularity, reject outright if it would exceed
    /// `max_allowed_packet`, and leave all prior state untouched on allocation failure.
    pub fn ensure_capacity(&mut self, required: usize) -> Result<(), FramerError> {
        if required as u64 >= self.max_allowed_packet as u64 {
            return Err(FramerError::PacketTooLarge {
                size: required,
                limit: self.max_allowed_packet,
            });
        }
        let needed = required + HEADER_RESERVATION;
        if needed <= self.data.len() {
            return Ok(());
        }
        let rounded = round_up_to_granularity_with(required, self.io_granularity);
        let new_capacity = rounded + HEADER_RESERVATION;
        debug!(from = self.data.len(), to = new_capacity, "growing staging buffer");
        self.try_grow_to(new_capacity)
    }

    fn try_grow_to(&mut self, new_capacity: usize) -> Result<(), FramerError> {
        if new_capacity > self.data.capacity() {
            self.data
                .try_reserve(new_capacity - self.data.len())
                .map_err(|_| FramerError::OutOfResources { requested: new_capacity })?;
        }
        self.data.resize(new_capacity, 0);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn slice(&self, start: usize, len: usize) -> &[u8] {
        &self.data[start..start + len]
    }

    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Writes the single trailing safety byte just past a returned payload.
    pub fn terminate_at(&mut self, offset: usize) {
        self.data[offset] = 0;
    }

    /// Copies `buffer[0..len]` out as an owned `Vec`, for handing a staged write off to the
    /// transport (or the compressor) once the writer has decided to flush.
    pub fn take_staged(&self, len: usize) -> Vec<u8> {
        self.data[..len].to_vec()
    }

    /// Moves `len` bytes within the buffer from `src` to `dst`, used by the compressed
    /// reader to coalesce inner-frame headers out of a reassembled logical packet.
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        self.data.copy_within(src..src + len, dst);
    }
}

fn round_up_to_granularity_with(len: usize, granularity: usize) -> usize {
    if granularity.is_power_of_two() {
        (len + granularity - 1) & !(granularity - 1)
    } else {
        round_up_to_granularity(len)
    }
}
