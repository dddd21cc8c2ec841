//! Bus writer: owns the write cursor and appends framed messages

use crate::error::{BusError, Result};
use crate::frame::{self, FrameHeader, MessageId, HEADER_SIZE};
use crate::shm::Segment;
use std::ptr;

/// Segment name used by collaborators that do not configure one
pub const DEFAULT_SEGMENT_NAME: &str = "aether_flashpoint_bus";

/// Default total segment size: 16 MiB, control block included
pub const DEFAULT_SEGMENT_SIZE: usize = 16 * 1024 * 1024;

/// Bus configuration
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Total size of the shared segment in bytes, control block included
    pub segment_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}

/// Writer side of the bus
///
/// The protocol supports exactly one writer per segment. Nothing
/// enforces that across processes; a second writer corrupts the ring.
pub struct BusWriter {
    shm: Segment,
}

impl BusWriter {
    /// Create the bus segment, or attach to it if it already exists
    ///
    /// On attach the existing write cursor is kept, so a restarted
    /// writer continues where the previous one stopped.
    pub fn create(name: &str, config: BusConfig) -> Result<Self> {
        let shm = Segment::create_or_attach(name, config.segment_size)?;
        Ok(Self { shm })
    }

    /// Create the default bus ([`DEFAULT_SEGMENT_NAME`], 16 MiB)
    pub fn create_default() -> Result<Self> {
        Self::create(DEFAULT_SEGMENT_NAME, BusConfig::default())
    }

    /// Frame `payload` under `topic` and append it to the ring
    ///
    /// Returns the id stamped into the message header. Appends never
    /// block: when the ring laps itself the oldest bytes are
    /// overwritten and lagging readers detect the loss on their next
    /// poll. Payloads that cannot fit even in an empty ring are
    /// rejected with [`BusError::OversizedMessage`].
    pub fn write(&mut self, topic: &str, payload: &[u8]) -> Result<MessageId> {
        let control = self.shm.control();
        let (mut head, limit) = control.read_control();
        let limit = limit as u64;
        let total = (HEADER_SIZE + payload.len()) as u64;

        if total > limit {
            return Err(BusError::OversizedMessage {
                payload_len: payload.len(),
                capacity: limit as u32,
            });
        }

        let mut offset = (head % limit) as usize;
        let remaining = limit as usize - offset;

        // A frame never straddles the end of the data region
        if (remaining as u64) < total {
            if remaining >= HEADER_SIZE {
                // Mark the tail with a padding frame so readers skip it
                let skip = FrameHeader::skip((remaining - HEADER_SIZE) as u32);
                unsafe { self.copy_in(offset, &skip.encode()) };
            }
            // Under HEADER_SIZE bytes there is no room for a padding
            // frame; readers infer the dead tail from the geometry
            head += remaining as u64;
            offset = 0;
        }

        let header = FrameHeader::message(frame::topic_hash(topic), payload.len() as u32);
        unsafe {
            self.copy_in(offset, &header.encode());
            self.copy_in(offset + HEADER_SIZE, payload);
        }

        control.advance_write_head(head + total);
        Ok(header.id)
    }

    /// Current write cursor: bytes ever appended, monotonic
    pub fn write_head(&self) -> u64 {
        self.shm.control().read_control().0
    }

    /// Size in bytes of the data region
    pub fn capacity(&self) -> u32 {
        self.shm.control().read_control().1
    }

    /// Name of the underlying segment
    pub fn segment_name(&self) -> &str {
        self.shm.name()
    }

    /// Unmap the segment and unlink its name
    ///
    /// Dropping the writer does the same; this just makes the point of
    /// release explicit. Attached readers keep their own mappings until
    /// they close too.
    pub fn close(self) {}

    /// Copy `bytes` into the data region at `offset`
    ///
    /// # Safety
    /// `offset + bytes.len()` must lie within the data region. The
    /// wraparound math in [`write`](Self::write) guarantees it.
    unsafe fn copy_in(&self, offset: usize, bytes: &[u8]) {
        ptr::copy_nonoverlapping(bytes.as_ptr(), self.shm.data_ptr().add(offset), bytes.len());
    }
}
