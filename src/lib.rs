//! AetherBus - single-writer multi-reader shared memory message bus
//!
//! One process publishes topic-tagged binary messages into a ring
//! buffer held in named POSIX shared memory; any number of reader
//! processes attach by name and consume without syscalls or locks on
//! the hot path.
//!
//! # Architecture
//!
//! - **Single Writer**: creates the segment, owns the write cursor,
//!   frames messages into the ring and overwrites the oldest bytes
//!   when it laps
//! - **Multiple Readers**: each follows a private cursor, skips lap
//!   padding, and treats being lapped as counted data loss rather
//!   than an error
//!
//! # Wire format
//!
//! A 64-byte control block (`write_head: u64`, `buffer_size: u32`,
//! little-endian) heads the segment. Every frame is a 32-byte header
//! (timestamp, id, topic hash, payload length) followed by the payload.
//!
//! # Memory model
//!
//! The write cursor is published with relaxed atomics and no fence
//! orders the frame bytes before it. On x86 the hardware store order
//! makes that benign; on weakly ordered CPUs a reader can observe the
//! cursor ahead of the bytes it covers and decode a torn frame. The
//! format carries no per-frame integrity check, so hosts that need
//! hard guarantees on such targets must layer their own.

pub mod bindings;
pub mod error;
pub mod frame;
pub mod reader;
pub mod shm;
pub mod writer;

pub use error::{BusError, Result};
pub use frame::{topic_hash, FrameHeader, MessageId, HEADER_SIZE, TOPIC_SKIP};
pub use reader::{BusReader, Message, ReadBatch};
pub use shm::{ControlBlock, Segment, CONTROL_BLOCK_SIZE, MIN_SEGMENT_SIZE};
pub use writer::{BusConfig, BusWriter, DEFAULT_SEGMENT_NAME, DEFAULT_SEGMENT_SIZE};
