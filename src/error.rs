//! Error types for AetherBus

use std::io;
use thiserror::Error;

/// Result type for AetherBus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur in AetherBus operations
#[derive(Debug, Error)]
pub enum BusError {
    /// Failed to create the shared segment
    #[error("Failed to create bus segment '{name}': {source}")]
    SegmentCreate {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Tried to attach to a segment that does not exist yet
    #[error("Bus segment '{name}' does not exist")]
    SegmentNotFound { name: String },

    /// Failed to open an existing shared segment
    #[error("Failed to open bus segment '{name}': {source}")]
    SegmentOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to map memory
    #[error("Failed to map memory: {0}")]
    Mmap(#[source] io::Error),

    /// Failed to size the shared segment
    #[error("Failed to set bus segment size: {0}")]
    Truncate(#[source] io::Error),

    /// Segment cannot hold the control block plus one message header
    #[error("Bus segment too small: need at least {min} bytes, got {size}")]
    SegmentTooSmall { size: usize, min: usize },

    /// Data region would not fit in the 32-bit `buffer_size` field
    #[error("Bus segment too large: data region is capped at {max} bytes, got {size}")]
    SegmentTooLarge { size: usize, max: usize },

    /// Message does not fit in the data region even with the buffer empty
    #[error("Message too large: header plus {payload_len} payload bytes exceed the {capacity} byte data region")]
    OversizedMessage { payload_len: usize, capacity: u32 },

    /// Segment name too long
    #[error("Segment name too long: max {max} chars, got {got}")]
    NameTooLong { max: usize, got: usize },
}
