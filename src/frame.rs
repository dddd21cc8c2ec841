//! Message framing: the 32-byte wire header, topic hashing, message identity
//!
//! Every frame in the data region starts with a fixed header followed by
//! `payload_len` payload bytes. All integer and float fields are
//! little-endian.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Size of the fixed message header in bytes
pub const HEADER_SIZE: usize = 32;

/// Reserved topic hash marking a padding frame at the end of a lap
///
/// A real topic whose hash collides with this value is indistinguishable
/// from padding and its messages will be dropped by readers.
pub const TOPIC_SKIP: u32 = 0xFFFF_FFFF;

// Byte offsets of the header fields on the wire
const POS_TIMESTAMP: usize = 0; // f64
const POS_ID: usize = 8; // 16 raw bytes
const POS_TOPIC_HASH: usize = 24; // u32
const POS_PAYLOAD_LEN: usize = 28; // u32

/// Hash a topic string to its 32-bit wire form (CRC-32)
#[inline]
pub fn topic_hash(topic: &str) -> u32 {
    crc32fast::hash(topic.as_bytes())
}

/// Seconds since the Unix epoch, as stamped into message headers
#[inline]
pub(crate) fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Unique identifier carried by every message (16 random bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; 16]);

impl MessageId {
    /// The all-zero id used by padding frames
    pub const NIL: MessageId = MessageId([0; 16]);

    /// Generate a fresh random id
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Build an id from raw wire bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw wire bytes of the id
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self)
    }
}

/// Decoded form of the fixed header in front of every frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    /// Seconds since the Unix epoch at write time
    pub timestamp: f64,
    /// Unique message id (all zeroes for padding frames)
    pub id: MessageId,
    /// CRC-32 of the topic string, or [`TOPIC_SKIP`] for padding
    pub topic_hash: u32,
    /// Payload bytes following the header
    pub payload_len: u32,
}

impl FrameHeader {
    /// Header for a regular message, stamped with the current time and a
    /// fresh random id
    pub fn message(topic_hash: u32, payload_len: u32) -> Self {
        Self {
            timestamp: unix_timestamp(),
            id: MessageId::random(),
            topic_hash,
            payload_len,
        }
    }

    /// Header for a padding frame covering `padding_len` unused bytes at
    /// the end of a lap
    pub fn skip(padding_len: u32) -> Self {
        Self {
            timestamp: unix_timestamp(),
            id: MessageId::NIL,
            topic_hash: TOPIC_SKIP,
            payload_len: padding_len,
        }
    }

    /// Whether this frame is lap padding rather than a message
    #[inline]
    pub fn is_skip(&self) -> bool {
        self.topic_hash == TOPIC_SKIP
    }

    /// Total on-wire span of the frame, header included
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }

    /// Encode to the 32-byte wire form
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[POS_TIMESTAMP..POS_ID].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[POS_ID..POS_TOPIC_HASH].copy_from_slice(self.id.as_bytes());
        buf[POS_TOPIC_HASH..POS_PAYLOAD_LEN].copy_from_slice(&self.topic_hash.to_le_bytes());
        buf[POS_PAYLOAD_LEN..HEADER_SIZE].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Decode from the 32-byte wire form
    ///
    /// Never fails: any byte pattern decodes to some header. Validation
    /// against the ring geometry happens at the read site.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&buf[POS_TIMESTAMP..POS_ID]);
        let mut id = [0u8; 16];
        id.copy_from_slice(&buf[POS_ID..POS_TOPIC_HASH]);
        let mut topic_hash = [0u8; 4];
        topic_hash.copy_from_slice(&buf[POS_TOPIC_HASH..POS_PAYLOAD_LEN]);
        let mut payload_len = [0u8; 4];
        payload_len.copy_from_slice(&buf[POS_PAYLOAD_LEN..HEADER_SIZE]);

        Self {
            timestamp: f64::from_le_bytes(timestamp),
            id: MessageId::from_bytes(id),
            topic_hash: u32::from_le_bytes(topic_hash),
            payload_len: u32::from_le_bytes(payload_len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = FrameHeader {
            timestamp: 1_700_000_000.25,
            id: MessageId::from_bytes([7; 16]),
            topic_hash: 0xDEAD_BEEF,
            payload_len: 4096,
        };

        let wire = header.encode();
        let decoded = FrameHeader::decode(&wire);

        assert_eq!(decoded, header);
        assert_eq!(decoded.frame_len(), HEADER_SIZE + 4096);
    }

    #[test]
    fn test_header_wire_layout() {
        let header = FrameHeader {
            timestamp: 2.5,
            id: MessageId::from_bytes(*b"0123456789abcdef"),
            topic_hash: 0x0102_0304,
            payload_len: 9,
        };
        let wire = header.encode();

        assert_eq!(&wire[0..8], &2.5f64.to_le_bytes());
        assert_eq!(&wire[8..24], b"0123456789abcdef");
        assert_eq!(&wire[24..28], &0x0102_0304u32.to_le_bytes());
        assert_eq!(&wire[28..32], &9u32.to_le_bytes());
    }

    #[test]
    fn test_topic_hash_is_crc32() {
        // CRC-32 check value
        assert_eq!(topic_hash("123456789"), 0xCBF4_3926);
        assert_eq!(topic_hash(""), 0);
        assert_ne!(topic_hash("orders.created"), topic_hash("orders.updated"));
        assert_eq!(topic_hash("orders.created"), topic_hash("orders.created"));
    }

    #[test]
    fn test_skip_header() {
        let skip = FrameHeader::skip(36);
        assert!(skip.is_skip());
        assert_eq!(skip.id, MessageId::NIL);
        assert_eq!(skip.payload_len, 36);
        assert_eq!(skip.frame_len(), HEADER_SIZE + 36);

        let decoded = FrameHeader::decode(&skip.encode());
        assert!(decoded.is_skip());
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = MessageId::random();
        let b = MessageId::random();
        assert_ne!(a, b);
        assert_ne!(a, MessageId::NIL);
    }

    #[test]
    fn test_message_id_hex_display() {
        let id = MessageId::from_bytes([
            0x00, 0x01, 0x0a, 0x0f, 0x10, 0xab, 0xcd, 0xef, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff,
            0xff, 0xff,
        ]);
        assert_eq!(id.to_string(), "00010a0f10abcdef00000000ffffffff");
        assert_eq!(id.to_string().len(), 32);
    }
}
