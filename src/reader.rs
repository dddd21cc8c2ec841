//! Bus reader: an independent cursor over the shared ring

use crate::error::Result;
use crate::frame::{self, FrameHeader, MessageId, HEADER_SIZE};
use crate::shm::Segment;
use crate::writer::DEFAULT_SEGMENT_NAME;
use std::ptr;

/// A message consumed from the bus
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Seconds since the Unix epoch at write time
    pub timestamp: f64,
    /// Id stamped by the writer
    pub id: MessageId,
    /// CRC-32 of the topic string
    pub topic_hash: u32,
    /// Payload bytes, copied out of the ring
    pub payload: Vec<u8>,
}

impl Message {
    /// Whether this message was published under `topic`
    pub fn is_topic(&self, topic: &str) -> bool {
        self.topic_hash == frame::topic_hash(topic)
    }
}

/// Reader side of the bus
///
/// Each reader tracks its own private cursor; readers never coordinate
/// with the writer or with each other. A reader that polls too slowly
/// gets lapped, drops whatever it missed and resynchronizes.
pub struct BusReader {
    shm: Segment,
    local_head: u64,
    buffer_limit: u64,
    overruns: u64,
}

impl BusReader {
    /// Attach to the bus segment and start listening from "now"
    ///
    /// History already in the ring is not replayed: the cursor starts
    /// at the current write head. Returns
    /// [`BusError::SegmentNotFound`](crate::BusError::SegmentNotFound)
    /// while the writer has not created the segment yet, so callers can
    /// poll until the bus comes up.
    pub fn connect(name: &str) -> Result<Self> {
        let shm = Segment::open(name)?;
        let (write_head, buffer_size) = shm.control().read_control();
        tracing::info!(name, head = write_head, "reader connected to bus");
        Ok(Self {
            shm,
            local_head: write_head,
            buffer_limit: buffer_size as u64,
            overruns: 0,
        })
    }

    /// Connect to the default bus ([`DEFAULT_SEGMENT_NAME`])
    pub fn connect_default() -> Result<Self> {
        Self::connect(DEFAULT_SEGMENT_NAME)
    }

    /// Decode everything published since the previous call
    ///
    /// The write head is snapshotted once, so the batch stays finite
    /// even while the writer keeps appending. If the writer lapped this
    /// reader the cursor jumps to the head and the batch is empty; the
    /// loss is counted in [`overruns`](Self::overruns) and logged, not
    /// raised.
    pub fn read(&mut self) -> ReadBatch<'_> {
        let (write_head, _) = self.shm.control().read_control();

        // saturating: torn frames can leave the cursor past a snapshot
        let backlog = write_head.saturating_sub(self.local_head);
        if backlog > self.buffer_limit {
            tracing::warn!(lost_bytes = backlog, "bus overrun, jumping to the write head");
            self.overruns += 1;
            self.local_head = write_head;
        }

        ReadBatch {
            reader: self,
            write_head,
        }
    }

    /// Number of times this reader was lapped by the writer
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Current private cursor position, counted like the write head
    pub fn local_head(&self) -> u64 {
        self.local_head
    }

    /// Name of the underlying segment
    pub fn segment_name(&self) -> &str {
        self.shm.name()
    }

    /// Detach from the segment
    ///
    /// Readers never unlink the name; deletion belongs to the writer.
    pub fn close(self) {}

    fn header_at(&self, offset: usize) -> FrameHeader {
        let mut buf = [0u8; HEADER_SIZE];
        // SAFETY: the caller checked offset + HEADER_SIZE <= buffer_limit
        unsafe {
            ptr::copy_nonoverlapping(self.shm.data_ptr().add(offset), buf.as_mut_ptr(), HEADER_SIZE);
        }
        FrameHeader::decode(&buf)
    }

    fn payload_at(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut payload = vec![0u8; len];
        // SAFETY: the caller clamped offset + len to the data region
        unsafe {
            ptr::copy_nonoverlapping(self.shm.data_ptr().add(offset), payload.as_mut_ptr(), len);
        }
        payload
    }
}

/// Iterator over the messages available when [`BusReader::read`] was
/// called
///
/// Dropping the batch mid-iteration leaves the cursor after the last
/// yielded frame; the next `read` call resumes there.
pub struct ReadBatch<'r> {
    reader: &'r mut BusReader,
    write_head: u64,
}

impl Iterator for ReadBatch<'_> {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        while self.reader.local_head < self.write_head {
            let limit = self.reader.buffer_limit;
            let offset = (self.reader.local_head % limit) as usize;
            let remaining = limit as usize - offset;

            // Implicit end-of-lap padding: not even a header fits here
            if remaining < HEADER_SIZE {
                self.reader.local_head += remaining as u64;
                continue;
            }

            let header = self.reader.header_at(offset);

            if header.is_skip() {
                self.reader.local_head += header.frame_len() as u64;
                continue;
            }

            // Well-formed frames never cross the lap boundary; clamping
            // keeps a torn length field from reading out of bounds
            let len = (header.payload_len as usize).min(remaining - HEADER_SIZE);
            let payload = self.reader.payload_at(offset + HEADER_SIZE, len);
            self.reader.local_head += header.frame_len() as u64;

            return Some(Message {
                timestamp: header.timestamp,
                id: header.id,
                topic_hash: header.topic_hash,
                payload,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TOPIC_SKIP;
    use crate::shm::unique_name;
    use crate::writer::{BusConfig, BusWriter};

    fn bus(prefix: &str, segment_size: usize) -> (BusWriter, BusReader, String) {
        let name = unique_name(prefix);
        let writer = BusWriter::create(&name, BusConfig { segment_size }).unwrap();
        let reader = BusReader::connect(&name).unwrap();
        (writer, reader, name)
    }

    #[test]
    fn test_round_trip() {
        let (mut writer, mut reader, _name) = bus("reader_round_trip", 4160);

        let id = writer.write("sensors.temp", b"21.5C").unwrap();

        let messages: Vec<Message> = reader.read().collect();
        assert_eq!(messages.len(), 1);

        let msg = &messages[0];
        assert_eq!(msg.id, id);
        assert_eq!(msg.topic_hash, frame::topic_hash("sensors.temp"));
        assert!(msg.is_topic("sensors.temp"));
        assert!(!msg.is_topic("sensors.pressure"));
        assert_eq!(msg.payload, b"21.5C");
        assert!(msg.timestamp > 1_600_000_000.0);

        // Nothing is delivered twice
        assert_eq!(reader.read().count(), 0);
    }

    #[test]
    fn test_messages_arrive_in_write_order() {
        let (mut writer, mut reader, _name) = bus("reader_order", 4160);

        for i in 0u8..5 {
            writer.write("seq", &[i; 3]).unwrap();
        }

        let messages: Vec<Message> = reader.read().collect();
        assert_eq!(messages.len(), 5);
        for (i, msg) in messages.iter().enumerate() {
            assert_eq!(msg.payload, vec![i as u8; 3]);
        }

        // Ids are unique per message
        for pair in messages.windows(2) {
            assert_ne!(pair[0].id, pair[1].id);
        }
    }

    #[test]
    fn test_connect_skips_history() {
        let name = unique_name("reader_late");
        let mut writer = BusWriter::create(&name, BusConfig { segment_size: 4160 }).unwrap();

        writer.write("old", b"before").unwrap();
        writer.write("old", b"before").unwrap();

        let mut reader = BusReader::connect(&name).unwrap();
        assert_eq!(reader.read().count(), 0);

        writer.write("new", b"after").unwrap();
        let messages: Vec<Message> = reader.read().collect();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_topic("new"));
    }

    #[test]
    fn test_connect_missing_segment() {
        let name = unique_name("reader_missing");
        assert!(matches!(
            BusReader::connect(&name),
            Err(crate::BusError::SegmentNotFound { .. })
        ));
    }

    #[test]
    fn test_wraparound_delivery() {
        // 200-byte data region
        let (mut writer, mut reader, _name) = bus("reader_wrap", 264);

        writer.write("wrap", &[0xAA; 100]).unwrap();
        let first: Vec<Message> = reader.read().collect();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].payload, vec![0xAA; 100]);
        assert_eq!(reader.local_head(), 132);

        // The next frame needs 132 bytes but only 68 remain: the writer
        // pads the tail and wraps, and the reader follows through both
        writer.write("wrap", &[0xBB; 100]).unwrap();
        let second: Vec<Message> = reader.read().collect();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].payload, vec![0xBB; 100]);
        assert_ne!(second[0].topic_hash, TOPIC_SKIP);
        assert_eq!(reader.local_head(), 332);
        assert_eq!(reader.overruns(), 0);
    }

    #[test]
    fn test_dead_tail_is_skipped() {
        // 100-byte data region
        let (mut writer, mut reader, _name) = bus("reader_dead_tail", 164);

        writer.write("t", &[1u8; 52]).unwrap();
        assert_eq!(reader.read().count(), 1);

        // 16 leftover bytes carry no padding frame; the reader infers
        // them from the geometry
        writer.write("t", &[2u8; 8]).unwrap();
        let messages: Vec<Message> = reader.read().collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, vec![2u8; 8]);
        assert_eq!(reader.local_head(), 140);
    }

    #[test]
    fn test_overrun_resync() {
        // 136-byte data region: one 104-byte payload fills it exactly
        let (mut writer, mut reader, _name) = bus("reader_overrun", 200);

        writer.write("flood", &[1u8; 104]).unwrap();
        writer.write("flood", &[2u8; 104]).unwrap();
        assert_eq!(writer.write_head(), 272);

        // Lapped: the whole backlog is gone, the call yields nothing
        let messages: Vec<Message> = reader.read().collect();
        assert!(messages.is_empty());
        assert_eq!(reader.overruns(), 1);
        assert_eq!(reader.local_head(), 272);

        // Delivery resumes with the next message
        writer.write("flood", &[3u8; 10]).unwrap();
        let messages: Vec<Message> = reader.read().collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, vec![3u8; 10]);
        assert_eq!(reader.overruns(), 1);
    }

    #[test]
    fn test_readers_are_independent() {
        let name = unique_name("reader_multi");
        let mut writer = BusWriter::create(&name, BusConfig { segment_size: 4160 }).unwrap();

        let mut fast = BusReader::connect(&name).unwrap();
        let mut slow = BusReader::connect(&name).unwrap();

        writer.write("t", b"one").unwrap();
        assert_eq!(fast.read().count(), 1);

        writer.write("t", b"two").unwrap();
        assert_eq!(fast.read().count(), 1);

        // The slow reader catches up on its own schedule and sees both
        let behind: Vec<Message> = slow.read().collect();
        assert_eq!(behind.len(), 2);
        assert_eq!(behind[0].payload, b"one");
        assert_eq!(behind[1].payload, b"two");
    }

    #[test]
    fn test_batch_is_bounded_by_snapshot() {
        let (mut writer, mut reader, _name) = bus("reader_snapshot", 4160);

        writer.write("t", b"a").unwrap();
        writer.write("t", b"b").unwrap();

        let mut batch = reader.read();
        assert_eq!(batch.next().unwrap().payload, b"a");

        // Appended after the snapshot: not part of this batch
        writer.write("t", b"c").unwrap();
        assert_eq!(batch.next().unwrap().payload, b"b");
        assert!(batch.next().is_none());

        let rest: Vec<Message> = reader.read().collect();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].payload, b"c");
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let (mut writer, mut reader, _name) = bus("reader_empty", 4160);

        writer.write("ping", b"").unwrap();
        let messages: Vec<Message> = reader.read().collect();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].payload.is_empty());
        assert!(messages[0].is_topic("ping"));
    }

    #[test]
    fn test_reader_close_leaves_segment_alive() {
        let name = unique_name("reader_close");
        let writer = BusWriter::create(&name, BusConfig { segment_size: 4160 }).unwrap();

        let reader = BusReader::connect(&name).unwrap();
        reader.close();

        // Closing a reader must not unlink the name
        let again = BusReader::connect(&name).unwrap();
        drop(again);

        // Closing the writer does
        writer.close();
        assert!(matches!(
            BusReader::connect(&name),
            Err(crate::BusError::SegmentNotFound { .. })
        ));
    }

    #[test]
    fn test_concurrent_writer_thread() {
        let name = unique_name("reader_threaded");
        let mut writer = BusWriter::create(&name, BusConfig { segment_size: 65_600 }).unwrap();
        let mut reader = BusReader::connect(&name).unwrap();

        let handle = std::thread::spawn(move || {
            for i in 0u64..100 {
                writer.write("load", &i.to_le_bytes()).unwrap();
            }
            writer
        });

        let mut seen = Vec::new();
        let mut spins = 0u64;
        while seen.len() < 100 && spins < 100_000_000 {
            seen.extend(reader.read());
            spins += 1;
            std::hint::spin_loop();
        }
        let writer = handle.join().unwrap();

        assert_eq!(seen.len(), 100);
        for (i, msg) in seen.iter().enumerate() {
            assert_eq!(msg.payload, (i as u64).to_le_bytes());
        }
        assert_eq!(reader.overruns(), 0);
        drop(writer);
    }
}
