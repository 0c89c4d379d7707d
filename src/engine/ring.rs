//! Fixed-capacity frame ring
//!
//! One arena of equally sized slots with two cursors. The writer always
//! stores at `write_pos`; when that slot still holds an unread frame the
//! oldest frame is dropped by advancing `read_pos`. `pop` drains in order,
//! `get` reads any slot without touching the cursors.

use crate::capture::{CaptureHeader, Delay};
use crate::protocol::{Classified, ClassifyError, classify};
use std::fmt;

/// Bytes stored per frame; longer captures are truncated.
pub const MAX_CAPTURE_SIZE: usize = 1600;

/// Copy of one ingested frame
#[derive(Clone)]
pub struct RawFrame {
    /// Binding slot the frame was read from
    pub stream_id: u8,
    /// Engine-wide ingest order, starting at 1
    pub sequence_id: u32,
    /// Capture header; the timestamp includes the engine delay
    pub header: CaptureHeader,
    buf: [u8; MAX_CAPTURE_SIZE],
}

impl RawFrame {
    fn empty() -> Self {
        Self {
            stream_id: 0,
            sequence_id: 0,
            header: CaptureHeader::default(),
            buf: [0u8; MAX_CAPTURE_SIZE],
        }
    }

    /// The captured bytes, starting at the Ethernet header.
    pub fn payload(&self) -> &[u8] {
        let len = (self.header.captured_len as usize).min(MAX_CAPTURE_SIZE);
        &self.buf[..len]
    }

    pub fn classify(&self) -> Result<Classified, ClassifyError> {
        classify(&self.header, self.payload())
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("stream_id", &self.stream_id)
            .field("sequence_id", &self.sequence_id)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub(crate) struct Slot {
    frame: RawFrame,
    occupied: bool,
}

/// Result of storing one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stored {
    /// Sequence id of the unread frame that was overwritten
    pub evicted: Option<u32>,
    /// Bytes actually kept
    pub len: usize,
    pub truncated: bool,
}

pub(crate) struct RingBuffer {
    slots: Vec<Slot>,
    write_pos: usize,
    read_pos: usize,
}

impl RingBuffer {
    /// `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        let empty = Slot {
            frame: RawFrame::empty(),
            occupied: false,
        };
        Self {
            slots: vec![empty; capacity],
            write_pos: 0,
            read_pos: 0,
        }
    }

    pub fn push(
        &mut self,
        stream_id: u8,
        sequence_id: u32,
        header: &CaptureHeader,
        data: &[u8],
        delay: Delay,
    ) -> Stored {
        let capacity = self.slots.len();
        let slot = &mut self.slots[self.write_pos];

        let evicted = if slot.occupied {
            self.read_pos = (self.read_pos + 1) % capacity;
            Some(slot.frame.sequence_id)
        } else {
            None
        };

        let len = (header.captured_len as usize)
            .min(data.len())
            .min(MAX_CAPTURE_SIZE);
        let frame = &mut slot.frame;
        frame.buf[..len].copy_from_slice(&data[..len]);
        frame.header = *header;
        frame.header.captured_len = len as u32;
        frame.header.link_len = header.link_len.max(len as u32);
        frame.header.timestamp = header.timestamp.add_delay(delay);
        frame.stream_id = stream_id;
        frame.sequence_id = sequence_id;
        slot.occupied = true;

        self.write_pos = (self.write_pos + 1) % capacity;

        Stored {
            evicted,
            len,
            truncated: len < header.captured_len as usize,
        }
    }

    /// Oldest unread frame
    pub fn front(&self) -> Option<&RawFrame> {
        let slot = &self.slots[self.read_pos];
        slot.occupied.then_some(&slot.frame)
    }

    /// Remove and return a copy of the oldest unread frame.
    pub fn pop(&mut self) -> Option<RawFrame> {
        let slot = &mut self.slots[self.read_pos];
        if !slot.occupied {
            return None;
        }
        slot.occupied = false;
        let frame = slot.frame.clone();
        self.read_pos = (self.read_pos + 1) % self.slots.len();
        Some(frame)
    }

    /// Any written slot, read or not. Never-written slots return `None`.
    pub fn get(&self, index: usize) -> Option<&RawFrame> {
        let frame = &self.slots.get(index)?.frame;
        (frame.header.captured_len != 0).then_some(frame)
    }

    #[cfg(test)]
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    #[cfg(test)]
    pub fn unread(&self) -> usize {
        self.slots.iter().filter(|s| s.occupied).count()
    }
}
