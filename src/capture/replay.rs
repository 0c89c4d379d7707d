//! In-memory stream fed from another thread

use super::{CaptureHeader, CapturedFrame, FrameFilter, ReadError, Stream, Timestamp};
use crate::Error;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

enum Item {
    Frame(CaptureHeader, Vec<u8>),
    Failure(String),
}

#[derive(Default)]
struct Queue {
    items: VecDeque<Item>,
    closed: bool,
}

/// Stream that replays frames pushed through a [`ReplayFeed`].
///
/// An empty, open queue reads as `WouldBlock`; once the feed is closed and
/// drained the stream reports `EndOfStream`.
pub struct ReplayStream {
    queue: Arc<Mutex<Queue>>,
    current: Vec<u8>,
}

/// Producer side of a [`ReplayStream`]
#[derive(Clone)]
pub struct ReplayFeed {
    queue: Arc<Mutex<Queue>>,
}

impl ReplayStream {
    /// Open stream plus the feed that fills it.
    pub fn new() -> (Self, ReplayFeed) {
        let queue = Arc::new(Mutex::new(Queue::default()));
        let stream = Self {
            queue: queue.clone(),
            current: Vec::new(),
        };
        (stream, ReplayFeed { queue })
    }

    /// Stream over a fixed set of frames; ends after the last one.
    pub fn from_frames<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = (CaptureHeader, Vec<u8>)>,
    {
        let (stream, feed) = Self::new();
        for (header, data) in frames {
            feed.push(header, data);
        }
        feed.close();
        stream
    }
}

impl Stream for ReplayStream {
    fn read(&mut self, filter: Option<&dyn FrameFilter>) -> Result<CapturedFrame<'_>, ReadError> {
        let mut queue = self.queue.lock();
        loop {
            match queue.items.pop_front() {
                Some(Item::Frame(header, data)) => {
                    if filter.is_some_and(|f| !f.matches(&header, &data)) {
                        continue;
                    }
                    drop(queue);
                    self.current = data;
                    return Ok(CapturedFrame {
                        header,
                        data: &self.current,
                    });
                }
                Some(Item::Failure(msg)) => {
                    return Err(ReadError::Failed(Error::Io(io::Error::other(msg))));
                }
                None if queue.closed => return Err(ReadError::EndOfStream),
                None => return Err(ReadError::WouldBlock),
            }
        }
    }

    fn close(&mut self) {
        let mut queue = self.queue.lock();
        queue.items.clear();
        queue.closed = true;
    }
}

impl ReplayFeed {
    pub fn push(&self, header: CaptureHeader, data: Vec<u8>) {
        self.queue.lock().items.push_back(Item::Frame(header, data));
    }

    /// Push a fully captured frame stamped with the current wall clock.
    pub fn push_frame(&self, data: Vec<u8>) {
        let header = CaptureHeader::new(Timestamp::now(), data.len());
        self.push(header, data);
    }

    /// Make the next read fail with `msg`.
    pub fn push_failure(&self, msg: impl Into<String>) {
        self.queue.lock().items.push_back(Item::Failure(msg.into()));
    }

    /// No more frames will follow.
    pub fn close(&self) {
        self.queue.lock().closed = true;
    }

    /// Frames and failures not yet read
    pub fn len(&self) -> usize {
        self.queue.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
