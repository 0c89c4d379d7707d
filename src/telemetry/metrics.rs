//! Engine counters.
//!
//! Lock-free counters updated by the ingest thread and the readers.

use crate::engine::MAX_STREAMS;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-binding statistics.
#[derive(Debug, Default)]
pub struct StreamStats {
    /// Frames copied into the ring.
    pub frames: Counter,
    /// Captured bytes copied into the ring.
    pub bytes: Counter,
    /// Failed reads, plus one for reaching end of stream.
    pub errors: Counter,
    /// Frames cut down to the slot size.
    pub truncated: Counter,
}

impl StreamStats {
    pub fn record_frame(&self, bytes: usize, truncated: bool) {
        self.frames.inc();
        self.bytes.add(bytes as u64);
        if truncated {
            self.truncated.inc();
        }
    }

    pub fn record_error(&self) {
        self.errors.inc();
    }
}

/// Counters for one engine instance.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Frames written into the ring.
    pub ingested: Counter,
    /// Unread frames dropped to make room.
    pub evicted: Counter,
    /// Frames handed out by `poll`.
    pub delivered: Counter,
    /// `poll` calls that found the next frame still held back by the delay.
    pub deferred: Counter,
    /// Zero-length captures skipped at ingest.
    pub empty_frames: Counter,
    streams: [StreamStats; MAX_STREAMS],
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics for binding slot `index`.
    ///
    /// # Panics
    /// If `index >= MAX_STREAMS`.
    pub fn stream(&self, index: usize) -> &StreamStats {
        &self.streams[index]
    }

    /// Exports all counters as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("ingested".into(), self.ingested.get()),
            ("evicted".into(), self.evicted.get()),
            ("delivered".into(), self.delivered.get()),
            ("deferred".into(), self.deferred.get()),
            ("empty_frames".into(), self.empty_frames.get()),
        ];

        for (i, stats) in self.streams.iter().enumerate() {
            result.extend([
                (format!("stream{i}_frames"), stats.frames.get()),
                (format!("stream{i}_bytes"), stats.bytes.get()),
                (format!("stream{i}_errors"), stats.errors.get()),
                (format!("stream{i}_truncated"), stats.truncated.get()),
            ]);
        }

        result
    }
}
