//! Packet consumer engine
//!
//! A [`ConsumerEngine`] owns a fixed-capacity ring of [`RawFrame`] slots and
//! one ingest thread. The ingest thread reads the attached streams in turn
//! and copies every frame into the ring; when the ring is full the oldest
//! unread frame is overwritten. Readers take frames in ingest order with
//! [`ConsumerEngine::poll`], or look at the ring without consuming it with
//! [`ConsumerEngine::scan`] and [`ConsumerEngine::snapshot`].
//!
//! Every stored timestamp is shifted by the configured [`Delay`]; `poll`
//! holds a frame back until the wall clock reaches its shifted timestamp.
//!
//! Lock order is binding slot, then ring. No stream I/O happens while the
//! ring is locked.

mod ring;
mod semaphore;

pub use ring::{MAX_CAPTURE_SIZE, RawFrame};

use crate::capture::{Delay, FrameFilter, ReadError, Stream, StreamAddr, StreamOpener, Timestamp};
use crate::telemetry::{Diagnostic, DiagnosticSink, EngineStats, TracingSink};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use ring::RingBuffer;
use semaphore::Semaphore;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Number of stream binding slots
pub const MAX_STREAMS: usize = 4;

const INGEST_THREAD_NAME: &str = "ringcap-ingest";

/// Lifecycle of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Created = 0,
    Running = 1,
    Stopped = 2,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineState::Created,
            1 => EngineState::Running,
            _ => EngineState::Stopped,
        }
    }
}

/// What `poll` does with its semaphore token when the next frame is still
/// held back by the delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeferPolicy {
    /// Give the token back; the frame stays pollable.
    #[default]
    Repost,
    /// Keep the token consumed. The frame can then only be reached once a
    /// later frame posts again, so `pending_count` under-reports.
    SpendToken,
}

/// What happens to a binding whose reads keep failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stay attached forever.
    #[default]
    Keep,
    /// Detach after this many consecutive failed reads. End of stream counts
    /// as a failure.
    DetachAfter(u32),
}

/// Construction parameters for [`ConsumerEngine`]
#[derive(Clone)]
pub struct EngineOptions {
    /// Number of ring slots, at least 1
    pub capacity: usize,
    /// Added to every frame timestamp
    pub delay: Delay,
    pub defer_policy: DeferPolicy,
    pub failure_policy: FailurePolicy,
    /// Pause after a round in which no stream had data. Zero yields instead.
    pub idle_sleep: Duration,
    /// Classify frames as they arrive and report the ones that fail.
    pub classify_on_ingest: bool,
    pub sink: Arc<dyn DiagnosticSink>,
}

impl EngineOptions {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            capacity: 1000,
            delay: Delay::ZERO,
            defer_policy: DeferPolicy::default(),
            failure_policy: FailurePolicy::default(),
            idle_sleep: Duration::from_micros(50),
            classify_on_ingest: false,
            sink: Arc::new(TracingSink),
        }
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("capacity", &self.capacity)
            .field("delay", &self.delay)
            .field("defer_policy", &self.defer_policy)
            .field("failure_policy", &self.failure_policy)
            .field("idle_sleep", &self.idle_sleep)
            .field("classify_on_ingest", &self.classify_on_ingest)
            .finish_non_exhaustive()
    }
}

struct Binding {
    stream: Box<dyn Stream>,
    interface: Option<String>,
    port: Option<u16>,
    filter: Option<Box<dyn FrameFilter>>,
    exhausted: bool,
    failures: u32,
}

/// Public view of an attached stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    pub interface: Option<String>,
    pub port: Option<u16>,
    /// The stream reported end of stream and has not produced since.
    pub exhausted: bool,
    /// Consecutive failed reads
    pub failures: u32,
}

struct Shared {
    ring: Mutex<RingBuffer>,
    available: Semaphore,
    state: AtomicU8,
    bindings: [Mutex<Option<Binding>>; MAX_STREAMS],
    sequence: AtomicU32,
    options: EngineOptions,
    stats: EngineStats,
}

/// Bounded packet ring fed by a background ingest thread
///
/// `ConsumerEngine` is `Send + Sync`; share it between reader threads with
/// an `Arc`. Dropping it stops the ingest thread and closes every stream.
pub struct ConsumerEngine {
    shared: Arc<Shared>,
    ingest: Mutex<Option<JoinHandle<()>>>,
}

impl ConsumerEngine {
    /// Engine with `capacity` slots and the given delivery delay.
    pub fn new(capacity: usize, delay: Delay) -> Result<Self> {
        Self::with_options(EngineOptions {
            delay,
            ..EngineOptions::new(capacity)
        })
    }

    /// Allocate the ring and start the ingest thread.
    pub fn with_options(options: EngineOptions) -> Result<Self> {
        if options.capacity == 0 {
            return Err(Error::Config("ring capacity must be at least 1".into()));
        }

        let shared = Arc::new(Shared {
            ring: Mutex::new(RingBuffer::new(options.capacity)),
            available: Semaphore::new(),
            state: AtomicU8::new(EngineState::Created as u8),
            bindings: Default::default(),
            sequence: AtomicU32::new(1),
            options,
            stats: EngineStats::new(),
        });

        shared.set_state(EngineState::Running);
        let worker = shared.clone();
        let handle = thread::Builder::new()
            .name(INGEST_THREAD_NAME.into())
            .spawn(move || worker.run())
            .inspect_err(|_| shared.set_state(EngineState::Stopped))?;

        info!(
            "Consumer engine started: capacity={}, delay={}.{:012}s",
            shared.options.capacity,
            shared.options.delay.sec(),
            shared.options.delay.psec()
        );

        Ok(Self {
            shared,
            ingest: Mutex::new(Some(handle)),
        })
    }

    /// Open a stream through `opener` and attach it.
    pub fn attach_stream(
        &self,
        opener: &dyn StreamOpener,
        addr: &StreamAddr,
        interface: Option<&str>,
        port: Option<u16>,
        filter: Option<Box<dyn FrameFilter>>,
    ) -> Result<usize> {
        if self.state() == EngineState::Stopped {
            return Err(Error::Stopped);
        }
        let stream = opener.open(addr, interface, port)?;
        let index = self.attach(stream, interface, port, filter)?;
        info!("Attached {} as stream {}", addr, index);
        Ok(index)
    }

    /// Attach an already opened stream to the first free slot.
    ///
    /// Fails with [`Error::Capacity`] when all slots are taken; the stream is
    /// closed in that case.
    pub fn attach(
        &self,
        mut stream: Box<dyn Stream>,
        interface: Option<&str>,
        port: Option<u16>,
        filter: Option<Box<dyn FrameFilter>>,
    ) -> Result<usize> {
        for (index, slot) in self.shared.bindings.iter().enumerate() {
            let mut slot = slot.lock();
            // Checked under the slot lock so `shutdown` cannot miss the insert.
            if self.state() == EngineState::Stopped {
                drop(slot);
                stream.close();
                return Err(Error::Stopped);
            }
            if slot.is_none() {
                *slot = Some(Binding {
                    stream,
                    interface: interface.map(str::to_owned),
                    port,
                    filter,
                    exhausted: false,
                    failures: 0,
                });
                debug!("Stream bound to slot {}", index);
                return Ok(index);
            }
        }

        stream.close();
        Err(Error::Capacity { max: MAX_STREAMS })
    }

    /// Close the stream in slot `index` and free the slot.
    pub fn detach(&self, index: usize) -> Result<()> {
        let slot = self
            .shared
            .bindings
            .get(index)
            .ok_or(Error::NoSuchBinding(index))?;
        let mut binding = slot.lock().take().ok_or(Error::NoSuchBinding(index))?;
        binding.stream.close();
        info!("Detached stream {}", index);
        Ok(())
    }

    pub fn binding(&self, index: usize) -> Option<BindingInfo> {
        let slot = self.shared.bindings.get(index)?.lock();
        slot.as_ref().map(|b| BindingInfo {
            interface: b.interface.clone(),
            port: b.port,
            exhausted: b.exhausted,
            failures: b.failures,
        })
    }

    /// Attached streams that have not reached end of stream
    pub fn active_streams(&self) -> usize {
        self.shared
            .bindings
            .iter()
            .filter(|slot| slot.lock().as_ref().is_some_and(|b| !b.exhausted))
            .count()
    }

    /// Take the next frame in ingest order.
    ///
    /// Waits up to `timeout` for a frame to arrive; a zero timeout does not
    /// block. Returns `None` on timeout, after shutdown, or when the next
    /// frame's delayed timestamp is still in the future.
    pub fn poll(&self, timeout: Duration) -> Option<RawFrame> {
        let shared = &self.shared;
        let acquired = if timeout.is_zero() {
            shared.available.try_wait()
        } else {
            shared.available.wait_timeout(timeout)
        };
        if !acquired {
            return None;
        }

        let now = Timestamp::now();
        let mut ring = shared.ring.lock();
        let due = ring.front().map(|f| f.header.timestamp <= now);
        match due {
            Some(true) => {
                let frame = ring.pop();
                drop(ring);
                shared.stats.delivered.inc();
                frame
            }
            Some(false) => {
                drop(ring);
                shared.stats.deferred.inc();
                if shared.options.defer_policy == DeferPolicy::Repost {
                    shared.available.post();
                }
                None
            }
            // Only reachable if a spent token left the count behind the ring.
            None => None,
        }
    }

    pub fn poll_ms(&self, timeout_ms: u64) -> Option<RawFrame> {
        self.poll(Duration::from_millis(timeout_ms))
    }

    /// Copy of ring slot `index`, read or unread.
    ///
    /// `None` past the capacity or for a slot that was never written.
    /// Does not consume the frame.
    pub fn scan(&self, index: usize) -> Option<RawFrame> {
        self.shared.ring.lock().get(index).cloned()
    }

    /// Iterate the ring from slot 0 up to the first never-written slot.
    pub fn snapshot(&self) -> Scan<'_> {
        Scan {
            engine: self,
            index: 0,
        }
    }

    /// Frames `poll` can still take. Zero once the engine is stopped.
    pub fn pending_count(&self) -> usize {
        if self.shared.available.is_closed() {
            return 0;
        }
        self.shared.available.value()
    }

    /// How much longer the delay holds back the oldest unread frame.
    /// `None` when nothing is unread.
    pub fn time_until_due(&self) -> Option<Duration> {
        let due = self.shared.ring.lock().front().map(|f| f.header.timestamp)?;
        Some(due.saturating_duration_since(Timestamp::now()))
    }

    pub fn capacity(&self) -> usize {
        self.shared.options.capacity
    }

    pub fn delay(&self) -> Delay {
        self.shared.options.delay
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.shared.stats
    }

    /// Stop ingest, release blocked readers and close all streams.
    /// Safe to call more than once.
    ///
    /// Undelivered frames are dropped: `poll` returns `None` from here on.
    /// `scan` still reads the ring.
    pub fn shutdown(&self) {
        let previous = self.shared.state.swap(EngineState::Stopped as u8, Ordering::AcqRel);
        self.shared.available.close();

        if let Some(handle) = self.ingest.lock().take() {
            if handle.join().is_err() {
                warn!("Ingest thread panicked");
            }
        }

        for slot in &self.shared.bindings {
            if let Some(mut binding) = slot.lock().take() {
                binding.stream.close();
            }
        }

        if EngineState::from_u8(previous) != EngineState::Stopped {
            info!(
                "Consumer engine stopped: {} frames ingested, {} evicted, {} delivered",
                self.shared.stats.ingested.get(),
                self.shared.stats.evicted.get(),
                self.shared.stats.delivered.get()
            );
        }
    }
}

impl Drop for ConsumerEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Iterator returned by [`ConsumerEngine::snapshot`]
pub struct Scan<'a> {
    engine: &'a ConsumerEngine,
    index: usize,
}

impl Iterator for Scan<'_> {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        let frame = self.engine.scan(self.index);
        self.index = match frame {
            Some(_) => self.index + 1,
            None => usize::MAX,
        };
        frame
    }
}

impl Shared {
    fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn run(&self) {
        debug!("Ingest loop running");
        while self.state() == EngineState::Running {
            let mut produced = false;
            for index in 0..MAX_STREAMS {
                if self.state() != EngineState::Running {
                    break;
                }
                produced |= self.ingest_one(index);
            }

            if !produced {
                if self.options.idle_sleep.is_zero() {
                    thread::yield_now();
                } else {
                    thread::sleep(self.options.idle_sleep);
                }
            }
        }
        debug!("Ingest loop finished");
    }

    /// One read from binding `index`. Returns whether the stream produced
    /// a frame.
    fn ingest_one(&self, index: usize) -> bool {
        let stream_id = index as u8;
        let mut events = Vec::new();
        let mut slot = self.bindings[index].lock();
        let Some(binding) = slot.as_mut() else {
            return false;
        };

        let mut detach = false;
        let produced = match binding.stream.read(binding.filter.as_deref()) {
            Ok(frame) => {
                binding.failures = 0;
                binding.exhausted = false;

                if frame.header.captured_len == 0 {
                    self.stats.empty_frames.inc();
                    events.push(Diagnostic::EmptyFrame { stream_id });
                } else {
                    let unclassified = if self.options.classify_on_ingest {
                        crate::protocol::classify(&frame.header, frame.data).err()
                    } else {
                        None
                    };

                    let mut ring = self.ring.lock();
                    let sequence_id = self.sequence.fetch_add(1, Ordering::Relaxed);
                    let stored =
                        ring.push(stream_id, sequence_id, &frame.header, frame.data, self.options.delay);
                    drop(ring);

                    self.stats.ingested.inc();
                    self.stats
                        .stream(index)
                        .record_frame(stored.len, stored.truncated);
                    match stored.evicted {
                        Some(dropped_sequence) => {
                            self.stats.evicted.inc();
                            events.push(Diagnostic::Eviction {
                                stream_id,
                                dropped_sequence,
                            });
                        }
                        None => self.available.post(),
                    }
                    if let Some(reason) = unclassified {
                        events.push(Diagnostic::Unclassified {
                            stream_id,
                            sequence_id,
                            reason,
                        });
                    }
                }
                true
            }
            Err(ReadError::WouldBlock) => false,
            Err(ReadError::EndOfStream) => {
                if !binding.exhausted {
                    binding.exhausted = true;
                    self.stats.stream(index).record_error();
                    events.push(Diagnostic::EndOfStream { stream_id });
                }
                detach = self.count_failure(binding);
                false
            }
            Err(ReadError::Failed(e)) => {
                self.stats.stream(index).record_error();
                events.push(Diagnostic::StreamFailure {
                    stream_id,
                    error: e.to_string(),
                });
                detach = self.count_failure(binding);
                false
            }
        };

        if detach {
            if let Some(mut binding) = slot.take() {
                binding.stream.close();
                events.push(Diagnostic::StreamDetached {
                    stream_id,
                    failures: binding.failures,
                });
            }
        }
        drop(slot);

        for event in &events {
            self.options.sink.report(event);
        }
        produced
    }

    fn count_failure(&self, binding: &mut Binding) -> bool {
        binding.failures = binding.failures.saturating_add(1);
        match self.options.failure_policy {
            FailurePolicy::Keep => false,
            FailurePolicy::DetachAfter(limit) => binding.failures >= limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureHeader, ReplayStream};
    use std::time::Instant;

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    fn frames(n: u8) -> Vec<(CaptureHeader, Vec<u8>)> {
        (1..=n)
            .map(|i| (CaptureHeader::new(Timestamp::now(), 64), vec![i; 64]))
            .collect()
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(matches!(
            ConsumerEngine::new(0, Delay::ZERO),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_running_after_construction() {
        let engine = ConsumerEngine::new(8, Delay::ZERO).unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.capacity(), 8);
        assert_eq!(engine.pending_count(), 0);
        assert!(engine.poll(Duration::ZERO).is_none());
    }

    #[test]
    fn test_poll_delivers_in_order() {
        let engine = ConsumerEngine::new(16, Delay::ZERO).unwrap();
        engine
            .attach(Box::new(ReplayStream::from_frames(frames(3))), None, None, None)
            .unwrap();

        let mut seen = Vec::new();
        while seen.len() < 3 {
            if let Some(frame) = engine.poll_ms(1000) {
                seen.push((frame.sequence_id, frame.payload()[0]));
            } else {
                panic!("timed out after {seen:?}");
            }
        }
        assert_eq!(seen, vec![(1, 1), (2, 2), (3, 3)]);
        assert_eq!(engine.stats().delivered.get(), 3);
    }

    #[test]
    fn test_snapshot_stops_at_unwritten_slot() {
        let engine = ConsumerEngine::new(8, Delay::ZERO).unwrap();
        engine
            .attach(Box::new(ReplayStream::from_frames(frames(3))), None, None, None)
            .unwrap();
        assert!(wait_until(|| engine.pending_count() == 3));

        let ids: Vec<u32> = engine.snapshot().map(|f| f.sequence_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(engine.pending_count(), 3);
        assert!(engine.scan(8).is_none());
    }

    #[test]
    fn test_detach_unknown_slot() {
        let engine = ConsumerEngine::new(4, Delay::ZERO).unwrap();
        assert!(matches!(engine.detach(0), Err(Error::NoSuchBinding(0))));
        assert!(matches!(engine.detach(9), Err(Error::NoSuchBinding(9))));
    }

    #[test]
    fn test_binding_info() {
        let engine = ConsumerEngine::new(4, Delay::ZERO).unwrap();
        let (stream, _feed) = ReplayStream::new();
        let index = engine
            .attach(Box::new(stream), Some("eth0"), Some(4000), None)
            .unwrap();

        let info = engine.binding(index).unwrap();
        assert_eq!(info.interface.as_deref(), Some("eth0"));
        assert_eq!(info.port, Some(4000));
        assert!(!info.exhausted);
        assert!(engine.binding(index + 1).is_none());
    }

    #[test]
    fn test_attach_after_shutdown() {
        let engine = ConsumerEngine::new(4, Delay::ZERO).unwrap();
        engine.shutdown();
        engine.shutdown();
        assert_eq!(engine.state(), EngineState::Stopped);

        let (stream, _feed) = ReplayStream::new();
        assert!(matches!(
            engine.attach(Box::new(stream), None, None, None),
            Err(Error::Stopped)
        ));
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConsumerEngine>();
    }
}
