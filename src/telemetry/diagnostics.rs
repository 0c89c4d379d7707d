//! Structured diagnostics from the ingest loop.

use crate::protocol::ClassifyError;
use tracing::{debug, info, warn};

/// Event raised while ingesting frames
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The ring was full; the oldest unread frame was overwritten.
    Eviction { stream_id: u8, dropped_sequence: u32 },
    /// A read failed. The binding stays attached unless the failure policy
    /// detaches it.
    StreamFailure { stream_id: u8, error: String },
    /// The stream has no more frames.
    EndOfStream { stream_id: u8 },
    /// The binding was removed after repeated failures.
    StreamDetached { stream_id: u8, failures: u32 },
    /// A zero-length capture was skipped.
    EmptyFrame { stream_id: u8 },
    /// The frame was stored but its header stack is not understood.
    Unclassified {
        stream_id: u8,
        sequence_id: u32,
        reason: ClassifyError,
    },
}

/// Receiver for ingest diagnostics. Called from the ingest thread, outside
/// the ring lock.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Logs diagnostics through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::Eviction {
                stream_id,
                dropped_sequence,
            } => warn!(stream_id, dropped_sequence, "ring full, evicted unread frame"),
            Diagnostic::StreamFailure { stream_id, error } => {
                warn!(stream_id, error = %error, "stream read failed")
            }
            Diagnostic::EndOfStream { stream_id } => info!(stream_id, "end of stream"),
            Diagnostic::StreamDetached {
                stream_id,
                failures,
            } => warn!(stream_id, failures, "stream detached"),
            Diagnostic::EmptyFrame { stream_id } => {
                debug!(stream_id, "skipped zero-length frame")
            }
            Diagnostic::Unclassified {
                stream_id,
                sequence_id,
                reason,
            } => debug!(stream_id, sequence_id, reason = %reason, "unclassified frame"),
        }
    }
}

impl<F> DiagnosticSink for F
where
    F: Fn(&Diagnostic) + Send + Sync,
{
    fn report(&self, diagnostic: &Diagnostic) {
        self(diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_closure_sink_collects() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collector = {
            let seen = seen.clone();
            move |d: &Diagnostic| seen.lock().push(d.clone())
        };
        let sink: &dyn DiagnosticSink = &collector;

        sink.report(&Diagnostic::EndOfStream { stream_id: 1 });
        sink.report(&Diagnostic::Eviction {
            stream_id: 0,
            dropped_sequence: 7,
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Diagnostic::EndOfStream { stream_id: 1 });
    }

    #[test]
    fn test_tracing_sink_accepts_every_kind() {
        let sink = TracingSink;
        sink.report(&Diagnostic::StreamFailure {
            stream_id: 2,
            error: "link down".into(),
        });
        sink.report(&Diagnostic::StreamDetached {
            stream_id: 2,
            failures: 3,
        });
        sink.report(&Diagnostic::EmptyFrame { stream_id: 0 });
        sink.report(&Diagnostic::Unclassified {
            stream_id: 0,
            sequence_id: 1,
            reason: ClassifyError::UnknownEthertype(0x1234),
        });
    }
}
