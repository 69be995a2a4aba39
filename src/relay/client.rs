//! Downstream viewer plumbing: the sink contract and per-client records.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::SinkError;

/// Future resolving once a sink's peer has gone away.
pub type ClosedSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Metadata delivered once when a viewer attaches, before any frame bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPreamble {
    /// `multipart/x-mixed-replace; boundary=<relay token>`.
    pub content_type: String,
    /// Caching directives for live frames.
    pub cache_control: &'static str,
}

impl StreamPreamble {
    pub(crate) fn new(content_type: String) -> Self {
        Self {
            content_type,
            cache_control: "no-cache, no-store, must-revalidate",
        }
    }
}

/// Contract between a relay and one downstream viewer.
///
/// Writes must never block: the relay calls them while walking every
/// attached client, so a stalled peer has to fail fast with a [`SinkError`]
/// instead of holding the broadcast up.
pub trait ViewerSink: Send + Sync + 'static {
    /// Deliver the one-time stream preamble.
    fn begin(&self, preamble: StreamPreamble) -> Result<(), SinkError>;

    /// Queue one chunk of body bytes without blocking.
    fn send(&self, chunk: Bytes) -> Result<(), SinkError>;

    /// Whether the peer is known to be gone.
    fn is_closed(&self) -> bool;

    /// Release the underlying transport. Safe to call repeatedly.
    fn close(&self);

    /// Owned future resolving on peer disconnect, so the relay can watch for
    /// client-initiated closes without retaining the sink.
    fn closed_signal(&self) -> ClosedSignal;
}

/// One attached viewer.
pub(crate) struct StreamClient {
    pub(crate) sink: Box<dyn ViewerSink>,
    pub(crate) connected_at: Instant,
    /// Milliseconds after `connected_at` of the last successful write.
    active_ms: AtomicU64,
    dropped_frames: AtomicU64,
}

impl StreamClient {
    pub(crate) fn new(sink: Box<dyn ViewerSink>) -> Self {
        Self {
            sink,
            connected_at: Instant::now(),
            active_ms: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
        }
    }

    pub(crate) fn touch(&self) {
        let elapsed = self.connected_at.elapsed().as_millis() as u64;
        self.active_ms.store(elapsed, Ordering::Relaxed);
    }

    pub(crate) fn last_activity(&self) -> Instant {
        self.connected_at + Duration::from_millis(self.active_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn drop_frame(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}
