//! Shared mocks for relay and facade tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Notify};

use crate::camera::{CameraDescriptor, StreamTarget};
use crate::error::{SinkError, TransportError};
use crate::relay::{ClosedSignal, StreamPreamble, ViewerSink};
use crate::transport::{CameraTransport, UpstreamStream};

/// A multipart descriptor with a short timeout and a small retry budget.
pub fn test_descriptor(id: &str) -> CameraDescriptor {
    CameraDescriptor::new(id, "Test Camera", format!("http://{id}.local/video"))
        .timeout(Duration::from_millis(200))
        .retry_attempts(3)
}

type ChunkSender = mpsc::Sender<Result<Bytes, TransportError>>;

/// Scriptable upstream side.
///
/// Every `open_stream` hands out a chunk feeder (collected in order) so
/// tests can push bytes, fail the stream, or drop it for a clean EOF.
pub struct MockTransport {
    probe_calls: AtomicUsize,
    open_calls: AtomicUsize,
    still_calls: AtomicUsize,
    fail_probes: AtomicBool,
    fail_stills: AtomicBool,
    /// Remaining `open_stream` calls to reject.
    failing_opens: AtomicUsize,
    content_type: Mutex<Option<String>>,
    feeders: Mutex<Vec<Option<ChunkSender>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            probe_calls: AtomicUsize::new(0),
            open_calls: AtomicUsize::new(0),
            still_calls: AtomicUsize::new(0),
            fail_probes: AtomicBool::new(false),
            fail_stills: AtomicBool::new(false),
            failing_opens: AtomicUsize::new(0),
            content_type: Mutex::new(None),
            feeders: Mutex::new(Vec::new()),
        })
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn still_calls(&self) -> usize {
        self.still_calls.load(Ordering::SeqCst)
    }

    pub fn fail_probes(&self, fail: bool) {
        self.fail_probes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stills(&self, fail: bool) {
        self.fail_stills.store(fail, Ordering::SeqCst);
    }

    /// Reject the next `count` stream opens with a connect error.
    pub fn fail_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Declare a content type on subsequent stream opens.
    pub fn set_content_type(&self, content_type: Option<&str>) {
        if let Ok(mut slot) = self.content_type.lock() {
            *slot = content_type.map(str::to_string);
        }
    }

    /// Take ownership of the feeder for the n-th opened stream. Dropping
    /// it ends that stream cleanly.
    pub fn take_feeder(&self, index: usize) -> ChunkSender {
        self.feeders
            .lock()
            .expect("feeders lock")
            .get_mut(index)
            .expect("stream was opened")
            .take()
            .expect("feeder already taken")
    }
}

#[async_trait]
impl CameraTransport for MockTransport {
    async fn open_stream(&self, _target: StreamTarget) -> Result<UpstreamStream, TransportError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            if failing != usize::MAX {
                self.failing_opens.store(failing - 1, Ordering::SeqCst);
            }
            return Err(TransportError::Connect("mock connect refused".to_string()));
        }
        let (tx, rx) = mpsc::channel(64);
        self.feeders.lock().expect("feeders lock").push(Some(tx));
        Ok(UpstreamStream {
            content_type: self.content_type.lock().expect("content type lock").clone(),
            chunks: rx,
        })
    }

    async fn fetch_still(&self, _target: StreamTarget) -> Result<Bytes, TransportError> {
        self.still_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stills.load(Ordering::SeqCst) {
            return Err(TransportError::Status(503));
        }
        Ok(Bytes::from_static(b"\xff\xd8 mock jpeg"))
    }

    async fn probe(&self, _target: StreamTarget) -> Result<(), TransportError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_probes.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("mock probe refused".to_string()));
        }
        Ok(())
    }
}

/// Recording viewer sink. The handle outlives the boxed sink so tests
/// can inspect writes and simulate a viewer disconnect.
pub struct MockSink {
    state: Arc<MockSinkState>,
}

pub struct MockSinkState {
    preambles: Mutex<Vec<StreamPreamble>>,
    writes: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
    notify: Notify,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockSinkState {
                preambles: Mutex::new(Vec::new()),
                writes: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn handle(&self) -> Arc<MockSinkState> {
        Arc::clone(&self.state)
    }
}

impl MockSinkState {
    /// Simulate the viewer going away.
    pub fn remote_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn preambles(&self) -> Vec<StreamPreamble> {
        self.preambles.lock().expect("preambles lock").clone()
    }

    /// Every written chunk concatenated, in write order.
    pub fn data(&self) -> Vec<u8> {
        self.writes
            .lock()
            .expect("writes lock")
            .iter()
            .flat_map(|chunk| chunk.iter().copied())
            .collect()
    }
}

impl ViewerSink for MockSink {
    fn begin(&self, preamble: StreamPreamble) -> Result<(), SinkError> {
        if self.state.is_closed() {
            return Err(SinkError::Closed);
        }
        self.state
            .preambles
            .lock()
            .expect("preambles lock")
            .push(preamble);
        Ok(())
    }

    fn send(&self, chunk: Bytes) -> Result<(), SinkError> {
        if self.state.is_closed() {
            return Err(SinkError::Closed);
        }
        self.state.writes.lock().expect("writes lock").push(chunk);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    fn close(&self) {
        self.state.remote_close();
    }

    fn closed_signal(&self) -> ClosedSignal {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            loop {
                let notified = state.notify.notified();
                if state.is_closed() {
                    return;
                }
                notified.await;
            }
        })
    }
}
