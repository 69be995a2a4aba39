//! Channel-backed viewer sink for the axum routes.
//!
//! `ChannelSink` is the relay-facing half; `PendingResponse` is the
//! HTTP-facing half that the stream handler turns into a response. The
//! body stream carries a drop guard so an aborted response reads as a
//! viewer disconnect on the sink side.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

use crate::error::SinkError;
use crate::relay::{ClosedSignal, StreamPreamble, ViewerSink};

/// Frames queued per viewer before sends start failing as backpressured.
const SINK_QUEUE: usize = 8;

/// The relay side of one viewer connection.
pub struct ChannelSink {
    /// Dropped on `close()` so the body stream ends after draining.
    chunks: Mutex<Option<mpsc::Sender<Bytes>>>,
    preamble: Mutex<Option<oneshot::Sender<StreamPreamble>>>,
    gone: Arc<AtomicBool>,
    closed: Arc<Notify>,
}

/// The HTTP side: the preamble the relay sent on attach, and the body.
pub struct PendingResponse {
    pub preamble: oneshot::Receiver<StreamPreamble>,
    pub body: MjpegBody,
}

impl ChannelSink {
    pub fn new() -> (Self, PendingResponse) {
        let (chunk_tx, chunk_rx) = mpsc::channel(SINK_QUEUE);
        let (preamble_tx, preamble_rx) = oneshot::channel();
        let gone = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(Notify::new());
        let sink = Self {
            chunks: Mutex::new(Some(chunk_tx)),
            preamble: Mutex::new(Some(preamble_tx)),
            gone: Arc::clone(&gone),
            closed: Arc::clone(&closed),
        };
        let body = MjpegBody {
            chunks: ReceiverStream::new(chunk_rx),
            gone,
            closed,
        };
        (
            sink,
            PendingResponse {
                preamble: preamble_rx,
                body,
            },
        )
    }

    fn mark_gone(&self) {
        self.gone.store(true, Ordering::Release);
        self.closed.notify_waiters();
    }
}

impl ViewerSink for ChannelSink {
    fn begin(&self, preamble: StreamPreamble) -> Result<(), SinkError> {
        let sender = match self.preamble.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.send(preamble).map_err(|_| SinkError::Closed),
            None => Err(SinkError::Closed),
        }
    }

    fn send(&self, chunk: Bytes) -> Result<(), SinkError> {
        if self.gone.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let chunks = match self.chunks.lock() {
            Ok(guard) => guard,
            Err(_) => return Err(SinkError::Closed),
        };
        match chunks.as_ref() {
            Some(tx) => match tx.try_send(chunk) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => Err(SinkError::Backpressured),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Closed),
            },
            None => Err(SinkError::Closed),
        }
    }

    fn is_closed(&self) -> bool {
        if self.gone.load(Ordering::Acquire) {
            return true;
        }
        match self.chunks.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(tx) => tx.is_closed(),
                None => true,
            },
            Err(_) => true,
        }
    }

    fn close(&self) {
        if let Ok(mut chunks) = self.chunks.lock() {
            // Queued chunks are still drained before the body ends.
            chunks.take();
        }
        self.mark_gone();
    }

    fn closed_signal(&self) -> ClosedSignal {
        let gone = Arc::clone(&self.gone);
        let closed = Arc::clone(&self.closed);
        Box::pin(async move {
            loop {
                let notified = closed.notified();
                if gone.load(Ordering::Acquire) {
                    return;
                }
                notified.await;
            }
        })
    }
}

/// Response body yielding the framed parts the relay wrote.
pub struct MjpegBody {
    chunks: ReceiverStream<Bytes>,
    gone: Arc<AtomicBool>,
    closed: Arc<Notify>,
}

impl Drop for MjpegBody {
    // The response was dropped by the server, i.e. the viewer went away.
    fn drop(&mut self) {
        self.gone.store(true, Ordering::Release);
        self.closed.notify_waiters();
    }
}

impl Stream for MjpegBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().chunks)
            .poll_next(cx)
            .map(|chunk| chunk.map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_begin_delivers_preamble() {
        let (sink, pending) = ChannelSink::new();
        sink.begin(StreamPreamble::new("multipart/x-mixed-replace; boundary=x".into()))
            .unwrap();
        let preamble = pending.preamble.await.unwrap();
        assert_eq!(preamble.content_type, "multipart/x-mixed-replace; boundary=x");

        // Only one preamble per connection.
        assert_eq!(
            sink.begin(StreamPreamble::new("again".into())),
            Err(SinkError::Closed)
        );
    }

    #[tokio::test]
    async fn test_sent_chunks_reach_the_body() {
        let (sink, mut pending) = ChannelSink::new();
        sink.send(Bytes::from_static(b"one")).unwrap();
        sink.send(Bytes::from_static(b"two")).unwrap();

        assert_eq!(pending.body.next().await.unwrap().unwrap(), "one");
        assert_eq!(pending.body.next().await.unwrap().unwrap(), "two");
    }

    #[tokio::test]
    async fn test_full_queue_backpressures_without_blocking() {
        let (sink, _pending) = ChannelSink::new();
        for _ in 0..SINK_QUEUE {
            sink.send(Bytes::from_static(b"frame")).unwrap();
        }
        assert_eq!(
            sink.send(Bytes::from_static(b"frame")),
            Err(SinkError::Backpressured)
        );
    }

    #[tokio::test]
    async fn test_close_drains_then_ends_the_body() {
        let (sink, mut pending) = ChannelSink::new();
        sink.send(Bytes::from_static(b"last")).unwrap();
        sink.close();

        assert!(sink.is_closed());
        assert_eq!(sink.send(Bytes::from_static(b"x")), Err(SinkError::Closed));
        assert_eq!(pending.body.next().await.unwrap().unwrap(), "last");
        assert!(pending.body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_body_reads_as_viewer_disconnect() {
        let (sink, pending) = ChannelSink::new();
        let signal = sink.closed_signal();
        assert!(!sink.is_closed());

        drop(pending);
        signal.await;
        assert!(sink.is_closed());
    }
}
