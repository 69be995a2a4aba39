//! Upstream camera transport.
//!
//! The relay core talks to cameras through the [`CameraTransport`] trait so
//! tests can script the upstream side; [`HttpCameraTransport`] is the
//! production implementation.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::camera::StreamTarget;
use crate::error::TransportError;

mod http;

pub use http::HttpCameraTransport;

/// One open upstream connection.
///
/// `chunks` yields body bytes as they arrive. The channel closing cleanly is
/// end-of-stream; an `Err` item is a mid-stream failure. Both end the
/// connection.
#[derive(Debug)]
pub struct UpstreamStream {
    /// Content type declared by the camera, when present.
    pub content_type: Option<String>,
    /// Body chunks; bounded so a stalled consumer backpressures the socket
    /// instead of buffering without limit.
    pub chunks: mpsc::Receiver<std::result::Result<Bytes, TransportError>>,
}

/// How the relay reaches upstream cameras.
#[async_trait]
pub trait CameraTransport: Send + Sync + 'static {
    /// Open the long-lived stream endpoint. Resolves once response headers
    /// arrive, bounded by `target.timeout`; body chunks flow afterward with
    /// no deadline.
    async fn open_stream(&self, target: StreamTarget) -> Result<UpstreamStream, TransportError>;

    /// Fetch one complete still image.
    async fn fetch_still(&self, target: StreamTarget) -> Result<Bytes, TransportError>;

    /// Bounded reachability check used at registration time.
    async fn probe(&self, target: StreamTarget) -> Result<(), TransportError>;
}
