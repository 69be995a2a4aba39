//! reqwest-backed camera transport.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::camera::StreamTarget;
use crate::error::TransportError;

use super::{CameraTransport, UpstreamStream};

/// Body chunks queued between the socket reader and the relay.
const CHUNK_QUEUE: usize = 16;

const ACCEPT_STREAM: &str = "multipart/x-mixed-replace, image/jpeg";

/// Production transport speaking HTTP to cameras.
#[derive(Debug, Clone)]
pub struct HttpCameraTransport {
    client: reqwest::Client,
}

impl HttpCameraTransport {
    /// Build a transport with this crate's user agent.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("camrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self { client })
    }

    fn get(&self, target: &StreamTarget) -> reqwest::RequestBuilder {
        let mut request = self.client.get(&target.url);
        if let Some(creds) = &target.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        request
    }
}

#[async_trait]
impl CameraTransport for HttpCameraTransport {
    async fn open_stream(&self, target: StreamTarget) -> Result<UpstreamStream, TransportError> {
        let request = self.get(&target).header(reqwest::header::ACCEPT, ACCEPT_STREAM);
        // The deadline covers connect and response headers only. The body is
        // long-lived and must not be time-bound.
        let response = tokio::time::timeout(target.timeout, request.send())
            .await
            .map_err(|_| TransportError::Timeout(target.timeout))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (tx, rx) = mpsc::channel(CHUNK_QUEUE);
        tokio::spawn(pump_body(response, tx));

        Ok(UpstreamStream {
            content_type,
            chunks: rx,
        })
    }

    async fn fetch_still(&self, target: StreamTarget) -> Result<Bytes, TransportError> {
        let response = self
            .get(&target)
            .header(reqwest::header::ACCEPT, "image/jpeg")
            .timeout(target.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(target.timeout)
                } else {
                    TransportError::Connect(e.to_string())
                }
            })?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        response
            .bytes()
            .await
            .map_err(|e| TransportError::Read(e.to_string()))
    }

    async fn probe(&self, target: StreamTarget) -> Result<(), TransportError> {
        let response = tokio::time::timeout(target.timeout, self.get(&target).send())
            .await
            .map_err(|_| TransportError::Timeout(target.timeout))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        // Drop the response without reading the body; a stream endpoint
        // would otherwise never finish.
        Ok(())
    }
}

/// Feed body chunks to the relay until the stream ends, fails, or the relay
/// drops its receiver.
async fn pump_body(
    mut response: reqwest::Response,
    tx: mpsc::Sender<Result<Bytes, TransportError>>,
) {
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            chunk = response.chunk() => match chunk {
                Ok(Some(bytes)) => {
                    if tx.send(Ok(bytes)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(TransportError::Read(e.to_string()))).await;
                    break;
                }
            },
        }
    }
}
