//! The relay core: one upstream connection fanned out to many viewers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::{broadcast, watch, RwLock};

use crate::camera::CameraDescriptor;
use crate::error::{RelayError, SinkError};
use crate::transport::{CameraTransport, UpstreamStream};

use super::assembler::FrameAssembler;
use super::client::{StreamClient, StreamPreamble, ViewerSink};
use super::events::RelayEvent;

/// Base reconnect delay in milliseconds.
const BASE_RECONNECT_MS: u64 = 1_000;

/// Reconnect delay ceiling in milliseconds.
const MAX_RECONNECT_MS: u64 = 30_000;

/// Connection state of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// No upstream connection and no attempt in progress.
    Disconnected,
    /// Connecting or waiting out a reconnect delay.
    Connecting,
    /// Upstream connected; frames are flowing.
    Connected,
    /// Reconnect budget exhausted; no further automatic attempts.
    Error,
}

/// Delay before the next attempt after `attempts` consecutive failures.
fn reconnect_delay(attempts: u32) -> Duration {
    let factor = 1u64 << attempts.min(16);
    Duration::from_millis(BASE_RECONNECT_MS.saturating_mul(factor).min(MAX_RECONNECT_MS))
}

/// Why the pump loop stopped consuming an upstream connection.
enum PumpEnd {
    /// The relay was closed.
    Shutdown,
    /// The stream errored or ended; the supervisor schedules a reconnect.
    Lost(String),
}

/// One camera's relay.
///
/// Owns at most one upstream connection at a time and republishes every
/// parsed frame to all attached viewers under a relay-minted multipart
/// boundary. A single supervisor task per relay runs the
/// connect / read / backoff loop, so exactly one reconnect can ever be
/// pending. Self-heals on stream loss until the descriptor's retry budget
/// is spent, then parks in [`RelayState::Error`] until restarted.
pub struct StreamRelay<T: CameraTransport> {
    descriptor: CameraDescriptor,
    transport: Arc<T>,

    /// Boundary token for outgoing streams, minted once per relay and
    /// independent of whatever boundary the upstream camera uses.
    boundary: String,

    state: RwLock<RelayState>,

    /// Consecutive failed connection attempts. Reset only on a successful
    /// connect, so a restarted relay keeps its spent budget.
    attempts: AtomicU32,

    clients: RwLock<HashMap<String, Arc<StreamClient>>>,

    events: broadcast::Sender<RelayEvent>,

    /// Flipped to true exactly once, by `close()`.
    shutdown: watch::Sender<bool>,
}

impl<T: CameraTransport> StreamRelay<T> {
    /// Create a relay for `descriptor`. The relay stays idle until
    /// [`start`](Self::start) is called.
    pub fn new(
        descriptor: CameraDescriptor,
        transport: Arc<T>,
        event_capacity: usize,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_capacity);
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            boundary: format!("camrelay-{}", uuid::Uuid::new_v4().simple()),
            descriptor,
            transport,
            state: RwLock::new(RelayState::Disconnected),
            attempts: AtomicU32::new(0),
            clients: RwLock::new(HashMap::new()),
            events,
            shutdown,
        })
    }

    /// Camera this relay serves.
    pub fn camera_id(&self) -> &str {
        &self.descriptor.id
    }

    /// The relay's outgoing multipart boundary token.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> RelayState {
        *self.state.read().await
    }

    /// Whether `close()` has run.
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Open the upstream connection. Idempotent: a relay that is already
    /// connected or connecting is left alone.
    ///
    /// Reports the outcome of the first connection attempt it initiates.
    /// On failure the supervisor keeps retrying in the background with
    /// exponential backoff, so an `Err` here does not mean the relay is
    /// dead unless the retry budget is already spent.
    pub async fn start(self: &Arc<Self>) -> Result<(), RelayError> {
        if self.is_closed() {
            return Err(RelayError::Closed(self.descriptor.id.clone()));
        }
        {
            let mut state = self.state.write().await;
            match *state {
                RelayState::Connected | RelayState::Connecting => return Ok(()),
                RelayState::Disconnected | RelayState::Error => {
                    *state = RelayState::Connecting;
                }
            }
        }

        tracing::debug!(camera = %self.descriptor.id, url = %self.descriptor.stream_url, "Opening upstream connection");
        match self.transport.open_stream(self.descriptor.stream_target()).await {
            Ok(upstream) => {
                self.on_connected().await;
                self.spawn_supervisor(Some(upstream));
                Ok(())
            }
            Err(e) => {
                let attempts = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                if attempts > self.descriptor.retry_attempts {
                    self.fail_terminal(e.to_string()).await;
                    return Err(RelayError::MaxRetries {
                        camera_id: self.descriptor.id.clone(),
                        attempts,
                    });
                }
                tracing::warn!(
                    camera = %self.descriptor.id,
                    attempts,
                    error = %e,
                    "Upstream connect failed, reconnect scheduled"
                );
                let _ = self.events.send(RelayEvent::Reconnecting {
                    attempts,
                    delay: reconnect_delay(attempts),
                    reason: e.to_string(),
                });
                self.spawn_supervisor(None);
                Err(RelayError::Connect {
                    camera_id: self.descriptor.id.clone(),
                    error: e,
                })
            }
        }
    }

    /// Attach a viewer. Sends the stream preamble immediately and removes
    /// the client automatically when its sink reports the peer gone.
    ///
    /// Never starts the upstream connection; callers pair this with an
    /// idempotent [`start`](Self::start).
    pub async fn add_client(
        self: &Arc<Self>,
        client_id: impl Into<String>,
        sink: Box<dyn ViewerSink>,
    ) -> Result<(), RelayError> {
        let client_id = client_id.into();
        if self.is_closed() {
            sink.close();
            return Err(RelayError::Closed(self.descriptor.id.clone()));
        }

        let preamble = StreamPreamble::new(format!(
            "multipart/x-mixed-replace; boundary={}",
            self.boundary
        ));
        sink.begin(preamble)
            .map_err(|_| RelayError::ClientClosed(client_id.clone()))?;

        let closed = sink.closed_signal();
        let client = Arc::new(StreamClient::new(sink));
        {
            let mut clients = self.clients.write().await;
            // Re-check under the lock: close() flips the flag before it
            // drains this map, so an attach racing a close either lands
            // in the map in time to be drained or is rejected here. It
            // must never slip into an already-drained map.
            if self.is_closed() {
                client.sink.close();
                return Err(RelayError::Closed(self.descriptor.id.clone()));
            }
            if let Some(previous) = clients.insert(client_id.clone(), client) {
                // Same id reattached; drop the stale sink.
                previous.sink.close();
            }
        }
        tracing::info!(camera = %self.descriptor.id, client = %client_id, "Viewer attached");
        let _ = self
            .events
            .send(RelayEvent::ClientConnected(client_id.clone()));

        // Detach on viewer-initiated close without polling the sink.
        let relay = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = closed => {
                    relay.remove_client(&client_id).await;
                }
                _ = shutdown.changed() => {}
            }
        });
        Ok(())
    }

    /// Detach a viewer and close its sink. Returns whether it was attached.
    ///
    /// Never touches the upstream connection; remaining viewers keep
    /// receiving frames.
    pub async fn remove_client(&self, client_id: &str) -> bool {
        let removed = self.clients.write().await.remove(client_id);
        match removed {
            Some(client) => {
                client.sink.close();
                tracing::info!(
                    camera = %self.descriptor.id,
                    client = %client_id,
                    duration_ms = client.connected_at.elapsed().as_millis() as u64,
                    idle_ms = client.last_activity().elapsed().as_millis() as u64,
                    dropped_frames = client.dropped_frames(),
                    "Viewer detached"
                );
                let _ = self
                    .events
                    .send(RelayEvent::ClientDisconnected(client_id.to_string()));
                true
            }
            None => false,
        }
    }

    /// Tear the relay down: cancel any pending reconnect, detach every
    /// viewer, and drop the upstream connection. Idempotent. Callers drop
    /// their reference afterward; a closed relay refuses new work.
    pub async fn close(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        // The supervisor exits at its next suspension point, dropping the
        // upstream receiver and with it the connection.
        let clients: Vec<(String, Arc<StreamClient>)> =
            self.clients.write().await.drain().collect();
        for (client_id, client) in clients {
            client.sink.close();
            let _ = self.events.send(RelayEvent::ClientDisconnected(client_id));
        }
        *self.state.write().await = RelayState::Disconnected;
        tracing::info!(camera = %self.descriptor.id, "Relay closed");
        let _ = self.events.send(RelayEvent::Closed);
    }

    fn spawn_supervisor(self: &Arc<Self>, connected: Option<UpstreamStream>) {
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            relay.supervise(connected).await;
        });
    }

    /// The per-relay supervisor loop. Owns the receive buffer and the
    /// reconnect timing, so at most one connection and one pending
    /// reconnect exist per relay by construction.
    async fn supervise(self: Arc<Self>, mut connected: Option<UpstreamStream>) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let upstream = match connected.take() {
                Some(upstream) => upstream,
                None => {
                    let delay = reconnect_delay(self.attempts.load(Ordering::Relaxed));
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return,
                    }
                    *self.state.write().await = RelayState::Connecting;
                    match self.transport.open_stream(self.descriptor.stream_target()).await {
                        Ok(upstream) => {
                            self.on_connected().await;
                            upstream
                        }
                        Err(e) => {
                            let attempts = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                            if attempts > self.descriptor.retry_attempts {
                                self.fail_terminal(e.to_string()).await;
                                return;
                            }
                            tracing::warn!(
                                camera = %self.descriptor.id,
                                attempts,
                                error = %e,
                                "Reconnect attempt failed"
                            );
                            let _ = self.events.send(RelayEvent::Reconnecting {
                                attempts,
                                delay: reconnect_delay(attempts),
                                reason: e.to_string(),
                            });
                            continue;
                        }
                    }
                }
            };

            match self.pump(upstream, &mut shutdown).await {
                PumpEnd::Shutdown => return,
                PumpEnd::Lost(reason) => {
                    *self.state.write().await = RelayState::Connecting;
                    let attempts = self.attempts.load(Ordering::Relaxed);
                    tracing::warn!(camera = %self.descriptor.id, reason = %reason, "Upstream stream lost");
                    let _ = self.events.send(RelayEvent::Reconnecting {
                        attempts,
                        delay: reconnect_delay(attempts),
                        reason,
                    });
                }
            }
        }
    }

    /// Consume one upstream connection until it ends or the relay closes.
    ///
    /// The assembler is rebuilt per connection: leftover partial-frame
    /// bytes must not leak across reconnects, and each connection may
    /// declare a different boundary token.
    async fn pump(&self, mut upstream: UpstreamStream, shutdown: &mut watch::Receiver<bool>) -> PumpEnd {
        let mut assembler =
            FrameAssembler::new(self.descriptor.kind, upstream.content_type.as_deref());
        let mut frames = Vec::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => return PumpEnd::Shutdown,
                chunk = upstream.chunks.recv() => {
                    let chunk = match chunk {
                        Some(Ok(bytes)) => bytes,
                        Some(Err(e)) => return PumpEnd::Lost(e.to_string()),
                        None => return PumpEnd::Lost("upstream closed the stream".to_string()),
                    };
                    assembler.push(&chunk, &mut frames);
                    for frame in frames.drain(..) {
                        self.broadcast(frame).await;
                    }
                }
            }
        }
    }

    /// Write one frame, re-framed under the relay's boundary, to every
    /// attached viewer. Closed sinks are evicted; a backpressured sink
    /// drops this frame for that viewer only.
    async fn broadcast(&self, frame: Bytes) {
        let header = format!(
            "\r\n--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            self.boundary,
            frame.len()
        );
        let mut part = BytesMut::with_capacity(header.len() + frame.len());
        part.extend_from_slice(header.as_bytes());
        part.extend_from_slice(&frame);
        let part = part.freeze();

        let mut stale = Vec::new();
        {
            let clients = self.clients.read().await;
            for (client_id, client) in clients.iter() {
                if client.sink.is_closed() {
                    stale.push(client_id.clone());
                    continue;
                }
                match client.sink.send(part.clone()) {
                    Ok(()) => client.touch(),
                    Err(SinkError::Backpressured) => {
                        client.drop_frame();
                        tracing::debug!(camera = %self.descriptor.id, client = %client_id, "Frame dropped for slow viewer");
                    }
                    Err(SinkError::Closed) => stale.push(client_id.clone()),
                }
            }
        }
        for client_id in stale {
            self.remove_client(&client_id).await;
        }
    }

    async fn on_connected(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        *self.state.write().await = RelayState::Connected;
        tracing::info!(camera = %self.descriptor.id, "Upstream connected");
        let _ = self.events.send(RelayEvent::Connected);
    }

    /// Retry budget spent: park in the error state and report it. The
    /// relay keeps running; `start()` can retry later, and the facade
    /// decides what to do with any still-attached viewers.
    async fn fail_terminal(&self, reason: String) {
        *self.state.write().await = RelayState::Error;
        tracing::error!(camera = %self.descriptor.id, reason = %reason, "Reconnect budget exhausted");
        let _ = self.events.send(RelayEvent::Error(reason));
    }
}
