//! The camera service facade.
//!
//! Orchestrates the registry, the per-camera relays, the snapshot cache,
//! and the status records the dashboard reads. One instance per process,
//! constructed explicitly and shut down explicitly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use crate::camera::{
    CameraDescriptor, CameraRegistry, CameraState, CameraStatus, Registration,
};
use crate::error::{Error, Result};
use crate::relay::{RelayEvent, StreamRelay, ViewerSink};
use crate::transport::CameraTransport;

use super::config::ServiceConfig;
use super::events::ServiceEvent;
use super::snapshot::SnapshotCache;

/// Facade over the relay core, generic over the upstream transport so
/// tests can script the camera side.
pub struct CameraService<T: CameraTransport> {
    config: ServiceConfig,
    transport: Arc<T>,
    registry: CameraRegistry<T>,
    relays: RwLock<HashMap<String, Arc<StreamRelay<T>>>>,
    snapshots: SnapshotCache,
    statuses: RwLock<HashMap<String, CameraStatus>>,
    events: broadcast::Sender<ServiceEvent>,
    started_at: Instant,
}

impl<T: CameraTransport> CameraService<T> {
    /// Service with default configuration.
    pub fn new(transport: Arc<T>) -> Arc<Self> {
        Self::with_config(transport, ServiceConfig::default())
    }

    pub fn with_config(transport: Arc<T>, config: ServiceConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity);
        Arc::new(Self {
            registry: CameraRegistry::new(Arc::clone(&transport), events.clone()),
            snapshots: SnapshotCache::new(config.snapshot_ttl),
            relays: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
            transport,
            config,
            events,
            started_at: Instant::now(),
        })
    }

    /// Subscribe to service lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    /// How long the service has been running.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Register a camera: validate, probe, store, and create its status
    /// record. A failed probe stores the camera offline rather than
    /// rejecting it. Re-registering an id replaces the descriptor and
    /// closes any relay still serving the old one.
    pub async fn register_camera(&self, descriptor: CameraDescriptor) -> Result<Registration> {
        let camera_id = descriptor.id.clone();
        let outcome = self.registry.register(descriptor).await?;

        // A replaced descriptor must not keep serving through a relay
        // built from the old endpoint.
        let stale = self.relays.write().await.remove(&camera_id);
        if let Some(relay) = stale {
            relay.close().await;
        }

        let status = match &outcome {
            Registration::Online => CameraStatus::new(&camera_id, CameraState::Online),
            Registration::Unreachable(e) => {
                let mut status = CameraStatus::new(&camera_id, CameraState::Offline);
                status.error = Some(e.to_string());
                status
            }
        };
        self.statuses
            .write()
            .await
            .insert(camera_id, status.clone());
        let _ = self.events.send(ServiceEvent::StatusChanged(status));
        Ok(outcome)
    }

    /// Unregister a camera, closing its relay and dropping its status.
    /// Returns whether the camera existed.
    pub async fn unregister_camera(&self, camera_id: &str) -> bool {
        if !self.registry.remove(camera_id).await {
            return false;
        }
        let relay = self.relays.write().await.remove(camera_id);
        if let Some(relay) = relay {
            relay.close().await;
        }
        self.statuses.write().await.remove(camera_id);
        true
    }

    pub async fn list_cameras(&self) -> Vec<CameraDescriptor> {
        self.registry.list().await
    }

    pub async fn get_status(&self, camera_id: &str) -> Option<CameraStatus> {
        self.statuses.read().await.get(camera_id).cloned()
    }

    pub async fn get_all_statuses(&self) -> Vec<CameraStatus> {
        self.statuses.read().await.values().cloned().collect()
    }

    /// The tracked relay for a camera, or a fresh one built from its
    /// descriptor. A relay that died (error or closed) has already been
    /// dropped from tracking, so the next viewer gets a new instance.
    pub async fn get_or_create_relay(
        self: &Arc<Self>,
        camera_id: &str,
    ) -> Result<Arc<StreamRelay<T>>> {
        {
            let relays = self.relays.read().await;
            if let Some(relay) = relays.get(camera_id) {
                if !relay.is_closed() {
                    return Ok(Arc::clone(relay));
                }
            }
        }

        let descriptor = self
            .registry
            .get(camera_id)
            .await
            .ok_or_else(|| Error::CameraNotFound(camera_id.to_string()))?;

        let mut relays = self.relays.write().await;
        // Another caller may have created one during the lock gap.
        if let Some(relay) = relays.get(camera_id) {
            if !relay.is_closed() {
                return Ok(Arc::clone(relay));
            }
        }
        let relay = StreamRelay::new(
            descriptor,
            Arc::clone(&self.transport),
            self.config.relay_event_capacity,
        );
        self.spawn_status_bridge(&relay);
        relays.insert(camera_id.to_string(), Arc::clone(&relay));
        tracing::debug!(camera = %camera_id, "Relay created");
        Ok(relay)
    }

    /// Attach a viewer to a camera's stream, starting the upstream
    /// connection if this is the first viewer.
    ///
    /// An `Err` from the connect attempt leaves the viewer attached: the
    /// relay keeps reconnecting in the background and the viewer receives
    /// frames once connectivity resumes. Callers decide whether to keep
    /// the viewer transport open in the meantime.
    pub async fn open_stream(
        self: &Arc<Self>,
        camera_id: &str,
        client_id: &str,
        sink: Box<dyn ViewerSink>,
    ) -> Result<()> {
        let relay = self.get_or_create_relay(camera_id).await?;
        relay.add_client(client_id, sink).await?;
        relay.start().await?;
        Ok(())
    }

    /// Pre-open a camera's upstream connection before any viewer asks.
    pub async fn warm(self: &Arc<Self>, camera_id: &str) -> Result<()> {
        let relay = self.get_or_create_relay(camera_id).await?;
        relay.start().await?;
        Ok(())
    }

    /// A still image for a camera, served from the cache when fresh.
    ///
    /// A miss triggers exactly one upstream fetch, independent of any
    /// active stream relay for the same camera. The outcome is recorded
    /// in the camera's status either way.
    pub async fn get_snapshot(&self, camera_id: &str) -> Result<Bytes> {
        if let Some(cached) = self.snapshots.get(camera_id).await {
            return Ok(cached);
        }
        let descriptor = self
            .registry
            .get(camera_id)
            .await
            .ok_or_else(|| Error::CameraNotFound(camera_id.to_string()))?;

        match self.transport.fetch_still(descriptor.still_target()).await {
            Ok(payload) => {
                self.snapshots.put(camera_id, payload.clone()).await;
                self.update_status(camera_id, |status| {
                    status.status = CameraState::Online;
                    status.last_seen = Some(Utc::now());
                    status.error = None;
                })
                .await;
                Ok(payload)
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(camera = %camera_id, error = %reason, "Snapshot fetch failed");
                self.update_status(camera_id, |status| {
                    status.status = CameraState::Error;
                    status.error = Some(reason.clone());
                })
                .await;
                Err(Error::Snapshot {
                    camera_id: camera_id.to_string(),
                    reason,
                })
            }
        }
    }

    /// Close every relay and drop all cached state. Called once at
    /// process shutdown.
    pub async fn shutdown(&self) {
        let relays: Vec<(String, Arc<StreamRelay<T>>)> =
            self.relays.write().await.drain().collect();
        for (_, relay) in relays {
            relay.close().await;
        }
        self.snapshots.clear().await;
        self.statuses.write().await.clear();
        tracing::info!("Camera service shut down");
    }

    /// Bridge one relay's events into status updates and service events.
    /// The bridge drops the tracked relay on `error`/`closed` so the next
    /// viewer request builds a fresh instance, and closes the relay after
    /// a terminal error so stalled viewers see end-of-stream.
    fn spawn_status_bridge(self: &Arc<Self>, relay: &Arc<StreamRelay<T>>) {
        let service = Arc::clone(self);
        let relay = Arc::clone(relay);
        let mut events = relay.subscribe();
        tokio::spawn(async move {
            let camera_id = relay.camera_id().to_string();
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(camera = %camera_id, skipped, "Status bridge lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                match event {
                    RelayEvent::Connected => {
                        service
                            .update_status(&camera_id, |status| {
                                status.status = CameraState::Online;
                                status.last_seen = Some(Utc::now());
                                status.error = None;
                            })
                            .await;
                    }
                    RelayEvent::Reconnecting { reason, .. } => {
                        service
                            .update_status(&camera_id, |status| {
                                status.status = CameraState::Connecting;
                                status.error = Some(reason.clone());
                            })
                            .await;
                    }
                    RelayEvent::Error(reason) => {
                        service
                            .update_status(&camera_id, |status| {
                                status.status = CameraState::Error;
                                status.error = Some(reason.clone());
                            })
                            .await;
                        let _ = service.events.send(ServiceEvent::CameraError {
                            camera_id: camera_id.clone(),
                            error: reason,
                        });
                        service.drop_relay(&camera_id, &relay).await;
                        // Free any viewers still waiting on the dead relay.
                        // The bridge stops first so the resulting `closed`
                        // event does not overwrite the error status.
                        relay.close().await;
                        break;
                    }
                    RelayEvent::Closed => {
                        service
                            .update_status(&camera_id, |status| {
                                status.status = CameraState::Offline;
                                status.client_count = 0;
                            })
                            .await;
                        service.drop_relay(&camera_id, &relay).await;
                        break;
                    }
                    RelayEvent::ClientConnected(client_id) => {
                        let count = relay.client_count().await as u32;
                        service
                            .update_status(&camera_id, |status| status.client_count = count)
                            .await;
                        let _ = service.events.send(ServiceEvent::ClientConnected {
                            camera_id: camera_id.clone(),
                            client_id,
                        });
                    }
                    RelayEvent::ClientDisconnected(client_id) => {
                        let count = relay.client_count().await as u32;
                        service
                            .update_status(&camera_id, |status| status.client_count = count)
                            .await;
                        let _ = service.events.send(ServiceEvent::ClientDisconnected {
                            camera_id: camera_id.clone(),
                            client_id,
                        });
                    }
                }
            }
        });
    }

    /// Drop a relay from tracking, but only if it is still the tracked
    /// instance. A replacement registered in the meantime stays.
    async fn drop_relay(&self, camera_id: &str, relay: &Arc<StreamRelay<T>>) {
        let mut relays = self.relays.write().await;
        if let Some(tracked) = relays.get(camera_id) {
            if Arc::ptr_eq(tracked, relay) {
                relays.remove(camera_id);
            }
        }
    }

    /// Apply a mutation to a camera's status and publish the new record.
    /// A no-op for unregistered cameras.
    async fn update_status(&self, camera_id: &str, apply: impl FnOnce(&mut CameraStatus)) {
        let updated = {
            let mut statuses = self.statuses.write().await;
            match statuses.get_mut(camera_id) {
                Some(status) => {
                    apply(status);
                    Some(status.clone())
                }
                None => None,
            }
        };
        if let Some(status) = updated {
            let _ = self.events.send(ServiceEvent::StatusChanged(status));
        }
    }
}
