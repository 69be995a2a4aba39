//! Camera registry: descriptor storage plus the registration probe.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::camera::descriptor::CameraDescriptor;
use crate::error::ConfigError;
use crate::service::ServiceEvent;
use crate::transport::CameraTransport;

/// Outcome of a successful registration.
#[derive(Debug, Clone)]
pub enum Registration {
    /// The camera answered the reachability probe.
    Online,
    /// Stored anyway; the probe failed with the given error.
    Unreachable(crate::error::TransportError),
}

/// Validated camera descriptors, keyed by camera id.
pub struct CameraRegistry<T: CameraTransport> {
    transport: Arc<T>,
    cameras: RwLock<HashMap<String, CameraDescriptor>>,
    events: broadcast::Sender<ServiceEvent>,
}

impl<T: CameraTransport> CameraRegistry<T> {
    pub fn new(transport: Arc<T>, events: broadcast::Sender<ServiceEvent>) -> Self {
        Self {
            transport,
            cameras: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Validate, probe, and store a camera.
    ///
    /// A failed probe does not reject the camera: the descriptor is stored
    /// either way so the dashboard entry exists whether or not the device is
    /// currently up. Registering an existing id replaces its descriptor.
    pub async fn register(
        &self,
        descriptor: CameraDescriptor,
    ) -> std::result::Result<Registration, ConfigError> {
        descriptor.validate()?;

        let probe = self.transport.probe(descriptor.stream_target()).await;
        let camera_id = descriptor.id.clone();
        let replaced = {
            let mut cameras = self.cameras.write().await;
            cameras.insert(camera_id.clone(), descriptor).is_some()
        };

        match probe {
            Ok(()) => {
                tracing::info!(camera = %camera_id, replaced, "Camera registered");
                let _ = self.events.send(ServiceEvent::CameraAdded {
                    camera_id: camera_id.clone(),
                });
                Ok(Registration::Online)
            }
            Err(e) => {
                tracing::warn!(camera = %camera_id, error = %e, "Camera registered but probe failed");
                let _ = self.events.send(ServiceEvent::CameraError {
                    camera_id: camera_id.clone(),
                    error: e.to_string(),
                });
                Ok(Registration::Unreachable(e))
            }
        }
    }

    /// Drop a camera. Returns whether it existed.
    pub async fn remove(&self, camera_id: &str) -> bool {
        let removed = self.cameras.write().await.remove(camera_id).is_some();
        if removed {
            tracing::info!(camera = %camera_id, "Camera removed");
            let _ = self.events.send(ServiceEvent::CameraRemoved {
                camera_id: camera_id.to_string(),
            });
        }
        removed
    }

    pub async fn get(&self, camera_id: &str) -> Option<CameraDescriptor> {
        self.cameras.read().await.get(camera_id).cloned()
    }

    pub async fn list(&self) -> Vec<CameraDescriptor> {
        self.cameras.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.cameras.read().await.len()
    }
}
