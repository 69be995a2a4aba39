//! Service-wide lifecycle events.

use crate::camera::CameraStatus;

/// Events published on the service bus for dashboards and status pages.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// A camera was registered and answered its probe.
    CameraAdded { camera_id: String },
    /// A camera-level failure: failed probe or exhausted reconnects.
    CameraError { camera_id: String, error: String },
    /// A camera was unregistered.
    CameraRemoved { camera_id: String },
    /// A viewer attached to a camera's stream.
    ClientConnected {
        camera_id: String,
        client_id: String,
    },
    /// A viewer detached.
    ClientDisconnected {
        camera_id: String,
        client_id: String,
    },
    /// A camera's status record changed.
    StatusChanged(CameraStatus),
}
