//! Per-camera status records served by the dashboard API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reachability state of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraState {
    /// Frames or stills were recently served.
    Online,
    /// Registered but not currently connected.
    Offline,
    /// A connection attempt or reconnect is in progress.
    Connecting,
    /// The last operation failed; see the error text.
    Error,
}

/// One camera's health record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatus {
    pub id: String,
    pub status: CameraState,
    /// When the camera last produced data or answered a probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Viewers currently attached to the camera's stream.
    pub client_count: u32,
}

impl CameraStatus {
    /// Fresh record in the given state, stamped now.
    pub fn new(id: impl Into<String>, status: CameraState) -> Self {
        Self {
            id: id.into(),
            status,
            last_seen: Some(Utc::now()),
            error: None,
            client_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_camel_case() {
        let mut status = CameraStatus::new("cam-1", CameraState::Online);
        status.client_count = 2;
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"online\""));
        assert!(json.contains("\"lastSeen\""));
        assert!(json.contains("\"clientCount\":2"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_error_state_carries_message() {
        let mut status = CameraStatus::new("cam-1", CameraState::Error);
        status.error = Some("connection failed: refused".to_string());
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("connection failed"));
    }
}
