//! Camera source descriptors.
//!
//! The wire format matches the dashboard API: camelCase fields, `type` for
//! the kind, credentials accepted on the way in but never echoed back.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_retry_attempts() -> u32 {
    5
}

/// What the upstream endpoint serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    /// Continuous `multipart/x-mixed-replace` stream.
    #[default]
    Mjpeg,
    /// Repeated complete still images; every upstream push is one frame.
    Snapshot,
    /// Anything else; treated like a multipart stream on the wire.
    #[serde(other)]
    Other,
}

impl CameraKind {
    /// Whether each upstream push carries one whole image.
    pub fn is_still(&self) -> bool {
        matches!(self, CameraKind::Snapshot)
    }
}

/// A configured camera source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: CameraKind,
    pub stream_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Accepted on registration, never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Connect timeout in milliseconds.
    #[serde(rename = "timeout", default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Reconnect attempts before the relay gives up.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

impl CameraDescriptor {
    /// Descriptor with default kind, timeout, and retry budget.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        stream_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: CameraKind::Mjpeg,
            stream_url: stream_url.into(),
            snapshot_url: None,
            username: None,
            password: None,
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
        }
    }

    /// Set the camera kind.
    pub fn kind(mut self, kind: CameraKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set a dedicated still-image endpoint.
    pub fn snapshot_url(mut self, url: impl Into<String>) -> Self {
        self.snapshot_url = Some(url.into());
        self
    }

    /// Set basic-auth credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the connect timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the reconnect budget.
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Reject descriptors missing any required field.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.id.trim().is_empty() {
            missing.push("id");
        }
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.stream_url.trim().is_empty() {
            missing.push("streamUrl");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingFields(missing))
        }
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Basic-auth credentials, when a username is configured. A missing
    /// password defaults to empty, matching what cameras expect.
    pub fn auth(&self) -> Option<Credentials> {
        self.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.password.clone().unwrap_or_default(),
        })
    }

    /// Request parameters for the continuous stream endpoint.
    pub fn stream_target(&self) -> StreamTarget {
        StreamTarget {
            url: self.stream_url.clone(),
            credentials: self.auth(),
            timeout: self.connect_timeout(),
        }
    }

    /// Request parameters for the still endpoint, falling back to the
    /// stream URL when no dedicated snapshot endpoint is configured.
    pub fn still_target(&self) -> StreamTarget {
        StreamTarget {
            url: self
                .snapshot_url
                .clone()
                .unwrap_or_else(|| self.stream_url.clone()),
            credentials: self.auth(),
            timeout: self.connect_timeout(),
        }
    }
}

/// Basic-auth credentials for an upstream camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Owned request parameters handed to the upstream transport.
#[derive(Debug, Clone)]
pub struct StreamTarget {
    pub url: String,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cam = CameraDescriptor::new("cam-1", "Front Gate", "http://camera.local/video");
        assert_eq!(cam.kind, CameraKind::Mjpeg);
        assert_eq!(cam.timeout_ms, 5_000);
        assert_eq!(cam.retry_attempts, 5);
        assert!(cam.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let cam = CameraDescriptor::new("", "  ", "http://camera.local/video");
        let err = cam.validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: id, name");

        let cam = CameraDescriptor::new("", "", "");
        let err = cam.validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: id, name, streamUrl");
    }

    #[test]
    fn test_still_target_falls_back_to_stream_url() {
        let cam = CameraDescriptor::new("cam-1", "Gate", "http://camera.local/video");
        assert_eq!(cam.still_target().url, "http://camera.local/video");

        let cam = cam.snapshot_url("http://camera.local/still.jpg");
        assert_eq!(cam.still_target().url, "http://camera.local/still.jpg");
        assert_eq!(cam.stream_target().url, "http://camera.local/video");
    }

    #[test]
    fn test_auth_defaults_password_to_empty() {
        let cam = CameraDescriptor::new("cam-1", "Gate", "http://camera.local/video");
        assert!(cam.auth().is_none());

        let mut cam = cam.credentials("admin", "s3cret");
        let creds = cam.auth().unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "s3cret");

        cam.password = None;
        assert_eq!(cam.auth().unwrap().password, "");
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{
            "id": "cam-1",
            "name": "Front Gate",
            "type": "snapshot",
            "streamUrl": "http://camera.local/video",
            "snapshotUrl": "http://camera.local/still.jpg",
            "username": "admin",
            "password": "s3cret",
            "timeout": 2000,
            "retryAttempts": 3
        }"#;
        let cam: CameraDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(cam.kind, CameraKind::Snapshot);
        assert_eq!(cam.stream_url, "http://camera.local/video");
        assert_eq!(cam.timeout_ms, 2_000);
        assert_eq!(cam.retry_attempts, 3);
        assert_eq!(cam.password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_unknown_kind_maps_to_other() {
        let json = r#"{"id": "x", "name": "X", "type": "rtsp", "streamUrl": "http://x/"}"#;
        let cam: CameraDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(cam.kind, CameraKind::Other);
    }

    #[test]
    fn test_password_never_serialized() {
        let cam = CameraDescriptor::new("cam-1", "Gate", "http://camera.local/video")
            .credentials("admin", "s3cret");
        let json = serde_json::to_string(&cam).unwrap();
        assert!(json.contains("\"username\":\"admin\""));
        assert!(!json.contains("s3cret"));
        assert!(json.contains("\"streamUrl\""));
    }
}
