//! Error types for the camera relay.
//!
//! One enum per concern, folded into the crate-level [`Error`].

use std::time::Duration;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug)]
pub enum Error {
    /// Invalid camera configuration, rejected at registration.
    Config(ConfigError),
    /// Upstream transport failure.
    Transport(TransportError),
    /// Relay lifecycle failure.
    Relay(RelayError),
    /// No camera registered under the given id.
    CameraNotFound(String),
    /// Still-image fetch failed.
    Snapshot { camera_id: String, reason: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "{}", e),
            Error::Transport(e) => write!(f, "{}", e),
            Error::Relay(e) => write!(f, "{}", e),
            Error::CameraNotFound(id) => write!(f, "Camera not found: {}", id),
            Error::Snapshot { reason, .. } => write!(f, "Failed to get snapshot: {}", reason),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Error::Relay(e)
    }
}

/// Camera descriptor validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required fields that were empty or missing, by wire name.
    MissingFields(Vec<&'static str>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingFields(fields) => {
                write!(f, "Missing required fields: {}", fields.join(", "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failure talking to an upstream camera.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The request did not complete within the allowed time.
    Timeout(Duration),
    /// The connection could not be established.
    Connect(String),
    /// The camera answered with a non-success HTTP status.
    Status(u16),
    /// The stream broke mid-read.
    Read(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout(d) => write!(f, "timed out after {}ms", d.as_millis()),
            TransportError::Connect(reason) => write!(f, "connection failed: {}", reason),
            TransportError::Status(code) => write!(f, "upstream returned HTTP {}", code),
            TransportError::Read(reason) => write!(f, "read failed: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}

/// Relay lifecycle failure.
#[derive(Debug, Clone)]
pub enum RelayError {
    /// The relay has been closed and accepts no further work.
    Closed(String),
    /// A connection attempt failed (background reconnects may continue).
    Connect {
        camera_id: String,
        error: TransportError,
    },
    /// The reconnect budget is exhausted.
    MaxRetries { camera_id: String, attempts: u32 },
    /// The viewer's sink closed before streaming began.
    ClientClosed(String),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Closed(camera_id) => {
                write!(f, "Relay for camera {} is closed", camera_id)
            }
            RelayError::Connect { camera_id, error } => {
                write!(f, "Camera {} connect failed: {}", camera_id, error)
            }
            RelayError::MaxRetries { camera_id, .. } => {
                write!(f, "Max retry attempts reached for camera {}", camera_id)
            }
            RelayError::ClientClosed(client_id) => {
                write!(f, "Viewer {} closed before streaming began", client_id)
            }
        }
    }
}

impl std::error::Error for RelayError {}

/// Write failure on a viewer sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The peer is gone; no further writes will succeed.
    Closed,
    /// The per-client queue is full; this write was dropped.
    Backpressured,
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Closed => write!(f, "sink closed"),
            SinkError::Backpressured => write!(f, "sink queue full"),
        }
    }
}

impl std::error::Error for SinkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_error_message() {
        let err = Error::Snapshot {
            camera_id: "cam-1".to_string(),
            reason: "upstream returned HTTP 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to get snapshot: upstream returned HTTP 503"
        );
    }

    #[test]
    fn test_missing_fields_message() {
        let err = ConfigError::MissingFields(vec!["id", "name", "streamUrl"]);
        assert_eq!(
            err.to_string(),
            "Missing required fields: id, name, streamUrl"
        );
    }

    #[test]
    fn test_max_retries_message() {
        let err = RelayError::MaxRetries {
            camera_id: "gate".to_string(),
            attempts: 5,
        };
        assert_eq!(err.to_string(), "Max retry attempts reached for camera gate");
    }
}
