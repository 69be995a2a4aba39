//! MJPEG camera relay
//!
//! Opens exactly one connection to an embedded IP camera and fans the
//! video out to any number of browser viewers, surviving upstream drops,
//! partial frames, and client churn.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use camrelay::camera::CameraDescriptor;
//! use camrelay::service::CameraService;
//! use camrelay::transport::HttpCameraTransport;
//!
//! # async fn example() -> camrelay::Result<()> {
//! let transport = Arc::new(HttpCameraTransport::new()?);
//! let service = CameraService::new(transport);
//!
//! service
//!     .register_camera(CameraDescriptor::new(
//!         "gate",
//!         "Front Gate",
//!         "http://camera.local/video",
//!     ))
//!     .await?;
//!
//! // Serve the dashboard API.
//! let app = camrelay::http::router(Arc::clone(&service));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod error;
pub mod http;
pub mod relay;
pub mod service;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use camera::{CameraDescriptor, CameraKind, CameraRegistry, CameraState, CameraStatus};
pub use error::{Error, Result};
pub use relay::{RelayEvent, RelayState, StreamRelay, ViewerSink};
pub use service::{CameraService, ServiceConfig, ServiceEvent};
pub use transport::{CameraTransport, HttpCameraTransport};
