//! HTTP surface
//!
//! The axum routes the dashboard talks to, and the sink adapter that
//! bridges a relay viewer onto an axum response body.

pub mod routes;
pub mod sink;

pub use routes::router;
pub use sink::{ChannelSink, MjpegBody, PendingResponse};
