//! Stream relay core
//!
//! One relay per camera: a single upstream connection, an incremental
//! frame parser, and fan-out to any number of attached viewers.

pub mod assembler;
pub mod client;
pub mod events;
pub mod stream;

pub use assembler::{boundary_token, FrameAssembler};
pub use client::{ClosedSignal, StreamPreamble, ViewerSink};
pub use events::RelayEvent;
pub use stream::{RelayState, StreamRelay};
