//! Camera configuration, status, and the registry that holds them.

pub mod descriptor;
pub mod registry;
pub mod status;

pub use descriptor::{CameraDescriptor, CameraKind, Credentials, StreamTarget};
pub use registry::{CameraRegistry, Registration};
pub use status::{CameraState, CameraStatus};
