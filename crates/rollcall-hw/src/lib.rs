//! rollcall-hw: Camera frame acquisition.
//!
//! Provides a stateless [`Camera`] frame source over V4L2 devices and IP
//! camera snapshot URLs. Every acquisition opens, reads and releases its own
//! stream.

pub mod camera;
pub mod pixel;
pub mod snapshot;
pub mod v4l2;

pub use camera::{Camera, CameraBackend, CameraEndpoint, CameraError, CameraSettings, CameraStream};
