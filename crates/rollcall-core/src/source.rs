use crate::frame::Frame;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("camera unavailable at {endpoint}: {reason}")]
    CameraUnavailable { endpoint: String, reason: String },
    #[error("no frame source configured")]
    NotConfigured,
}

/// Produces one usable frame per call. Implementations hold no stream between calls.
pub trait FrameSource: Send + Sync {
    fn acquire(&self) -> Result<Frame, AcquireError>;
}
