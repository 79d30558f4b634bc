//! Per-call frame acquisition from an unreliable camera endpoint.
//!
//! Each [`Camera::acquire`] opens its own stream, flushes stale buffers,
//! retries a bounded number of reads, and drops the stream before returning.

use crate::snapshot::SnapshotBackend;
use crate::v4l2::V4lBackend;
use rollcall_core::{AcquireError, Frame, FrameSource};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Share of near-black pixels above which a frame counts as dark.
const DARK_FRAME_THRESHOLD: f32 = 0.95;
/// Upper bound on the sleep between failed reads.
const MAX_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("unsupported camera endpoint: {0}")]
    UnsupportedEndpoint(String),
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEndpoint {
    /// Local V4L2 device node.
    Device(PathBuf),
    /// IP camera JPEG snapshot URL.
    Snapshot(String),
}

impl CameraEndpoint {
    /// `/dev/videoN`, a bare device index, or an `http(s)://` snapshot URL.
    pub fn parse(endpoint: &str) -> Result<Self, CameraError> {
        let endpoint = endpoint.trim();
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Ok(CameraEndpoint::Snapshot(endpoint.to_string()))
        } else if endpoint.starts_with('/') {
            Ok(CameraEndpoint::Device(PathBuf::from(endpoint)))
        } else if let Ok(index) = endpoint.parse::<u32>() {
            Ok(CameraEndpoint::Device(PathBuf::from(format!("/dev/video{index}"))))
        } else {
            Err(CameraError::UnsupportedEndpoint(endpoint.to_string()))
        }
    }
}

/// An open stream. Dropping it releases the underlying handle.
pub trait CameraStream {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Whether the source queues frames that go stale between reads.
    fn is_buffered(&self) -> bool {
        true
    }
}

/// Opens streams for an endpoint.
pub trait CameraBackend: Send + Sync {
    fn open(&self) -> Result<Box<dyn CameraStream>, CameraError>;
}

/// Acquisition policy.
#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Reads thrown away after opening to flush stale buffered frames.
    pub discard_frames: usize,
    /// Reads attempted after the discard phase before giving up.
    pub read_attempts: usize,
    /// Sleep after the first failed read; doubles per failure up to one second.
    pub retry_backoff: Duration,
    pub reject_dark_frames: bool,
    /// Bound on a single read.
    pub read_timeout: Duration,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            discard_frames: 5,
            read_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            reject_dark_frames: true,
            read_timeout: Duration::from_secs(2),
        }
    }
}

/// Stateless frame source: open, read, release on every call.
pub struct Camera {
    endpoint: String,
    backend: Arc<dyn CameraBackend>,
    settings: CameraSettings,
}

impl Camera {
    /// Build a camera for `endpoint`, picking the V4L2 or snapshot backend.
    ///
    /// Nothing is opened here; the first stream is opened by [`Camera::acquire`].
    pub fn from_endpoint(endpoint: &str, settings: CameraSettings) -> Result<Self, CameraError> {
        let backend: Arc<dyn CameraBackend> = match CameraEndpoint::parse(endpoint)? {
            CameraEndpoint::Device(path) => {
                Arc::new(V4lBackend::new(path, settings.read_timeout))
            }
            CameraEndpoint::Snapshot(url) => {
                Arc::new(SnapshotBackend::new(url, settings.read_timeout)?)
            }
        };
        Ok(Self::with_backend(endpoint, backend, settings))
    }

    pub fn with_backend(
        endpoint: &str,
        backend: Arc<dyn CameraBackend>,
        settings: CameraSettings,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            backend,
            settings,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn unavailable(&self, reason: impl Into<String>) -> AcquireError {
        AcquireError::CameraUnavailable {
            endpoint: self.endpoint.clone(),
            reason: reason.into(),
        }
    }

    /// Read frames from an open stream. The caller owns (and drops) the stream.
    fn read_usable(&self, stream: &mut dyn CameraStream) -> Result<Frame, AcquireError> {
        if stream.is_buffered() {
            for i in 0..self.settings.discard_frames {
                if let Err(e) = stream.read_frame() {
                    tracing::debug!(endpoint = %self.endpoint, read = i, error = %e, "discard read failed");
                }
            }
        }

        let attempts = self.settings.read_attempts.max(1);
        let mut backoff = self.settings.retry_backoff;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match stream.read_frame() {
                Ok(frame) if self.settings.reject_dark_frames && frame.is_dark(DARK_FRAME_THRESHOLD) => {
                    tracing::debug!(endpoint = %self.endpoint, attempt, seq = frame.sequence, "skipping dark frame");
                    last_error = "frame too dark".to_string();
                }
                Ok(frame) => {
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        attempt,
                        width = frame.width,
                        height = frame.height,
                        "frame acquired"
                    );
                    return Ok(frame);
                }
                Err(e) => {
                    tracing::debug!(endpoint = %self.endpoint, attempt, error = %e, "read failed");
                    last_error = e.to_string();
                }
            }

            if attempt < attempts && !backoff.is_zero() {
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }

        Err(self.unavailable(format!(
            "no usable frame after {attempts} reads: {last_error}"
        )))
    }
}

impl FrameSource for Camera {
    fn acquire(&self) -> Result<Frame, AcquireError> {
        let mut stream = self.backend.open().map_err(|e| {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "camera open failed");
            self.unavailable(e.to_string())
        })?;

        let result = self.read_usable(stream.as_mut());
        drop(stream);

        if let Err(e) = &result {
            tracing::warn!(error = %e, "frame acquisition failed");
        }
        result
    }
}
