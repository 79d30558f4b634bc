//! IP camera JPEG snapshot endpoint.
//!
//! Every read is a fresh HTTP GET, so there is no queued frame to flush.

use crate::camera::{CameraBackend, CameraError, CameraStream};
use rollcall_core::Frame;
use std::time::Duration;

pub struct SnapshotBackend {
    url: String,
    client: reqwest::blocking::Client,
}

impl SnapshotBackend {
    pub fn new(url: String, timeout: Duration) -> Result<Self, CameraError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CameraError::CaptureFailed(format!("http client: {e}")))?;
        Ok(Self { url, client })
    }
}

struct SnapshotStream {
    url: String,
    client: reqwest::blocking::Client,
    sequence: u32,
}

impl CameraBackend for SnapshotBackend {
    fn open(&self) -> Result<Box<dyn CameraStream>, CameraError> {
        Ok(Box::new(SnapshotStream {
            url: self.url.clone(),
            client: self.client.clone(),
            sequence: 0,
        }))
    }
}

impl CameraStream for SnapshotStream {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| CameraError::CaptureFailed(format!("snapshot request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CameraError::CaptureFailed(format!("snapshot returned {status}")));
        }

        let body = response
            .bytes()
            .map_err(|e| CameraError::CaptureFailed(format!("snapshot body: {e}")))?;
        let mut frame =
            Frame::from_encoded(&body).map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        self.sequence = self.sequence.wrapping_add(1);
        frame.sequence = self.sequence;
        Ok(frame)
    }

    fn is_buffered(&self) -> bool {
        false
    }
}
