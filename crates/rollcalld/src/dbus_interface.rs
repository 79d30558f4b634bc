use crate::engine::{EngineError, EngineHandle};
use chrono::NaiveDate;
use rollcall_core::AcquireError;
use std::path::PathBuf;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    engine: EngineHandle,
    camera_endpoint: String,
    recognizer_url: String,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle, camera_endpoint: String, recognizer_url: String) -> Self {
        Self {
            engine,
            camera_endpoint,
            recognizer_url,
        }
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Capture a frame from the daemon's camera and mark everyone recognized in it.
    /// Returns the outcome report as JSON.
    async fn mark_from_camera(&self) -> zbus::fdo::Result<String> {
        tracing::info!("mark_from_camera requested");
        let report = self.engine.mark_from_camera().await.map_err(to_fdo)?;
        to_json(&report)
    }

    /// Mark everyone recognized in the image at `path` (read by the daemon).
    async fn mark_from_file(&self, path: &str) -> zbus::fdo::Result<String> {
        tracing::info!(path, "mark_from_file requested");
        if path.trim().is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("path must not be empty".into()));
        }
        let report = self
            .engine
            .mark_from_file(PathBuf::from(path))
            .await
            .map_err(to_fdo)?;
        to_json(&report)
    }

    /// Attendance events for `date` (`YYYY-MM-DD`) as a JSON array.
    async fn attendance_on(&self, date: &str) -> zbus::fdo::Result<String> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|e| {
            zbus::fdo::Error::InvalidArgs(format!("invalid date {date:?}: {e}"))
        })?;
        let events = self.engine.attendance_on(date).await.map_err(to_fdo)?;
        to_json(&events)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "camera": if self.engine.has_camera() { self.camera_endpoint.as_str() } else { "disabled" },
            "recognizer": self.recognizer_url,
        })
        .to_string())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Acquire(AcquireError::NotConfigured) => {
            zbus::fdo::Error::NotSupported("no camera configured".into())
        }
        EngineError::Frame(_) | EngineError::Io(_) => zbus::fdo::Error::InvalidArgs(err.to_string()),
        EngineError::Timeout(_) => zbus::fdo::Error::TimedOut(err.to_string()),
        _ => zbus::fdo::Error::Failed(err.to_string()),
    }
}
