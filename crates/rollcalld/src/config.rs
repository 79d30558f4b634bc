use rollcall_hw::CameraSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(BusKind::Session),
            "system" => Ok(BusKind::System),
            other => Err(format!("unknown bus: {other}")),
        }
    }
}

/// Daemon configuration.
///
/// Defaults, overlaid by the TOML file named in `ROLLCALL_CONFIG` (if any),
/// overlaid by individual `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera endpoint: `/dev/videoN`, a device index, or an `http(s)://`
    /// snapshot URL. Empty disables camera capture.
    pub camera: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Endpoint of the face-recognition oracle.
    pub recognizer_url: String,
    pub recognizer_timeout_secs: u64,
    /// Minimum oracle score for a top candidate to count as a match.
    pub min_score: Option<f32>,
    /// Reads discarded after opening the camera to flush stale buffers.
    pub discard_frames: usize,
    /// Reads attempted per acquisition before reporting the camera unavailable.
    pub read_attempts: usize,
    pub retry_backoff_ms: u64,
    pub reject_dark_frames: bool,
    /// Camera polling period in milliseconds; 0 disables polling.
    pub poll_interval_ms: u64,
    /// Upper bound on a single mark request, end to end.
    pub request_timeout_secs: u64,
    pub bus: BusKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: "/dev/video0".to_string(),
            db_path: rollcall_store::default_db_path(),
            recognizer_url: "http://127.0.0.1:5005/recognize".to_string(),
            recognizer_timeout_secs: 10,
            min_score: None,
            discard_frames: 5,
            read_attempts: 3,
            retry_backoff_ms: 50,
            reject_dark_frames: true,
            poll_interval_ms: 0,
            request_timeout_secs: 20,
            bus: BusKind::Session,
        }
    }
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` (optional) and `ROLLCALL_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `ROLLCALL_*` overrides read through `get`. Unparseable values are ignored.
    pub fn with_overrides(self, get: impl Fn(&str) -> Option<String>) -> Self {
        let min_score = match get("ROLLCALL_MIN_SCORE") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => v.parse().ok().or(self.min_score),
            None => self.min_score,
        };

        Self {
            camera: get("ROLLCALL_CAMERA").unwrap_or(self.camera),
            db_path: get("ROLLCALL_DB_PATH").map(PathBuf::from).unwrap_or(self.db_path),
            recognizer_url: get("ROLLCALL_RECOGNIZER_URL").unwrap_or(self.recognizer_url),
            recognizer_timeout_secs: env_or(&get, "ROLLCALL_RECOGNIZER_TIMEOUT_SECS", self.recognizer_timeout_secs),
            min_score,
            discard_frames: env_or(&get, "ROLLCALL_DISCARD_FRAMES", self.discard_frames),
            read_attempts: env_or(&get, "ROLLCALL_READ_ATTEMPTS", self.read_attempts),
            retry_backoff_ms: env_or(&get, "ROLLCALL_RETRY_BACKOFF_MS", self.retry_backoff_ms),
            reject_dark_frames: get("ROLLCALL_REJECT_DARK_FRAMES")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(self.reject_dark_frames),
            poll_interval_ms: env_or(&get, "ROLLCALL_POLL_INTERVAL_MS", self.poll_interval_ms),
            request_timeout_secs: env_or(&get, "ROLLCALL_REQUEST_TIMEOUT_SECS", self.request_timeout_secs),
            bus: env_or(&get, "ROLLCALL_BUS", self.bus),
        }
    }

    pub fn camera_enabled(&self) -> bool {
        !self.camera.trim().is_empty()
    }

    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            discard_frames: self.discard_frames,
            read_attempts: self.read_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            reject_dark_frames: self.reject_dark_frames,
            ..CameraSettings::default()
        }
    }

    pub fn recognizer_timeout(&self) -> Duration {
        Duration::from_secs(self.recognizer_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }
}

fn env_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
