use crate::config::Config;
use chrono::NaiveDate;
use rollcall_core::{
    AcquireError, AttendanceEvent, AttendanceLedger, Frame, FrameError, FrameSource, IdentityResolver,
    LedgerError, Orchestrator, OutcomeReport, PipelineConfig,
};
use rollcall_hw::Camera;
use rollcall_oracle::HttpRecognizer;
use rollcall_store::SqliteStore;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Acquire(#[from] AcquireError),
    #[error("invalid image: {0}")]
    Frame(#[from] FrameError),
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine workers exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers and the poller to the worker threads.
enum EngineRequest {
    MarkFromCamera {
        reply: oneshot::Sender<Result<OutcomeReport, EngineError>>,
    },
    MarkFromFile {
        path: PathBuf,
        reply: oneshot::Sender<Result<OutcomeReport, EngineError>>,
    },
    AttendanceOn {
        date: NaiveDate,
        reply: oneshot::Sender<Result<Vec<AttendanceEvent>, EngineError>>,
    },
}

/// Clone-safe handle to the engine workers.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    has_camera: bool,
    timeout: Duration,
}

impl EngineHandle {
    pub fn has_camera(&self) -> bool {
        self.has_camera
    }

    /// Capture one frame from the configured camera and mark everyone in it.
    pub async fn mark_from_camera(&self) -> Result<OutcomeReport, EngineError> {
        self.request(|reply| EngineRequest::MarkFromCamera { reply }).await
    }

    /// Decode an image file and mark everyone in it.
    pub async fn mark_from_file(&self, path: PathBuf) -> Result<OutcomeReport, EngineError> {
        self.request(|reply| EngineRequest::MarkFromFile { path, reply }).await
    }

    pub async fn attendance_on(&self, date: NaiveDate) -> Result<Vec<AttendanceEvent>, EngineError> {
        self.request(|reply| EngineRequest::AttendanceOn { date, reply }).await
    }

    /// Send a request and wait for its reply, bounded by the request timeout.
    ///
    /// The deadline covers waiting for a free queue slot as well as the reply.
    /// A request that reached a worker keeps running there; only the caller
    /// gives up.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(build(reply_tx))
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .unwrap_or_else(|_| Err(EngineError::Timeout(self.timeout)))
    }
}

/// Wire the store, recognizer and camera into an orchestrator.
///
/// Fails fast when the database or the recognizer URL is unusable. An
/// unusable camera endpoint is logged and capture is disabled, since
/// file-based marking still works without one.
pub fn build_pipeline(config: &Config) -> anyhow::Result<(Arc<Orchestrator>, Arc<SqliteStore>)> {
    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    let recognizer = HttpRecognizer::new(&config.recognizer_url, config.recognizer_timeout())?;
    tracing::info!(url = %recognizer.url(), "recognition oracle configured");

    let frame_source: Option<Arc<dyn FrameSource>> = if config.camera_enabled() {
        match Camera::from_endpoint(&config.camera, config.camera_settings()) {
            Ok(camera) => {
                tracing::info!(endpoint = %camera.endpoint(), "camera configured");
                Some(Arc::new(camera))
            }
            Err(e) => {
                tracing::warn!(endpoint = %config.camera, error = %e, "camera unusable; capture disabled");
                None
            }
        }
    } else {
        tracing::info!("no camera configured; capture disabled");
        None
    };

    let orchestrator = Orchestrator::new(PipelineConfig {
        recognizer: Arc::new(recognizer),
        directory: store.clone(),
        ledger: store.clone(),
        frame_source,
        resolver: IdentityResolver::new(config.min_score),
    });

    Ok((Arc::new(orchestrator), store))
}

/// Spawn `workers` OS threads serving requests against `orchestrator`.
///
/// Camera reads and oracle calls block, so they never run on the async
/// runtime. Workers exit once every [`EngineHandle`] is dropped.
pub fn spawn_engine(
    orchestrator: Arc<Orchestrator>,
    store: Arc<SqliteStore>,
    workers: usize,
    timeout: Duration,
) -> std::io::Result<EngineHandle> {
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel::<EngineRequest>(workers * 4);
    let rx = Arc::new(Mutex::new(rx));
    let has_camera = orchestrator.has_frame_source();

    for id in 0..workers {
        let rx = rx.clone();
        let orchestrator = orchestrator.clone();
        let store = store.clone();
        std::thread::Builder::new()
            .name(format!("rollcall-worker-{id}"))
            .spawn(move || {
                tracing::debug!(worker = id, "engine worker started");
                while let Some(req) = next_request(&rx) {
                    handle_request(&orchestrator, store.as_ref(), req);
                }
                tracing::debug!(worker = id, "engine worker exiting");
            })?;
    }

    Ok(EngineHandle {
        tx,
        has_camera,
        timeout,
    })
}

fn next_request(rx: &Mutex<mpsc::Receiver<EngineRequest>>) -> Option<EngineRequest> {
    let mut rx = match rx.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    rx.blocking_recv()
}

fn handle_request(orchestrator: &Orchestrator, ledger: &dyn AttendanceLedger, req: EngineRequest) {
    match req {
        EngineRequest::MarkFromCamera { reply } => {
            let result = orchestrator.capture_and_process().map_err(EngineError::from);
            log_result("camera", &result);
            let _ = reply.send(result);
        }
        EngineRequest::MarkFromFile { path, reply } => {
            let result = load_frame(&path).map(|frame| orchestrator.process(&frame));
            log_result("file", &result);
            let _ = reply.send(result);
        }
        EngineRequest::AttendanceOn { date, reply } => {
            let _ = reply.send(ledger.events_on(date).map_err(EngineError::from));
        }
    }
}

fn load_frame(path: &std::path::Path) -> Result<Frame, EngineError> {
    let bytes = std::fs::read(path)?;
    Ok(Frame::from_encoded(&bytes)?)
}

fn log_result(origin: &str, result: &Result<OutcomeReport, EngineError>) {
    match result {
        Ok(report) => tracing::info!(
            origin,
            summary = ?report.summary,
            faces = report.faces.len(),
            "mark request complete"
        ),
        Err(e) => tracing::warn!(origin, error = %e, "mark request failed"),
    }
}

/// Mark attendance from the camera every `interval` until the engine shuts down.
pub async fn poll_camera(engine: EngineHandle, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::info!(interval_ms = interval.as_millis() as u64, "camera polling started");

    loop {
        ticker.tick().await;
        match engine.mark_from_camera().await {
            Ok(report) => tracing::debug!(summary = ?report.summary, "poll complete"),
            Err(EngineError::ChannelClosed) => break,
            // Already logged by the worker.
            Err(_) => {}
        }
    }
    tracing::info!("camera polling stopped");
}
