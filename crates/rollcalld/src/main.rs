use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load()?;
    tracing::debug!(?config, "configuration loaded");

    // Built outside the runtime: the blocking HTTP clients own their own
    // runtimes and must not be created or dropped inside an async context.
    let (orchestrator, store) = engine::build_pipeline(&config)?;
    let workers = std::thread::available_parallelism().map_or(2, |n| n.get().min(4));
    let engine = engine::spawn_engine(orchestrator, store, workers, config.request_timeout())?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(serve(&config, engine));
    drop(runtime);

    tracing::info!("rollcalld stopped");
    result
}

async fn serve(config: &Config, engine: engine::EngineHandle) -> Result<()> {
    let service = AttendanceService::new(
        engine.clone(),
        config.camera.clone(),
        config.recognizer_url.clone(),
    );

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;
    tracing::info!(bus = ?config.bus, name = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    let poller = match config.poll_interval() {
        Some(interval) if engine.has_camera() => {
            Some(tokio::spawn(engine::poll_camera(engine.clone(), interval)))
        }
        Some(_) => {
            tracing::warn!("poll interval set but no camera available; polling disabled");
            None
        }
        None => None,
    };
    drop(engine);

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    if let Some(poller) = poller {
        poller.abort();
    }
    Ok(())
}
