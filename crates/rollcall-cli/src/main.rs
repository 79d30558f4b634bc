use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use rollcall_core::{
    Frame, FrameSource, IdentityResolver, NewSubject, Orchestrator, OutcomeReport, PipelineConfig,
};
use rollcall_hw::{Camera, CameraSettings};
use rollcall_oracle::HttpRecognizer;
use rollcall_store::SqliteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance CLI")]
struct Cli {
    /// Attendance database
    #[arg(long, global = true, env = "ROLLCALL_DB_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a subject
    Register {
        /// Subject key; must match the key (or reference image file stem) the oracle reports
        key: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        batch: String,
        #[arg(long)]
        roll_no: Option<String>,
        #[arg(long)]
        lecture: Option<String>,
        /// Reference image for this subject
        #[arg(long)]
        image: PathBuf,
    },
    /// Replace a subject's reference image
    SetImage { key: String, image: PathBuf },
    /// List registered subjects
    Subjects {
        #[arg(long)]
        json: bool,
    },
    /// Show attendance for a day
    Attendance {
        /// YYYY-MM-DD; defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Mark attendance from an image file or the camera
    Mark(MarkArgs),
    /// Capture one frame and report on it (bypasses the oracle)
    CameraTest {
        #[arg(long, env = "ROLLCALL_CAMERA", default_value = "/dev/video0")]
        camera: String,
        /// Write the captured frame as JPEG
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[derive(Args)]
struct MarkArgs {
    #[command(flatten)]
    input: MarkInput,

    #[arg(long, env = "ROLLCALL_RECOGNIZER_URL", default_value = "http://127.0.0.1:5005/recognize")]
    oracle: String,
    #[arg(long, env = "ROLLCALL_RECOGNIZER_TIMEOUT_SECS", default_value_t = 10)]
    oracle_timeout: u64,
    /// Minimum score for the top candidate to count as a match
    #[arg(long, env = "ROLLCALL_MIN_SCORE")]
    min_score: Option<f32>,
    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct MarkInput {
    /// Image file to process
    #[arg(long)]
    image: Option<PathBuf>,
    /// Capture from this camera endpoint (device path, index or snapshot URL)
    #[arg(long, num_args = 0..=1, default_missing_value = "/dev/video0")]
    camera: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(rollcall_store::default_db_path);

    match cli.command {
        Commands::Register {
            key,
            course,
            batch,
            roll_no,
            lecture,
            image,
        } => {
            let store = open_store(&db_path)?;
            let image_path = checked_image(&image)?;
            let subject = store.register_subject(&NewSubject {
                key,
                roll_no,
                course,
                batch,
                lecture,
                image_path,
            })?;
            println!("Registered {} ({} / {})", subject.key, subject.course, subject.batch);
        }
        Commands::SetImage { key, image } => {
            let store = open_store(&db_path)?;
            let image_path = checked_image(&image)?;
            store.set_reference_image(&key, &image_path)?;
            println!("Updated reference image for {key}");
        }
        Commands::Subjects { json } => {
            let subjects = open_store(&db_path)?.list_subjects()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&subjects)?);
            } else if subjects.is_empty() {
                println!("No subjects registered");
            } else {
                for s in &subjects {
                    println!(
                        "{:<20} {:<10} {:<12} {:<10} {}",
                        s.key,
                        s.roll_no.as_deref().unwrap_or("-"),
                        s.course,
                        s.batch,
                        s.image_path
                    );
                }
            }
        }
        Commands::Attendance { date, json } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let events = open_store(&db_path)?.attendance_on(date)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("No attendance recorded on {date}");
            } else {
                for e in &events {
                    println!("{}  {}", e.time, e.subject_key);
                }
            }
        }
        Commands::Mark(args) => {
            let report = run_mark(&db_path, &args)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.message);
            }
        }
        Commands::CameraTest { camera, save } => camera_test(&camera, save.as_deref())?,
    }

    Ok(())
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path).with_context(|| format!("opening database {}", path.display()))
}

fn checked_image(path: &Path) -> Result<String> {
    if !path.is_file() {
        bail!("reference image not found: {}", path.display());
    }
    Ok(path.display().to_string())
}

fn run_mark(db_path: &Path, args: &MarkArgs) -> Result<OutcomeReport> {
    let store = Arc::new(open_store(db_path)?);
    let recognizer = HttpRecognizer::new(&args.oracle, Duration::from_secs(args.oracle_timeout))?;
    tracing::debug!(db = %db_path.display(), oracle = %recognizer.url(), "mark pipeline ready");

    let frame_source: Option<Arc<dyn FrameSource>> = match &args.input.camera {
        Some(endpoint) => Some(Arc::new(Camera::from_endpoint(endpoint, CameraSettings::default())?)),
        None => None,
    };

    let orchestrator = Orchestrator::new(PipelineConfig {
        recognizer: Arc::new(recognizer),
        directory: store.clone(),
        ledger: store,
        frame_source,
        resolver: IdentityResolver::new(args.min_score),
    });

    match &args.input.image {
        Some(path) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let frame = Frame::from_encoded(&bytes)?;
            Ok(orchestrator.process(&frame))
        }
        None => Ok(orchestrator.capture_and_process()?),
    }
}

fn camera_test(endpoint: &str, save: Option<&Path>) -> Result<()> {
    println!("Opening {endpoint}...");
    let camera = Camera::from_endpoint(endpoint, CameraSettings::default())?;
    let frame = camera.acquire()?;

    println!(
        "Captured {}x{} {:?} frame, avg brightness {:.1}",
        frame.width,
        frame.height,
        frame.layout,
        frame.avg_brightness()
    );

    if let Some(path) = save {
        std::fs::write(path, frame.to_jpeg()?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}
