//! rollcall-core: Attendance resolution and idempotent ledger pipeline.
//!
//! Turns recognition-oracle candidates into per-face attendance decisions and
//! commits them under a "first write wins per subject per day" rule. Storage,
//! camera and oracle implementations live in sibling crates behind the traits
//! defined here.

pub mod frame;
pub mod ledger;
pub mod orchestrator;
pub mod recognizer;
pub mod resolver;
pub mod source;
pub mod types;

pub use frame::{Frame, FrameError, PixelLayout};
pub use ledger::{AttendanceLedger, LedgerError};
pub use orchestrator::{Orchestrator, PipelineConfig};
pub use recognizer::{RecognitionAdapter, RecognitionError};
pub use resolver::{DirectoryError, IdentityResolver, Resolution, SubjectDirectory};
pub use source::{AcquireError, FrameSource};
pub use types::{
    AttendanceEvent, Candidate, FaceCandidate, FaceOutcome, FaceStatus, MarkOutcome, NewSubject,
    OutcomeReport, Subject, Summary,
};
