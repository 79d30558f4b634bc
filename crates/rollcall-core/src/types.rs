use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A person eligible for attendance, identified by a unique natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Natural key (the subject's name). Unique across the directory.
    pub key: String,
    pub roll_no: Option<String>,
    pub course: String,
    pub batch: String,
    pub lecture: Option<String>,
    /// Reference image the recognition oracle matches against.
    pub image_path: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when registering a subject.
#[derive(Debug, Clone, Default)]
pub struct NewSubject {
    pub key: String,
    pub roll_no: Option<String>,
    pub course: String,
    pub batch: String,
    pub lecture: Option<String>,
    pub image_path: String,
}

/// "Subject S was present on date D at time T."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: String,
    pub subject_key: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// One ranked identity proposed by the recognition oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// A bare subject key or the path of the matched reference image.
    pub identity: String,
    /// Similarity score reported by the oracle; higher is a closer match.
    pub score: f32,
}

impl Candidate {
    pub fn new(identity: impl Into<String>, score: f32) -> Self {
        Self {
            identity: identity.into(),
            score,
        }
    }

    /// Natural key of the subject this candidate names.
    ///
    /// Reference images are stored as `<key>.<ext>`, so a path-like identity
    /// maps to its file stem (`images/alice.jpg` → `alice`). Anything else is
    /// already a key and is only trimmed; keys may contain dots.
    pub fn subject_key(&self) -> String {
        let trimmed = self.identity.trim();
        if !looks_like_image_path(trimmed) {
            return trimmed.to_string();
        }
        Path::new(trimmed)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::trim)
            .unwrap_or(trimmed)
            .to_string()
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

fn looks_like_image_path(identity: &str) -> bool {
    if identity.contains('/') || identity.contains('\\') {
        return true;
    }
    Path::new(identity)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// One detected face and its candidates, best match first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceCandidate {
    pub candidates: Vec<Candidate>,
}

impl FaceCandidate {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    /// The oracle's top-ranked candidate, if the face matched anything.
    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

/// Result of a single ledger insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked(AttendanceEvent),
    AlreadyMarked,
}

/// Per-face decision produced by one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FaceOutcome {
    Marked { subject_key: String, event_id: String },
    AlreadyMarked { subject_key: String },
    Unregistered { subject_key: String },
    Unknown,
    /// Storage fault while handling this face; other faces are unaffected.
    Failed { subject_key: String, reason: String },
}

impl FaceOutcome {
    pub fn status(&self) -> FaceStatus {
        match self {
            FaceOutcome::Marked { .. } => FaceStatus::Marked,
            FaceOutcome::AlreadyMarked { .. } => FaceStatus::AlreadyMarked,
            FaceOutcome::Unregistered { .. } => FaceStatus::Unregistered,
            FaceOutcome::Unknown => FaceStatus::Unknown,
            FaceOutcome::Failed { .. } => FaceStatus::Failed,
        }
    }

    pub fn subject_key(&self) -> Option<&str> {
        match self {
            FaceOutcome::Marked { subject_key, .. }
            | FaceOutcome::AlreadyMarked { subject_key }
            | FaceOutcome::Unregistered { subject_key }
            | FaceOutcome::Failed { subject_key, .. } => Some(subject_key),
            FaceOutcome::Unknown => None,
        }
    }
}

/// Payload-free tag of a [`FaceOutcome`], convenient for assertions and counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceStatus {
    Marked,
    AlreadyMarked,
    Unregistered,
    Unknown,
    Failed,
}

/// Top-level classification of a report, chosen by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Summary {
    NoFaceDetected,
    NoKnownFace,
    Unregistered,
    AlreadyMarked,
    Marked,
    Failed,
}

/// Everything one `process` invocation decided, in face order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub faces: Vec<FaceOutcome>,
    pub summary: Summary,
    pub message: String,
    /// Set when the recognition oracle failed and the frame was treated as faceless.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_error: Option<String>,
}

impl OutcomeReport {
    /// Build a report, deriving the summary and message from the outcomes.
    pub fn from_faces(faces: Vec<FaceOutcome>) -> Self {
        let summary = summarize(&faces);
        let message = render_message(summary, &faces);
        Self {
            faces,
            summary,
            message,
            adapter_error: None,
        }
    }

    pub fn no_face_detected() -> Self {
        Self::from_faces(Vec::new())
    }

    pub fn adapter_failed(error: impl Into<String>) -> Self {
        let error = error.into();
        let mut report = Self::no_face_detected();
        report.message = format!("no face detected (recognition failed: {error})");
        report.adapter_error = Some(error);
        report
    }

    pub fn statuses(&self) -> Vec<FaceStatus> {
        self.faces.iter().map(FaceOutcome::status).collect()
    }
}

/// Priority: unregistered, then already-marked, then newly marked, then failures.
pub fn summarize(faces: &[FaceOutcome]) -> Summary {
    if faces.is_empty() {
        return Summary::NoFaceDetected;
    }
    let any = |status: FaceStatus| faces.iter().any(|f| f.status() == status);

    if any(FaceStatus::Unregistered) {
        Summary::Unregistered
    } else if any(FaceStatus::AlreadyMarked) {
        Summary::AlreadyMarked
    } else if any(FaceStatus::Marked) {
        Summary::Marked
    } else if any(FaceStatus::Failed) {
        Summary::Failed
    } else {
        Summary::NoKnownFace
    }
}

fn keys_with(faces: &[FaceOutcome], status: FaceStatus) -> String {
    faces
        .iter()
        .filter(|f| f.status() == status)
        .filter_map(FaceOutcome::subject_key)
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_message(summary: Summary, faces: &[FaceOutcome]) -> String {
    match summary {
        Summary::NoFaceDetected => "no face detected".to_string(),
        Summary::NoKnownFace => "no known face detected".to_string(),
        Summary::Unregistered => format!(
            "not registered: {}",
            keys_with(faces, FaceStatus::Unregistered)
        ),
        Summary::AlreadyMarked => format!(
            "already marked today: {}",
            keys_with(faces, FaceStatus::AlreadyMarked)
        ),
        Summary::Marked => format!(
            "attendance marked: {}",
            keys_with(faces, FaceStatus::Marked)
        ),
        Summary::Failed => format!(
            "could not record attendance: {}",
            keys_with(faces, FaceStatus::Failed)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marked(key: &str) -> FaceOutcome {
        FaceOutcome::Marked { subject_key: key.into(), event_id: "e".into() }
    }

    #[test]
    fn test_subject_key_from_reference_path() {
        assert_eq!(Candidate::new("images/alice.jpg", 0.9).subject_key(), "alice");
        assert_eq!(Candidate::new("/srv/faces/Bob Smith.png", 0.9).subject_key(), "Bob Smith");
    }

    #[test]
    fn test_subject_key_bare() {
        assert_eq!(Candidate::new("carol", 0.5).subject_key(), "carol");
        assert_eq!(Candidate::new("  dave  ", 0.5).subject_key(), "dave");
    }

    #[test]
    fn test_subject_key_keeps_dots_in_bare_keys() {
        assert_eq!(Candidate::new("A. Kumar", 0.9).subject_key(), "A. Kumar");
        assert_eq!(Candidate::new("j.doe", 0.9).subject_key(), "j.doe");
    }

    #[test]
    fn test_subject_key_dotted_name_in_path() {
        assert_eq!(Candidate::new("images/A. Kumar.jpg", 0.9).subject_key(), "A. Kumar");
        assert_eq!(Candidate::new("A. Kumar.JPEG", 0.9).subject_key(), "A. Kumar");
    }

    #[test]
    fn test_summary_empty_is_no_face() {
        assert_eq!(summarize(&[]), Summary::NoFaceDetected);
    }

    #[test]
    fn test_summary_unregistered_wins() {
        let faces = vec![
            marked("bob"),
            FaceOutcome::AlreadyMarked { subject_key: "alice".into() },
            FaceOutcome::Unregistered { subject_key: "ghost".into() },
        ];
        assert_eq!(summarize(&faces), Summary::Unregistered);
    }

    #[test]
    fn test_summary_already_marked_beats_marked() {
        let faces = vec![marked("bob"), FaceOutcome::AlreadyMarked { subject_key: "alice".into() }];
        assert_eq!(summarize(&faces), Summary::AlreadyMarked);
    }

    #[test]
    fn test_summary_all_unknown() {
        assert_eq!(summarize(&[FaceOutcome::Unknown, FaceOutcome::Unknown]), Summary::NoKnownFace);
    }

    #[test]
    fn test_summary_failed_only_when_nothing_else() {
        let failed = FaceOutcome::Failed { subject_key: "x".into(), reason: "disk".into() };
        assert_eq!(summarize(&[FaceOutcome::Unknown, failed.clone()]), Summary::Failed);
        assert_eq!(summarize(&[failed, marked("y")]), Summary::Marked);
    }

    #[test]
    fn test_report_message_lists_keys() {
        let report = OutcomeReport::from_faces(vec![marked("alice"), marked("bob")]);
        assert_eq!(report.message, "attendance marked: alice, bob");
    }

    #[test]
    fn test_adapter_failed_report() {
        let report = OutcomeReport::adapter_failed("timeout");
        assert!(report.faces.is_empty());
        assert_eq!(report.summary, Summary::NoFaceDetected);
        assert_eq!(report.adapter_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(FaceOutcome::Unregistered { subject_key: "ghost".into() }).unwrap();
        assert_eq!(json["status"], "unregistered");
        assert_eq!(json["subject_key"], "ghost");
    }
}
