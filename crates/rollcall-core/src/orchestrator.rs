//! Resolution orchestrator: one "mark attendance" request end to end.
//!
//! frame → recognition oracle → per-face resolution → per-subject ledger
//! insert → [`OutcomeReport`]. Every failure below this boundary comes back
//! as a report field or an error value; nothing here panics.

use crate::frame::Frame;
use crate::ledger::AttendanceLedger;
use crate::recognizer::RecognitionAdapter;
use crate::resolver::{IdentityResolver, Resolution, SubjectDirectory};
use crate::source::{AcquireError, FrameSource};
use crate::types::{FaceCandidate, FaceOutcome, MarkOutcome, OutcomeReport};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::sync::Arc;

/// Collaborators wired into an [`Orchestrator`] at construction.
#[derive(Clone)]
pub struct PipelineConfig {
    pub recognizer: Arc<dyn RecognitionAdapter>,
    pub directory: Arc<dyn SubjectDirectory>,
    pub ledger: Arc<dyn AttendanceLedger>,
    /// Camera used by [`Orchestrator::acquire_frame`]; `None` for upload-only hosts.
    pub frame_source: Option<Arc<dyn FrameSource>>,
    pub resolver: IdentityResolver,
}

/// Shared by `Arc` across concurrent invocations.
pub struct Orchestrator {
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn has_frame_source(&self) -> bool {
        self.config.frame_source.is_some()
    }

    /// Acquire one frame from the configured camera.
    pub fn acquire_frame(&self) -> Result<Frame, AcquireError> {
        let source = self
            .config
            .frame_source
            .as_ref()
            .ok_or(AcquireError::NotConfigured)?;
        source.acquire()
    }

    /// Acquire a frame and process it.
    pub fn capture_and_process(&self) -> Result<OutcomeReport, AcquireError> {
        let frame = self.acquire_frame()?;
        Ok(self.process(&frame))
    }

    /// Process a frame against the local wall clock.
    pub fn process(&self, frame: &Frame) -> OutcomeReport {
        self.process_at(frame, Local::now().naive_local())
    }

    /// Process a frame as if it arrived at `now`. Every face in the frame is
    /// recorded with the same date and time.
    pub fn process_at(&self, frame: &Frame, now: NaiveDateTime) -> OutcomeReport {
        let faces = match self.config.recognizer.recognize(frame) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "recognition failed; treating frame as faceless");
                return OutcomeReport::adapter_failed(e.to_string());
            }
        };

        if faces.is_empty() {
            tracing::debug!("no face detected");
            return OutcomeReport::no_face_detected();
        }

        let date = now.date();
        let time = now.time().with_nanosecond(0).unwrap_or(now.time());

        let outcomes: Vec<FaceOutcome> = faces
            .iter()
            .enumerate()
            .map(|(idx, face)| self.handle_face(idx, face, date, time))
            .collect();

        let report = OutcomeReport::from_faces(outcomes);
        tracing::info!(
            faces = report.faces.len(),
            summary = ?report.summary,
            %date,
            "attendance processed"
        );
        report
    }

    fn handle_face(
        &self,
        idx: usize,
        face: &FaceCandidate,
        date: NaiveDate,
        time: NaiveTime,
    ) -> FaceOutcome {
        let resolution = match self
            .config
            .resolver
            .resolve(face, self.config.directory.as_ref())
        {
            Ok(resolution) => resolution,
            Err(e) => {
                let key = face.best().map(|c| c.subject_key()).unwrap_or_default();
                tracing::error!(face = idx, subject = %key, error = %e, "subject lookup failed");
                return FaceOutcome::Failed {
                    subject_key: key,
                    reason: e.to_string(),
                };
            }
        };

        let subject = match resolution {
            Resolution::Identified(subject) => subject,
            Resolution::Unregistered(key) => {
                tracing::warn!(face = idx, subject = %key, "matched reference image has no registered subject");
                return FaceOutcome::Unregistered { subject_key: key };
            }
            Resolution::Unknown => {
                tracing::debug!(face = idx, "face matched no known identity");
                return FaceOutcome::Unknown;
            }
        };

        match self.config.ledger.try_mark(&subject.key, date, time) {
            Ok(MarkOutcome::Marked(event)) => {
                tracing::info!(face = idx, subject = %subject.key, %date, %time, "attendance marked");
                FaceOutcome::Marked {
                    subject_key: subject.key,
                    event_id: event.id,
                }
            }
            Ok(MarkOutcome::AlreadyMarked) => {
                tracing::debug!(face = idx, subject = %subject.key, %date, "already marked today");
                FaceOutcome::AlreadyMarked {
                    subject_key: subject.key,
                }
            }
            Err(e) => {
                tracing::error!(face = idx, subject = %subject.key, error = %e, "ledger insert failed");
                FaceOutcome::Failed {
                    subject_key: subject.key,
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelLayout;
    use crate::ledger::LedgerError;
    use crate::recognizer::RecognitionError;
    use crate::resolver::DirectoryError;
    use crate::types::{AttendanceEvent, Candidate, FaceStatus, Subject, Summary};
    use chrono::Utc;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted(Result<Vec<FaceCandidate>, String>);

    impl RecognitionAdapter for Scripted {
        fn recognize(&self, _frame: &Frame) -> Result<Vec<FaceCandidate>, RecognitionError> {
            self.0.clone().map_err(RecognitionError::Unavailable)
        }
    }

    struct Directory(HashSet<String>);

    impl SubjectDirectory for Directory {
        fn find_by_key(&self, key: &str) -> Result<Option<Subject>, DirectoryError> {
            Ok(self.0.contains(key).then(|| Subject {
                key: key.to_string(),
                roll_no: None,
                course: "cs".into(),
                batch: "a".into(),
                lecture: None,
                image_path: format!("images/{key}.jpg"),
                created_at: Utc::now(),
            }))
        }
    }

    #[derive(Default)]
    struct MemoryLedger {
        events: Mutex<HashMap<(String, NaiveDate), AttendanceEvent>>,
        calls: AtomicUsize,
        fail_for: Option<String>,
    }

    impl AttendanceLedger for MemoryLedger {
        fn try_mark(&self, key: &str, date: NaiveDate, time: NaiveTime) -> Result<MarkOutcome, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_for.as_deref() == Some(key) {
                return Err(LedgerError::Storage("disk I/O error".into()));
            }
            let mut events = self.events.lock().unwrap();
            if events.contains_key(&(key.to_string(), date)) {
                return Ok(MarkOutcome::AlreadyMarked);
            }
            let event = AttendanceEvent {
                id: format!("{key}-{date}"),
                subject_key: key.to_string(),
                date,
                time,
            };
            events.insert((key.to_string(), date), event.clone());
            Ok(MarkOutcome::Marked(event))
        }

        fn is_marked(&self, key: &str, date: NaiveDate) -> Result<bool, LedgerError> {
            Ok(self.events.lock().unwrap().contains_key(&(key.to_string(), date)))
        }

        fn events_on(&self, date: NaiveDate) -> Result<Vec<AttendanceEvent>, LedgerError> {
            Ok(self.events.lock().unwrap().values().filter(|e| e.date == date).cloned().collect())
        }
    }

    fn one_face(identity: &str) -> FaceCandidate {
        FaceCandidate::new(vec![Candidate::new(identity, 0.9)])
    }

    fn frame() -> Frame {
        Frame::new(vec![100u8; 4], 2, 2, PixelLayout::Gray8).unwrap()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().and_hms_milli_opt(9, 15, 30, 250).unwrap()
    }

    fn orchestrator(
        faces: Result<Vec<FaceCandidate>, String>,
        registered: &[&str],
        ledger: Arc<MemoryLedger>,
    ) -> Orchestrator {
        Orchestrator::new(PipelineConfig {
            recognizer: Arc::new(Scripted(faces)),
            directory: Arc::new(Directory(registered.iter().map(|s| s.to_string()).collect())),
            ledger,
            frame_source: None,
            resolver: IdentityResolver::default(),
        })
    }

    #[test]
    fn test_marks_then_already_marked() {
        let ledger = Arc::new(MemoryLedger::default());
        let orch = orchestrator(Ok(vec![one_face("images/alice.jpg")]), &["alice"], ledger.clone());

        let first = orch.process_at(&frame(), now());
        assert_eq!(first.statuses(), vec![FaceStatus::Marked]);
        assert_eq!(first.faces[0].subject_key(), Some("alice"));
        assert_eq!(first.summary, Summary::Marked);

        let second = orch.process_at(&frame(), now());
        assert_eq!(
            second.faces,
            vec![FaceOutcome::AlreadyMarked { subject_key: "alice".into() }]
        );
        assert_eq!(second.summary, Summary::AlreadyMarked);
    }

    #[test]
    fn test_time_truncated_to_seconds() {
        let ledger = Arc::new(MemoryLedger::default());
        let orch = orchestrator(Ok(vec![one_face("alice")]), &["alice"], ledger.clone());
        orch.process_at(&frame(), now());

        let events = ledger.events_on(now().date()).unwrap();
        assert_eq!(events[0].time, NaiveTime::from_hms_opt(9, 15, 30).unwrap());
    }

    #[test]
    fn test_no_faces() {
        let ledger = Arc::new(MemoryLedger::default());
        let orch = orchestrator(Ok(vec![]), &["alice"], ledger.clone());
        let report = orch.process_at(&frame(), now());
        assert!(report.faces.is_empty());
        assert_eq!(report.summary, Summary::NoFaceDetected);
        assert!(report.adapter_error.is_none());
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_adapter_failure_is_reported_not_silent() {
        let ledger = Arc::new(MemoryLedger::default());
        let orch = orchestrator(Err("connection refused".into()), &["alice"], ledger.clone());
        let report = orch.process_at(&frame(), now());
        assert!(report.faces.is_empty());
        assert_eq!(report.summary, Summary::NoFaceDetected);
        assert!(report.adapter_error.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_mixed_registered_and_unregistered() {
        let ledger = Arc::new(MemoryLedger::default());
        let orch = orchestrator(
            Ok(vec![one_face("images/bob.jpg"), one_face("images/stranger.jpg")]),
            &["bob"],
            ledger.clone(),
        );
        let report = orch.process_at(&frame(), now());
        assert_eq!(report.statuses(), vec![FaceStatus::Marked, FaceStatus::Unregistered]);
        assert_eq!(report.faces[1].subject_key(), Some("stranger"));
        assert_eq!(report.summary, Summary::Unregistered);
        // Ledger only consulted for bob.
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);
        assert!(!ledger.is_marked("stranger", now().date()).unwrap());
    }

    #[test]
    fn test_duplicate_face_in_one_frame() {
        let ledger = Arc::new(MemoryLedger::default());
        let orch = orchestrator(
            Ok(vec![one_face("alice"), one_face("images/alice.png")]),
            &["alice"],
            ledger.clone(),
        );
        let report = orch.process_at(&frame(), now());
        assert_eq!(report.statuses(), vec![FaceStatus::Marked, FaceStatus::AlreadyMarked]);
        assert_eq!(ledger.events_on(now().date()).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_face_alongside_marked() {
        let ledger = Arc::new(MemoryLedger::default());
        let orch = orchestrator(
            Ok(vec![FaceCandidate::default(), one_face("alice")]),
            &["alice"],
            ledger,
        );
        let report = orch.process_at(&frame(), now());
        assert_eq!(report.statuses(), vec![FaceStatus::Unknown, FaceStatus::Marked]);
        assert_eq!(report.summary, Summary::Marked);
    }

    #[test]
    fn test_ledger_failure_isolated_to_face() {
        let ledger = Arc::new(MemoryLedger {
            fail_for: Some("bob".into()),
            ..Default::default()
        });
        let orch = orchestrator(Ok(vec![one_face("bob"), one_face("alice")]), &["alice", "bob"], ledger);
        let report = orch.process_at(&frame(), now());
        assert_eq!(report.statuses(), vec![FaceStatus::Failed, FaceStatus::Marked]);
    }

    #[test]
    fn test_acquire_without_source() {
        let orch = orchestrator(Ok(vec![]), &[], Arc::new(MemoryLedger::default()));
        assert_eq!(orch.acquire_frame().unwrap_err(), AcquireError::NotConfigured);
        assert!(orch.capture_and_process().is_err());
    }

    #[test]
    fn test_concurrent_invocations_mark_once() {
        let ledger = Arc::new(MemoryLedger::default());
        let orch = Arc::new(orchestrator(Ok(vec![one_face("alice")]), &["alice"], ledger.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let orch = Arc::clone(&orch);
                std::thread::spawn(move || orch.process_at(&frame(), now()))
            })
            .collect();
        let reports: Vec<OutcomeReport> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let marked = reports.iter().filter(|r| r.summary == Summary::Marked).count();
        assert_eq!(marked, 1);
        assert_eq!(ledger.events_on(now().date()).unwrap().len(), 1);
    }
}
