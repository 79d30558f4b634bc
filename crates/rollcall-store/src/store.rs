//! SQLite-backed subject directory and attendance ledger.

use crate::schema::apply_migrations;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rollcall_core::{
    AttendanceEvent, AttendanceLedger, DirectoryError, LedgerError, MarkOutcome, NewSubject,
    Subject, SubjectDirectory,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("subject already registered: {0}")]
    DuplicateSubject(String),
    #[error("subject not found: {0}")]
    SubjectNotFound(String),
    #[error("invalid subject: {0}")]
    InvalidSubject(String),
}

/// One SQLite connection behind a mutex.
///
/// The mutex only serializes this process's callers; the
/// `UNIQUE (subject_key, date)` constraint is what guarantees a single mark
/// per subject per day, including across processes sharing the file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::bootstrap(&mut conn)?;
        tracing::info!(path = %path.display(), "attendance database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        Self::bootstrap(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn bootstrap(conn: &mut Connection) -> Result<(), StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        apply_migrations(conn)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panicking holder cannot leave the connection half-written: every
        // write is a single statement.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register_subject(&self, new: &NewSubject) -> Result<Subject, StoreError> {
        let key = new.key.trim();
        if key.is_empty() {
            return Err(StoreError::InvalidSubject("key must not be empty".into()));
        }
        if new.image_path.trim().is_empty() {
            return Err(StoreError::InvalidSubject(format!("{key}: reference image path is empty")));
        }
        let roll_no = new.roll_no.as_deref().map(str::trim).filter(|r| !r.is_empty());

        let subject = Subject {
            key: key.to_string(),
            roll_no: roll_no.map(str::to_string),
            course: new.course.trim().to_string(),
            batch: new.batch.trim().to_string(),
            lecture: new.lecture.clone(),
            image_path: new.image_path.clone(),
            created_at: Utc::now(),
        };

        let inserted = self.conn().execute(
            "INSERT INTO subjects (key, roll_no, course, batch, lecture, image_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                subject.key,
                subject.roll_no,
                subject.course,
                subject.batch,
                subject.lecture,
                subject.image_path,
                subject.created_at.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => {
                tracing::info!(subject = %subject.key, "subject registered");
                Ok(subject)
            }
            Err(e) if is_unique_violation(&e) || is_primary_key_violation(&e) => {
                Err(StoreError::DuplicateSubject(subject.key))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Point a subject at a new reference image. The only permitted mutation.
    pub fn set_reference_image(&self, key: &str, image_path: &str) -> Result<(), StoreError> {
        let changed = self.conn().execute(
            "UPDATE subjects SET image_path = ?2 WHERE key = ?1",
            params![key, image_path],
        )?;
        if changed == 0 {
            return Err(StoreError::SubjectNotFound(key.to_string()));
        }
        tracing::info!(subject = key, image_path, "reference image reassigned");
        Ok(())
    }

    pub fn subject(&self, key: &str) -> Result<Option<Subject>, StoreError> {
        let subject = self
            .conn()
            .query_row(
                "SELECT key, roll_no, course, batch, lecture, image_path, created_at
                 FROM subjects WHERE key = ?1",
                params![key],
                subject_from_row,
            )
            .optional()?;
        Ok(subject)
    }

    pub fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, roll_no, course, batch, lecture, image_path, created_at
             FROM subjects ORDER BY key",
        )?;
        let subjects = stmt
            .query_map([], subject_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subjects)
    }

    pub fn mark(
        &self,
        subject_key: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<MarkOutcome, StoreError> {
        let event = AttendanceEvent {
            id: Uuid::new_v4().to_string(),
            subject_key: subject_key.to_string(),
            date,
            time,
        };

        // Insert directly: the unique constraint decides who was first.
        let inserted = self.conn().execute(
            "INSERT INTO attendance (id, subject_key, date, time) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.id,
                event.subject_key,
                date.format(DATE_FORMAT).to_string(),
                time.format(TIME_FORMAT).to_string(),
            ],
        );

        match inserted {
            Ok(_) => Ok(MarkOutcome::Marked(event)),
            Err(e) if is_unique_violation(&e) => Ok(MarkOutcome::AlreadyMarked),
            Err(e) if is_foreign_key_violation(&e) => {
                Err(StoreError::SubjectNotFound(subject_key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn marked_on(&self, subject_key: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM attendance WHERE subject_key = ?1 AND date = ?2",
                params![subject_key, date.format(DATE_FORMAT).to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn attendance_on(&self, date: NaiveDate) -> Result<Vec<AttendanceEvent>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, subject_key, date, time FROM attendance
             WHERE date = ?1 ORDER BY time, subject_key",
        )?;
        let events = stmt
            .query_map(params![date.format(DATE_FORMAT).to_string()], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

impl SubjectDirectory for SqliteStore {
    fn find_by_key(&self, key: &str) -> Result<Option<Subject>, DirectoryError> {
        self.subject(key).map_err(|e| DirectoryError(e.to_string()))
    }
}

impl AttendanceLedger for SqliteStore {
    fn try_mark(
        &self,
        subject_key: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<MarkOutcome, LedgerError> {
        self.mark(subject_key, date, time).map_err(into_ledger_error)
    }

    fn is_marked(&self, subject_key: &str, date: NaiveDate) -> Result<bool, LedgerError> {
        self.marked_on(subject_key, date).map_err(into_ledger_error)
    }

    fn events_on(&self, date: NaiveDate) -> Result<Vec<AttendanceEvent>, LedgerError> {
        self.attendance_on(date).map_err(into_ledger_error)
    }
}

fn into_ledger_error(e: StoreError) -> LedgerError {
    match e {
        StoreError::SubjectNotFound(key) => LedgerError::UnknownSubject(key),
        other => LedgerError::Storage(other.to_string()),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn is_primary_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    let created_at: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| conversion_error(6, e))?
        .with_timezone(&Utc);
    Ok(Subject {
        key: row.get(0)?,
        roll_no: row.get(1)?,
        course: row.get(2)?,
        batch: row.get(3)?,
        lecture: row.get(4)?,
        image_path: row.get(5)?,
        created_at,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceEvent> {
    let date: String = row.get(2)?;
    let time: String = row.get(3)?;
    Ok(AttendanceEvent {
        id: row.get(0)?,
        subject_key: row.get(1)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| conversion_error(2, e))?,
        time: NaiveTime::parse_from_str(&time, TIME_FORMAT).map_err(|e| conversion_error(3, e))?,
    })
}
