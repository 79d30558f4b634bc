//! Attendance ledger contract.

use crate::types::{AttendanceEvent, MarkOutcome};
use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger storage failed: {0}")]
    Storage(String),
    #[error("unknown subject: {0}")]
    UnknownSubject(String),
}

/// Durable store holding at most one attendance event per (subject, date).
///
/// `try_mark` is atomic: for a given key and date exactly one call across the
/// ledger's lifetime returns [`MarkOutcome::Marked`], every other call
/// (sequential or racing) returns [`MarkOutcome::AlreadyMarked`]. A storage
/// conflict on the (subject, date) pair is reported as `AlreadyMarked`, not as
/// an error.
pub trait AttendanceLedger: Send + Sync {
    fn try_mark(
        &self,
        subject_key: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<MarkOutcome, LedgerError>;

    fn is_marked(&self, subject_key: &str, date: NaiveDate) -> Result<bool, LedgerError>;

    /// Events recorded on `date`, ordered by time then subject key.
    fn events_on(&self, date: NaiveDate) -> Result<Vec<AttendanceEvent>, LedgerError>;
}
