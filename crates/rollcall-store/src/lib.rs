//! rollcall-store: SQLite persistence for subjects and attendance.

pub mod schema;
pub mod store;

pub use store::{SqliteStore, StoreError};

use std::path::PathBuf;

/// `$XDG_DATA_HOME/rollcall/attendance.db`, falling back to `~/.local/share`.
pub fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("attendance.db")
}
