//! Versioned schema, tracked with `PRAGMA user_version`.

use rusqlite::Connection;

/// Each entry upgrades the schema from version `i` to `i + 1`.
const MIGRATIONS: &[&str] = &[
    // v1: subjects and the attendance ledger. UNIQUE (subject_key, date) is
    // what makes marking idempotent across connections and processes.
    "CREATE TABLE subjects (
        key         TEXT PRIMARY KEY NOT NULL,
        roll_no     TEXT UNIQUE,
        course      TEXT NOT NULL,
        batch       TEXT NOT NULL,
        lecture     TEXT,
        image_path  TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );
    CREATE TABLE attendance (
        id          TEXT PRIMARY KEY NOT NULL,
        subject_key TEXT NOT NULL REFERENCES subjects(key),
        date        TEXT NOT NULL,
        time        TEXT NOT NULL,
        UNIQUE (subject_key, date)
    );
    CREATE INDEX idx_attendance_date ON attendance(date);",
];

pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

pub fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Apply every migration newer than the database's `user_version`.
pub fn apply_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let current = current_version(conn)?;
    for (idx, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = idx as u32 + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::info!(version, "applied schema migration");
    }
    Ok(())
}
