use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;

/// Handle to the workspace database. Hands out one connection per operation
/// so callers on different threads never share a `Connection`.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Store {
    pub fn open(workspace: &Path, config: &Config) -> anyhow::Result<Store> {
        std::fs::create_dir_all(workspace).with_context(|| {
            format!("failed to create workspace {}", workspace.to_string_lossy())
        })?;
        let store = Store {
            path: workspace.join(&config.db_file_name),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        };
        let conn = store
            .connect()
            .with_context(|| format!("failed to open {}", store.path.to_string_lossy()))?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
        create_schema(&conn).context("failed to create schema")?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(conn)
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction. The reserved lock is
    /// taken up front, so a read-then-write inside `f` cannot interleave with
    /// another writer. Commits only when `f` returns `Ok`.
    pub fn write<T, E>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&*tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn read<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let conn = self.connect()?;
        f(&conn)
    }
}

fn create_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS section_teachers(
            section_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            PRIMARY KEY(section_id, user_id),
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_section_teachers_user ON section_teachers(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL,
            slot_id TEXT,
            teacher_id TEXT NOT NULL,
            secret_seed TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('active', 'completed', 'cancelled')),
            started_at TEXT NOT NULL,
            ended_at TEXT,
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;
    // One active session per teacher, enforced by the store itself.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_active_teacher
         ON sessions(teacher_id) WHERE status = 'active'",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_status_started ON sessions(status, started_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_teacher_started ON sessions(teacher_id, started_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            checked_in_at TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('pending', 'confirmed', 'rejected')),
            confirmed_at TEXT,
            hash TEXT NOT NULL,
            prev_hash TEXT,
            FOREIGN KEY(session_id) REFERENCES sessions(id),
            UNIQUE(session_id, student_id),
            UNIQUE(student_id, seq)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student_chain
         ON attendance_records(student_id, checked_in_at, seq)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_session ON attendance_records(session_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_status ON attendance_records(status, student_id)",
        [],
    )?;
    Ok(())
}

/// ISO-8601 UTC with milliseconds and a `Z` suffix. Hashed verbatim.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub fn parse_opt_ts(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}
