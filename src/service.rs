//! The operations offered to collaborators (an HTTP layer, the IPC sidecar).
//!
//! `AttendanceService` is `Send + Sync`; share it behind an `Arc` and call it
//! from as many threads as needed.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::checkin;
use crate::clock::{Clock, SystemClock};
use crate::code;
use crate::config::Config;
use crate::db::Store;
use crate::directory::{self, Actor, TeacherAssignment};
use crate::error::{AttendanceError, Result};
use crate::ledger::{self, AttendanceRecord, ChainVerification, RecordStatus, Settlement};
use crate::progress::{self, HistoryEntry, Progress, Stats};
use crate::session::{self, Session, SessionStatus, SessionSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub session_id: String,
    pub section: String,
    pub code: String,
    pub seconds_until_rotate: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub student_id: String,
    pub status: RecordStatus,
    pub checked_in_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveCode {
    pub session_id: String,
    pub section: String,
    pub code: String,
    pub seconds_until_rotate: u32,
    pub status: SessionStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub roster: Vec<RosterEntry>,
    pub student_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinReceipt {
    pub session_id: String,
    pub session_name: String,
    pub status: RecordStatus,
    pub checked_in_at: chrono::DateTime<chrono::Utc>,
    pub progress: Progress,
}

pub struct AttendanceService {
    store: Store,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl AttendanceService {
    pub fn new(store: Store, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Loads `rollcall.json` (if any) and opens the workspace database.
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let config = Config::load(workspace)?;
        let store = Store::open(workspace, &config)?;
        Ok(Self::new(store, Arc::new(SystemClock), config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn section_label(conn: &rusqlite::Connection, section_id: &str) -> Result<String> {
        Ok(directory::section_name(conn, section_id)?.unwrap_or_else(|| section_id.to_string()))
    }

    pub fn start_session(
        &self,
        actor: &Actor,
        section_id: &str,
        slot_id: Option<&str>,
    ) -> Result<StartedSession> {
        let now = self.clock.now();
        let session = self
            .store
            .write(|conn| session::start(conn, actor, section_id, slot_id, now))?;
        let section = self.store.read(|conn| Self::section_label(conn, section_id))?;
        let now_ms = now.timestamp_millis();
        Ok(StartedSession {
            session_id: session.id.clone(),
            section,
            code: code::generate(&session.secret, now_ms),
            seconds_until_rotate: code::seconds_until_rotate(now_ms),
            started_at: session.started_at,
        })
    }

    /// Current code plus the roster so far. Safe to poll.
    pub fn live_code(&self, session_id: &str, actor: &Actor) -> Result<LiveCode> {
        let (session, section, records) = self.store.read(|conn| {
            let session = session::load(conn, session_id)?;
            session.authorize(actor)?;
            session.require_active()?;
            let section = Self::section_label(conn, &session.section_id)?;
            let records = ledger::records_for_session(conn, session_id)?;
            Ok::<_, AttendanceError>((session, section, records))
        })?;
        let now_ms = self.clock.now_ms();
        let roster: Vec<RosterEntry> = records
            .into_iter()
            .map(|r| RosterEntry {
                student_id: r.student_id,
                status: r.status,
                checked_in_at: r.checked_in_at,
            })
            .collect();
        Ok(LiveCode {
            session_id: session.id,
            section,
            code: code::generate(&session.secret, now_ms),
            seconds_until_rotate: code::seconds_until_rotate(now_ms),
            status: session.status,
            started_at: session.started_at,
            student_count: roster.len(),
            roster,
        })
    }

    pub fn checkin(&self, code: &str, student_id: &str) -> Result<CheckinReceipt> {
        let (record, session_name, progress) = self.checkin_record(code, student_id)?;
        Ok(CheckinReceipt {
            session_id: record.session_id,
            session_name,
            status: record.status,
            checked_in_at: record.checked_in_at,
            progress,
        })
    }

    /// Like [`checkin`](Self::checkin) but hands back the stored record.
    pub fn checkin_record(
        &self,
        code: &str,
        student_id: &str,
    ) -> Result<(AttendanceRecord, String, Progress)> {
        let (session, record) = checkin::checkin(&self.store, code.trim(), student_id, self.clock.now())?;
        let (section, progress) = self.store.read(|conn| {
            Ok::<_, AttendanceError>((
                Self::section_label(conn, &session.section_id)?,
                progress::progress(conn, student_id, self.config.required_classes)?,
            ))
        })?;
        Ok((record, section, progress))
    }

    pub fn end_session(
        &self,
        session_id: &str,
        actor: &Actor,
        confirmed_student_ids: &[String],
    ) -> Result<Settlement> {
        let now = self.clock.now();
        self.store
            .write(|conn| session::end(conn, session_id, actor, confirmed_student_ids, now))
    }

    pub fn cancel_session(&self, session_id: &str, actor: &Actor) -> Result<()> {
        let now = self.clock.now();
        self.store
            .write(|conn| session::cancel(conn, session_id, actor, now))?;
        Ok(())
    }

    pub fn session(&self, session_id: &str) -> Result<Session> {
        self.store.read(|conn| session::load(conn, session_id))
    }

    pub fn progress(&self, student_id: &str) -> Result<Progress> {
        self.store
            .read(|conn| progress::progress(conn, student_id, self.config.required_classes))
    }

    pub fn history(&self, student_id: &str) -> Result<Vec<HistoryEntry>> {
        self.store.read(|conn| progress::history(conn, student_id))
    }

    /// Recomputes the student's whole chain. A break is reported in the
    /// result, not returned as an error.
    pub fn audit_chain(&self, actor: &Actor, student_id: &str) -> Result<ChainVerification> {
        actor.require_auditor()?;
        let links = self.store.read(|conn| ledger::load_chain(conn, student_id))?;
        let verification = ledger::verify_chain(&links);
        if let (Some(index), Some(record_id)) =
            (verification.broken_at_index, verification.broken_at_id.as_deref())
        {
            warn!(student_id, index, record_id, "attendance chain broken");
        }
        Ok(verification)
    }

    /// Like [`audit_chain`](Self::audit_chain), but a break is an error.
    pub fn require_intact_chain(&self, actor: &Actor, student_id: &str) -> Result<ChainVerification> {
        let verification = self.audit_chain(actor, student_id)?;
        verification.ensure_intact()?;
        Ok(verification)
    }

    pub fn sessions_for_teacher(&self, actor: &Actor) -> Result<Vec<SessionSummary>> {
        self.store
            .read(|conn| session::sessions_for_teacher(conn, &actor.id))
    }

    pub fn all_sessions(&self, actor: &Actor) -> Result<Vec<SessionSummary>> {
        actor.require_auditor()?;
        self.store.read(session::all_sessions)
    }

    pub fn stats(&self, actor: &Actor) -> Result<Stats> {
        actor.require_auditor()?;
        self.store
            .read(|conn| progress::stats(conn, self.config.required_classes))
    }

    pub fn upsert_section(&self, actor: &Actor, section_id: &str, name: &str) -> Result<()> {
        actor.require_auditor()?;
        self.store
            .write(|conn| directory::upsert_section(conn, section_id, name))
    }

    pub fn assign_teacher(&self, actor: &Actor, section_id: &str, user_id: &str) -> Result<()> {
        actor.require_auditor()?;
        self.store
            .write(|conn| directory::assign_teacher(conn, section_id, user_id))
    }

    pub fn remove_teacher(&self, actor: &Actor, section_id: &str, user_id: &str) -> Result<bool> {
        actor.require_auditor()?;
        self.store
            .write(|conn| directory::remove_teacher(conn, section_id, user_id))
    }

    pub fn list_teachers(&self, actor: &Actor) -> Result<Vec<TeacherAssignment>> {
        actor.require_auditor()?;
        self.store.read(directory::list_teachers)
    }
}
