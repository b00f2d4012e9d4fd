//! Session lifecycle: `active` until the owning teacher (or an auditor)
//! explicitly ends or cancels it. Both terminal states are absorbing.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::info;
use uuid::Uuid;

use crate::code::SessionSecret;
use crate::db::{format_ts, parse_opt_ts, parse_ts};
use crate::directory::{self, Actor};
use crate::error::{AttendanceError, Result};
use crate::ledger::{self, Settlement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for SessionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SessionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(FromSqlError::Other(
                format!("unknown session status {other:?}").into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub section_id: String,
    pub slot_id: Option<String>,
    pub teacher_id: String,
    #[serde(skip)]
    pub secret: SessionSecret,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Only the session's own teacher or an auditor may drive it.
    pub fn authorize(&self, actor: &Actor) -> Result<()> {
        if actor.id == self.teacher_id || actor.is_auditor() {
            Ok(())
        } else {
            Err(AttendanceError::forbidden())
        }
    }

    pub fn require_active(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AttendanceError::InvalidState {
                status: self.status,
            });
        }
        Ok(())
    }
}

const SESSION_COLUMNS: &str =
    "id, section_id, slot_id, teacher_id, secret_seed, status, started_at, ended_at";

fn session_from_row(r: &Row<'_>) -> rusqlite::Result<Session> {
    let started_at: String = r.get(6)?;
    Ok(Session {
        id: r.get(0)?,
        section_id: r.get(1)?,
        slot_id: r.get(2)?,
        teacher_id: r.get(3)?,
        secret: SessionSecret::from_stored(r.get(4)?),
        status: r.get(5)?,
        started_at: parse_ts(&started_at)?,
        ended_at: parse_opt_ts(r.get(7)?)?,
    })
}

pub fn find(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?");
    Ok(conn
        .query_row(&sql, [session_id], session_from_row)
        .optional()?)
}

pub fn load(conn: &Connection, session_id: &str) -> Result<Session> {
    find(conn, session_id)?.ok_or(AttendanceError::NotFound("session"))
}

fn active_for_teacher(conn: &Connection, teacher_id: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM sessions WHERE teacher_id = ? AND status = 'active'",
            [teacher_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// The current active set, oldest first. This order decides which session
/// wins when two secrets produce the same code in one window.
pub fn active_sessions(conn: &Connection) -> Result<Vec<Session>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sessions
         WHERE status = 'active'
         ORDER BY started_at, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], session_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn start(
    conn: &Connection,
    actor: &Actor,
    section_id: &str,
    slot_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Session> {
    if directory::section_name(conn, section_id)?.is_none() {
        return Err(AttendanceError::NotFound("section"));
    }
    if !actor.is_auditor() && !directory::may_teach(conn, &actor.id, section_id)? {
        return Err(AttendanceError::Forbidden(
            "not a teacher of this section".to_string(),
        ));
    }
    if let Some(active_session_id) = active_for_teacher(conn, &actor.id)? {
        return Err(AttendanceError::Conflict { active_session_id });
    }

    let session = Session {
        id: Uuid::new_v4().to_string(),
        section_id: section_id.to_string(),
        slot_id: slot_id.map(str::to_string),
        teacher_id: actor.id.clone(),
        secret: SessionSecret::generate(),
        status: SessionStatus::Active,
        started_at: parse_ts(&format_ts(&now))?,
        ended_at: None,
    };
    conn.execute(
        "INSERT INTO sessions(id, section_id, slot_id, teacher_id, secret_seed, status, started_at, ended_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, NULL)",
        rusqlite::params![
            session.id,
            session.section_id,
            session.slot_id,
            session.teacher_id,
            session.secret.as_str(),
            session.status,
            format_ts(&session.started_at),
        ],
    )?;
    info!(session_id = %session.id, teacher_id = %session.teacher_id, section_id, "session started");
    Ok(session)
}

fn close(conn: &Connection, session_id: &str, status: SessionStatus, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET status = ?, ended_at = ? WHERE id = ? AND status = 'active'",
        rusqlite::params![status, format_ts(&now), session_id],
    )?;
    Ok(())
}

/// Confirms the listed students, rejects every other record of the session
/// and marks it `completed`.
pub fn end(
    conn: &Connection,
    session_id: &str,
    actor: &Actor,
    confirmed_student_ids: &[String],
    now: DateTime<Utc>,
) -> Result<Settlement> {
    let session = load(conn, session_id)?;
    session.authorize(actor)?;
    session.require_active()?;

    let confirmed: HashSet<&str> = confirmed_student_ids.iter().map(String::as_str).collect();
    let settlement = ledger::settle_session(conn, session_id, &confirmed, now)?;
    close(conn, session_id, SessionStatus::Completed, now)?;
    info!(
        session_id,
        actor_id = %actor.id,
        confirmed = settlement.confirmed_count,
        rejected = settlement.rejected_count,
        "session completed"
    );
    Ok(settlement)
}

pub fn cancel(conn: &Connection, session_id: &str, actor: &Actor, now: DateTime<Utc>) -> Result<usize> {
    let session = load(conn, session_id)?;
    session.authorize(actor)?;
    session.require_active()?;

    let rejected = ledger::reject_session(conn, session_id)?;
    close(conn, session_id, SessionStatus::Cancelled, now)?;
    info!(session_id, actor_id = %actor.id, rejected, "session cancelled");
    Ok(rejected)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub section_id: String,
    pub section: String,
    pub teacher_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub student_count: i64,
}

fn list_summaries(
    conn: &Connection,
    teacher_id: Option<&str>,
    limit: i64,
) -> Result<Vec<SessionSummary>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.section_id, sec.name, s.teacher_id, s.status, s.started_at, s.ended_at,
                (SELECT COUNT(*) FROM attendance_records a WHERE a.session_id = s.id)
         FROM sessions s
         JOIN sections sec ON sec.id = s.section_id
         WHERE (?1 IS NULL OR s.teacher_id = ?1)
         ORDER BY s.started_at DESC, s.id
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![teacher_id, limit], |r| {
            let started_at: String = r.get(5)?;
            Ok(SessionSummary {
                id: r.get(0)?,
                section_id: r.get(1)?,
                section: r.get(2)?,
                teacher_id: r.get(3)?,
                status: r.get(4)?,
                started_at: parse_ts(&started_at)?,
                ended_at: parse_opt_ts(r.get(6)?)?,
                student_count: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn sessions_for_teacher(conn: &Connection, teacher_id: &str) -> Result<Vec<SessionSummary>> {
    list_summaries(conn, Some(teacher_id), 50)
}

pub fn all_sessions(conn: &Connection) -> Result<Vec<SessionSummary>> {
    list_summaries(conn, None, 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Role;

    #[test]
    fn terminal_states() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert_eq!(
            serde_json::to_value(SessionStatus::Cancelled).unwrap(),
            serde_json::json!("cancelled")
        );
    }

    #[test]
    fn authorize_allows_owner_and_auditor_only() {
        let session = Session {
            id: "s".to_string(),
            section_id: "football".to_string(),
            slot_id: None,
            teacher_id: "t1".to_string(),
            secret: SessionSecret::generate(),
            status: SessionStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
        };
        assert!(session.authorize(&Actor::new("t1", Role::Teacher)).is_ok());
        assert!(session.authorize(&Actor::new("a1", Role::Auditor)).is_ok());
        assert!(matches!(
            session.authorize(&Actor::new("t2", Role::Teacher)),
            Err(AttendanceError::Forbidden(_))
        ));
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("secret").is_none());
    }

    #[test]
    fn finished_sessions_reject_further_transitions() {
        let mut session = Session {
            id: "s".to_string(),
            section_id: "football".to_string(),
            slot_id: None,
            teacher_id: "t1".to_string(),
            secret: SessionSecret::generate(),
            status: SessionStatus::Completed,
            started_at: Utc::now(),
            ended_at: None,
        };
        assert!(matches!(
            session.require_active(),
            Err(AttendanceError::InvalidState { status: SessionStatus::Completed })
        ));
        session.status = SessionStatus::Active;
        assert!(session.require_active().is_ok());
    }
}
