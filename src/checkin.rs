use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::code;
use crate::db::Store;
use crate::error::{AttendanceError, Result};
use crate::ledger::{self, AttendanceRecord};
use crate::session::{self, Session, SessionStatus};

/// First active session, oldest first, whose current or previous window
/// code equals `code`.
pub fn resolve_session(conn: &Connection, code: &str, now_ms: i64) -> Result<Session> {
    let active = session::active_sessions(conn)?;
    let scanned = active.len();
    let matched = active
        .into_iter()
        .find(|s| code::verify(&s.secret, code, now_ms));
    debug!(scanned, matched = matched.is_some(), "resolved check-in code");
    matched.ok_or(AttendanceError::InvalidCode)
}

/// Records a pending check-in for `student_id` against whichever active
/// session currently issues `code`.
///
/// Code resolution runs without the write lock. The insert then happens in
/// one immediate transaction that re-reads the session, so a concurrent
/// end/cancel either lands first (and this fails) or waits for the insert.
pub fn checkin(
    store: &Store,
    code: &str,
    student_id: &str,
    now: DateTime<Utc>,
) -> Result<(Session, AttendanceRecord)> {
    if !code::is_well_formed(code) {
        return Err(AttendanceError::BadParams(format!(
            "code must be {} digits",
            code::CODE_DIGITS
        )));
    }
    let target = store.read(|conn| resolve_session(conn, code, now.timestamp_millis()))?;
    if target.teacher_id == student_id {
        return Err(AttendanceError::SelfCheckin);
    }

    let record = store.write(|conn| {
        let current = session::load(conn, &target.id)?;
        if current.status != SessionStatus::Active {
            return Err(AttendanceError::InvalidCode);
        }
        if ledger::find(conn, &current.id, student_id)?.is_some() {
            return Err(AttendanceError::DuplicateCheckin);
        }
        ledger::append(conn, student_id, &current.id, now)
    })?;

    info!(
        session_id = %target.id,
        student_id,
        seq = record.seq,
        "student checked in"
    );
    Ok((target, record))
}
