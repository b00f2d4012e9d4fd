use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{parse_opt_ts, parse_ts};
use crate::error::Result;
use crate::ledger::RecordStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub confirmed: u32,
    pub pending: u32,
    pub rejected: u32,
    /// confirmed + pending: what the student may end up with.
    pub total: u32,
    pub required: u32,
    pub percentage: u32,
    pub completed: bool,
}

impl Progress {
    pub fn from_counts(confirmed: u32, pending: u32, rejected: u32, required: u32) -> Progress {
        let percentage = if required == 0 {
            0
        } else {
            (f64::from(confirmed) / f64::from(required) * 100.0).round() as u32
        };
        Progress {
            confirmed,
            pending,
            rejected,
            total: confirmed + pending,
            required,
            percentage,
            completed: confirmed >= required,
        }
    }
}

pub fn progress(conn: &Connection, student_id: &str, required: u32) -> Result<Progress> {
    let (confirmed, pending, rejected): (u32, u32, u32) = conn.query_row(
        "SELECT
            COALESCE(SUM(status = 'confirmed'), 0),
            COALESCE(SUM(status = 'pending'), 0),
            COALESCE(SUM(status = 'rejected'), 0)
         FROM attendance_records
         WHERE student_id = ?",
        [student_id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    Ok(Progress::from_counts(confirmed, pending, rejected, required))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub session_id: String,
    pub section: String,
    pub teacher_id: String,
    pub status: RecordStatus,
    pub checked_in_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// The student's check-ins, newest first.
pub fn history(conn: &Connection, student_id: &str) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.session_id, sec.name, s.teacher_id, a.status, a.checked_in_at, a.confirmed_at
         FROM attendance_records a
         JOIN sessions s ON s.id = a.session_id
         JOIN sections sec ON sec.id = s.section_id
         WHERE a.student_id = ?
         ORDER BY a.checked_in_at DESC, a.seq DESC",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            let checked_in_at: String = r.get(5)?;
            Ok(HistoryEntry {
                id: r.get(0)?,
                session_id: r.get(1)?,
                section: r.get(2)?,
                teacher_id: r.get(3)?,
                status: r.get(4)?,
                checked_in_at: parse_ts(&checked_in_at)?,
                confirmed_at: parse_opt_ts(r.get(6)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub total_attendances: i64,
    pub confirmed_attendances: i64,
    pub teacher_count: i64,
    pub students_with_attendance: i64,
    pub completed_students: i64,
    pub required_classes: u32,
}

pub fn stats(conn: &Connection, required: u32) -> Result<Stats> {
    let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |r| r.get(0)) };
    Ok(Stats {
        total_sessions: count("SELECT COUNT(*) FROM sessions")?,
        active_sessions: count("SELECT COUNT(*) FROM sessions WHERE status = 'active'")?,
        total_attendances: count("SELECT COUNT(*) FROM attendance_records")?,
        confirmed_attendances: count(
            "SELECT COUNT(*) FROM attendance_records WHERE status = 'confirmed'",
        )?,
        teacher_count: count("SELECT COUNT(*) FROM section_teachers")?,
        students_with_attendance: count(
            "SELECT COUNT(DISTINCT student_id) FROM attendance_records WHERE status = 'confirmed'",
        )?,
        completed_students: conn.query_row(
            "SELECT COUNT(*) FROM (
                SELECT student_id FROM attendance_records
                WHERE status = 'confirmed'
                GROUP BY student_id
                HAVING COUNT(*) >= ?
             )",
            [required],
            |r| r.get(0),
        )?,
        required_classes: required,
    })
}
