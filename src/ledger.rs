//! Per-student hash-chained attendance ledger.
//!
//! Every record a student ever produces, across all sessions, hangs off one
//! chain ordered by `checked_in_at`:
//!
//! ```text
//! hash = hex(sha256("{student}:{session}:{checked_in_at}:{prev_hash or GENESIS}"))
//! ```
//!
//! Editing, deleting or reordering a stored record breaks the recomputed hash
//! at that point and at every later link. Breaks are reported, never repaired.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::db::{format_ts, parse_opt_ts, parse_ts};
use crate::error::{AttendanceError, Result};

pub const GENESIS: &str = "GENESIS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Confirmed => "confirmed",
            RecordStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for RecordStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RecordStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "pending" => Ok(RecordStatus::Pending),
            "confirmed" => Ok(RecordStatus::Confirmed),
            "rejected" => Ok(RecordStatus::Rejected),
            other => Err(FromSqlError::Other(
                format!("unknown record status {other:?}").into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub session_id: String,
    pub student_id: String,
    /// 1-based position in the student's chain.
    pub seq: i64,
    pub checked_in_at: DateTime<Utc>,
    pub status: RecordStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub hash: String,
    pub prev_hash: Option<String>,
}

/// The hashed fields of a record exactly as stored. Audits work on these so
/// that a tampered value that no longer parses is still compared as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub id: String,
    pub student_id: String,
    pub session_id: String,
    pub checked_in_at: String,
    pub hash: String,
    pub prev_hash: Option<String>,
}

impl AttendanceRecord {
    pub fn link(&self) -> ChainLink {
        ChainLink {
            id: self.id.clone(),
            student_id: self.student_id.clone(),
            session_id: self.session_id.clone(),
            checked_in_at: format_ts(&self.checked_in_at),
            hash: self.hash.clone(),
            prev_hash: self.prev_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    pub total_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at_id: Option<String>,
}

impl ChainVerification {
    pub fn ensure_intact(&self) -> Result<()> {
        match (&self.broken_at_index, &self.broken_at_id) {
            (Some(index), Some(id)) => Err(AttendanceError::ChainBroken {
                index: *index,
                record_id: id.clone(),
            }),
            _ => Ok(()),
        }
    }
}

pub fn compute_hash(
    student_id: &str,
    session_id: &str,
    checked_in_at: &str,
    prev_hash: Option<&str>,
) -> String {
    let data = format!(
        "{}:{}:{}:{}",
        student_id,
        session_id,
        checked_in_at,
        prev_hash.unwrap_or(GENESIS)
    );
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Walks `links` (ordered by `checked_in_at`) and reports the first link whose
/// `prev_hash` or recomputed hash disagrees with the running chain.
pub fn verify_chain(links: &[ChainLink]) -> ChainVerification {
    let mut prev_hash: Option<&str> = None;
    for (index, link) in links.iter().enumerate() {
        let expected = compute_hash(
            &link.student_id,
            &link.session_id,
            &link.checked_in_at,
            prev_hash,
        );
        if link.prev_hash.as_deref() != prev_hash || expected != link.hash {
            return ChainVerification {
                valid: false,
                total_records: links.len(),
                broken_at_index: Some(index),
                broken_at_id: Some(link.id.clone()),
            };
        }
        prev_hash = Some(&link.hash);
    }
    ChainVerification {
        valid: true,
        total_records: links.len(),
        broken_at_index: None,
        broken_at_id: None,
    }
}

const RECORD_COLUMNS: &str =
    "id, session_id, student_id, seq, checked_in_at, status, confirmed_at, hash, prev_hash";

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let checked_in_at: String = r.get(4)?;
    Ok(AttendanceRecord {
        id: r.get(0)?,
        session_id: r.get(1)?,
        student_id: r.get(2)?,
        seq: r.get(3)?,
        checked_in_at: parse_ts(&checked_in_at)?,
        status: r.get(5)?,
        confirmed_at: parse_opt_ts(r.get(6)?)?,
        hash: r.get(7)?,
        prev_hash: r.get(8)?,
    })
}

/// Appends a pending record to the student's chain.
///
/// Must run inside a write transaction: the read of the chain head and the
/// insert have to be atomic with respect to other appends for the student.
/// `UNIQUE(student_id, seq)` rejects a second writer that read the same head.
pub fn append(
    conn: &Connection,
    student_id: &str,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<AttendanceRecord> {
    let head: Option<(String, i64, String)> = conn
        .query_row(
            "SELECT hash, seq, checked_in_at FROM attendance_records
             WHERE student_id = ?
             ORDER BY checked_in_at DESC, seq DESC
             LIMIT 1",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;

    let (prev_hash, seq, checked_in_at) = match head {
        Some((hash, seq, last_at)) => {
            // A clock that stepped backwards must not reorder the chain.
            let last_at = parse_ts(&last_at)?;
            (Some(hash), seq + 1, now.max(last_at))
        }
        None => (None, 1, now),
    };
    let stamp = format_ts(&checked_in_at);
    let hash = compute_hash(student_id, session_id, &stamp, prev_hash.as_deref());
    let record = AttendanceRecord {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        student_id: student_id.to_string(),
        seq,
        checked_in_at: parse_ts(&stamp)?,
        status: RecordStatus::Pending,
        confirmed_at: None,
        hash,
        prev_hash,
    };
    conn.execute(
        "INSERT INTO attendance_records(id, session_id, student_id, seq, checked_in_at, status, confirmed_at, hash, prev_hash)
         VALUES(?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        rusqlite::params![
            record.id,
            record.session_id,
            record.student_id,
            record.seq,
            stamp,
            record.status,
            record.hash,
            record.prev_hash,
        ],
    )?;
    Ok(record)
}

pub fn find(conn: &Connection, session_id: &str, student_id: &str) -> Result<Option<AttendanceRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE session_id = ? AND student_id = ?"
    );
    Ok(conn
        .query_row(&sql, (session_id, student_id), record_from_row)
        .optional()?)
}

pub fn records_for_session(conn: &Connection, session_id: &str) -> Result<Vec<AttendanceRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records
         WHERE session_id = ?
         ORDER BY checked_in_at, seq"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([session_id], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The student's chain exactly as stored, oldest first.
pub fn load_chain(conn: &Connection, student_id: &str) -> Result<Vec<ChainLink>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, session_id, checked_in_at, hash, prev_hash
         FROM attendance_records
         WHERE student_id = ?
         ORDER BY checked_in_at ASC, seq ASC",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok(ChainLink {
                id: r.get(0)?,
                student_id: r.get(1)?,
                session_id: r.get(2)?,
                checked_in_at: r.get(3)?,
                hash: r.get(4)?,
                prev_hash: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub confirmed_count: usize,
    pub rejected_count: usize,
}

/// Moves every pending record of the session to `confirmed` (listed students)
/// or `rejected` (everyone else). Only `status`/`confirmed_at` change.
pub fn settle_session(
    conn: &Connection,
    session_id: &str,
    confirmed_student_ids: &HashSet<&str>,
    now: DateTime<Utc>,
) -> Result<Settlement> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id FROM attendance_records WHERE session_id = ? AND status = 'pending'",
    )?;
    let pending = stmt
        .query_map([session_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let stamp = format_ts(&now);
    let mut settlement = Settlement {
        confirmed_count: 0,
        rejected_count: 0,
    };
    for (record_id, student_id) in pending {
        if confirmed_student_ids.contains(student_id.as_str()) {
            conn.execute(
                "UPDATE attendance_records SET status = ?, confirmed_at = ? WHERE id = ?",
                rusqlite::params![RecordStatus::Confirmed, stamp, record_id],
            )?;
            settlement.confirmed_count += 1;
        } else {
            conn.execute(
                "UPDATE attendance_records SET status = ?, confirmed_at = NULL WHERE id = ?",
                rusqlite::params![RecordStatus::Rejected, record_id],
            )?;
            settlement.rejected_count += 1;
        }
    }
    Ok(settlement)
}

pub fn reject_session(conn: &Connection, session_id: &str) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE attendance_records SET status = ?, confirmed_at = NULL
         WHERE session_id = ? AND status = 'pending'",
        rusqlite::params![RecordStatus::Rejected, session_id],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(student: &str, sessions: &[&str]) -> Vec<ChainLink> {
        let mut out: Vec<ChainLink> = Vec::new();
        for (i, session) in sessions.iter().enumerate() {
            let at = format!("2025-09-{:02}T10:00:00.000Z", i + 1);
            let prev = out.last().map(|l| l.hash.clone());
            out.push(ChainLink {
                id: format!("r{i}"),
                student_id: student.to_string(),
                session_id: session.to_string(),
                hash: compute_hash(student, session, &at, prev.as_deref()),
                checked_in_at: at,
                prev_hash: prev,
            });
        }
        out
    }

    #[test]
    fn hash_matches_known_layout() {
        let h = compute_hash("7", "3", "2025-09-08T10:15:02.000Z", None);
        let expected = hex::encode(Sha256::digest(b"7:3:2025-09-08T10:15:02.000Z:GENESIS"));
        assert_eq!(h, expected);
        assert_eq!(h.len(), 64);
    }

    #[test]
    fn empty_and_valid_chains_verify() {
        let empty = verify_chain(&[]);
        assert!(empty.valid);
        assert_eq!(empty.total_records, 0);

        let links = chain("s1", &["a", "b", "c", "d", "e"]);
        let v = verify_chain(&links);
        assert!(v.valid);
        assert_eq!(v.total_records, 5);
        assert!(v.ensure_intact().is_ok());
    }

    #[test]
    fn mutating_any_hashed_field_breaks_at_that_index() {
        let base = chain("s1", &["a", "b", "c", "d", "e"]);
        for k in 0..base.len() {
            let mutations: Vec<Box<dyn Fn(&mut ChainLink)>> = vec![
                Box::new(|l: &mut ChainLink| l.student_id.push('x')),
                Box::new(|l: &mut ChainLink| l.session_id = "zzz".to_string()),
                Box::new(|l: &mut ChainLink| l.checked_in_at = "2031-01-01T00:00:00.000Z".to_string()),
                Box::new(|l: &mut ChainLink| l.hash = "0".repeat(64)),
                Box::new(|l: &mut ChainLink| l.prev_hash = Some("f".repeat(64))),
            ];
            for mutate in &mutations {
                let mut links = base.clone();
                mutate(&mut links[k]);
                let v = verify_chain(&links);
                assert!(!v.valid);
                assert_eq!(v.broken_at_index, Some(k));
                assert_eq!(v.broken_at_id.as_deref(), Some(base[k].id.as_str()));
                assert_eq!(v.total_records, base.len());
            }
        }
    }

    #[test]
    fn deletion_and_reordering_are_detected() {
        let base = chain("s1", &["a", "b", "c", "d"]);

        let mut deleted = base.clone();
        deleted.remove(1);
        assert_eq!(verify_chain(&deleted).broken_at_index, Some(1));

        let mut swapped = base.clone();
        swapped.swap(2, 3);
        assert_eq!(verify_chain(&swapped).broken_at_index, Some(2));

        let mut truncated_head = base.clone();
        truncated_head.remove(0);
        assert_eq!(verify_chain(&truncated_head).broken_at_index, Some(0));
    }

    #[test]
    fn broken_chain_converts_to_error() {
        let mut links = chain("s1", &["a", "b"]);
        links[1].hash = "bad".to_string();
        let err = verify_chain(&links).ensure_intact().unwrap_err();
        assert!(matches!(err, AttendanceError::ChainBroken { index: 1, .. }));
    }

    #[test]
    fn verification_serializes_without_absent_fields() {
        let v = verify_chain(&chain("s1", &["a"]));
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({ "valid": true, "totalRecords": 1 })
        );
    }
}
