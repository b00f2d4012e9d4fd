//! Sections, teacher assignments and the caller identity.
//!
//! Authentication happens upstream; callers arrive here as an [`Actor`]
//! whose role has already been established.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{AttendanceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    #[serde(alias = "admin")]
    Auditor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_auditor(&self) -> bool {
        self.role == Role::Auditor
    }

    pub fn require_auditor(&self) -> Result<()> {
        if self.is_auditor() {
            Ok(())
        } else {
            Err(AttendanceError::Forbidden("auditor role required".to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAssignment {
    pub section_id: String,
    pub section_name: String,
    pub user_id: String,
}

pub fn upsert_section(conn: &Connection, section_id: &str, name: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sections(id, name) VALUES(?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        (section_id, name),
    )?;
    Ok(())
}

pub fn section_name(conn: &Connection, section_id: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT name FROM sections WHERE id = ?",
            [section_id],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn may_teach(conn: &Connection, user_id: &str, section_id: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM section_teachers WHERE section_id = ? AND user_id = ?",
            (section_id, user_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

pub fn assign_teacher(conn: &Connection, section_id: &str, user_id: &str) -> Result<()> {
    if section_name(conn, section_id)?.is_none() {
        return Err(AttendanceError::NotFound("section"));
    }
    conn.execute(
        "INSERT INTO section_teachers(section_id, user_id) VALUES(?, ?)
         ON CONFLICT(section_id, user_id) DO NOTHING",
        (section_id, user_id),
    )?;
    Ok(())
}

pub fn remove_teacher(conn: &Connection, section_id: &str, user_id: &str) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM section_teachers WHERE section_id = ? AND user_id = ?",
        (section_id, user_id),
    )?;
    Ok(n > 0)
}

pub fn list_teachers(conn: &Connection) -> Result<Vec<TeacherAssignment>> {
    let mut stmt = conn.prepare(
        "SELECT t.section_id, s.name, t.user_id
         FROM section_teachers t
         JOIN sections s ON s.id = t.section_id
         ORDER BY s.name, t.user_id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(TeacherAssignment {
                section_id: r.get(0)?,
                section_name: r.get(1)?,
                user_id: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
