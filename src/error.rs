use serde_json::json;

use crate::session::SessionStatus;

/// Failures surfaced by the attendance operations. Every variant maps to a
/// stable wire code so clients can react to the exact reason.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("teacher already has an active session")]
    Conflict { active_session_id: String },

    #[error("invalid or expired code")]
    InvalidCode,

    #[error("a teacher cannot check in to their own session")]
    SelfCheckin,

    #[error("already checked in to this session")]
    DuplicateCheckin,

    #[error("session is {status}")]
    InvalidState { status: SessionStatus },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("attendance chain broken at index {index}")]
    ChainBroken { index: usize, record_id: String },

    #[error("{0}")]
    BadParams(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T, E = AttendanceError> = std::result::Result<T, E>;

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::Conflict { .. } => "conflict",
            AttendanceError::InvalidCode => "invalid_code",
            AttendanceError::SelfCheckin => "self_checkin",
            AttendanceError::DuplicateCheckin => "duplicate_checkin",
            AttendanceError::InvalidState { .. } => "invalid_state",
            AttendanceError::Forbidden(_) => "forbidden",
            AttendanceError::NotFound(_) => "not_found",
            AttendanceError::ChainBroken { .. } => "chain_broken",
            AttendanceError::BadParams(_) => "bad_params",
            AttendanceError::Storage(_) => "storage_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AttendanceError::Conflict { active_session_id } => {
                Some(json!({ "sessionId": active_session_id }))
            }
            AttendanceError::InvalidState { status } => Some(json!({ "status": status })),
            AttendanceError::ChainBroken { index, record_id } => Some(json!({
                "brokenAtIndex": index,
                "brokenAtId": record_id,
            })),
            _ => None,
        }
    }

    pub(crate) fn forbidden() -> Self {
        AttendanceError::Forbidden("access denied".to_string())
    }
}
