pub mod audit;
pub mod checkin;
pub mod sections;
pub mod sessions;
pub mod workspace;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AttendanceError;
use crate::ipc::error::{err, from_attendance, ok};
use crate::ipc::types::{AppState, Request};
use crate::service::AttendanceService;

/// Runs `f` against the open workspace and shapes the reply envelope.
pub(crate) fn with_service<T, F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    T: Serialize,
    F: FnOnce(&AttendanceService, &serde_json::Value) -> Result<T, AttendanceError>,
{
    let Some(service) = state.service.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(service, &req.params) {
        Ok(result) => match serde_json::to_value(result) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "encode_failed", e.to_string(), None),
        },
        Err(error) => {
            if matches!(error, AttendanceError::Storage(_)) {
                warn!(method = %req.method, error = %error, "request failed");
            } else {
                debug!(method = %req.method, code = error.code(), "request rejected");
            }
            from_attendance(&req.id, &error)
        }
    }
}
