use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::service::AttendanceService;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "requiredClasses": state.service.as_ref().map(|s| s.config().required_classes),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match AttendanceService::open(&path) {
        Ok(service) => {
            if let Some(apply) = state.log_filter.as_ref() {
                let directives = service.config().log_filter.as_str();
                if let Err(e) = apply(directives) {
                    warn!(log_filter = %directives, error = %e, "ignoring workspace log filter");
                }
            }
            info!(workspace = %path.to_string_lossy(), "workspace opened");
            let db_path = service.store().path().to_string_lossy().to_string();
            state.workspace = Some(path.clone());
            state.service = Some(service);
            ok(
                &req.id,
                json!({ "workspacePath": path.to_string_lossy(), "dbPath": db_path }),
            )
        }
        Err(e) => {
            warn!(workspace = %path.to_string_lossy(), error = %e, "workspace open failed");
            err(&req.id, "workspace_open_failed", format!("{e:#}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
