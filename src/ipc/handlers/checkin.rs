use serde_json::json;

use crate::ipc::handlers::with_service;
use crate::ipc::params::get_required_str;
use crate::ipc::types::{AppState, Request};

fn handle_submit(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let student_id = get_required_str(params, "studentId")?;
        let code = get_required_str(params, "code")?;
        service.checkin(&code, &student_id)
    })
}

fn handle_progress(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let student_id = get_required_str(params, "studentId")?;
        service.progress(&student_id)
    })
}

fn handle_history(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let student_id = get_required_str(params, "studentId")?;
        let records = service.history(&student_id)?;
        Ok(json!({ "records": records }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "checkin.submit" => Some(handle_submit(state, req)),
        "progress.get" => Some(handle_progress(state, req)),
        "attendance.history" => Some(handle_history(state, req)),
        _ => None,
    }
}
