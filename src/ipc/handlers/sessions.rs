use serde_json::json;

use crate::ipc::handlers::with_service;
use crate::ipc::params::{get_actor, get_id_list, get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};

fn handle_start(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let section_id = get_required_str(params, "sectionId")?;
        let slot_id = get_optional_str(params, "slotId")?;
        service.start_session(&actor, &section_id, slot_id.as_deref())
    })
}

fn handle_live_code(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let session_id = get_required_str(params, "sessionId")?;
        service.live_code(&session_id, &actor)
    })
}

fn handle_end(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let session_id = get_required_str(params, "sessionId")?;
        let confirmed = get_id_list(params, "confirmedStudentIds")?;
        service.end_session(&session_id, &actor, &confirmed)
    })
}

fn handle_cancel(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let session_id = get_required_str(params, "sessionId")?;
        service.cancel_session(&session_id, &actor)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_mine(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let sessions = service.sessions_for_teacher(&actor)?;
        Ok(json!({ "sessions": sessions }))
    })
}

fn handle_all(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let sessions = service.all_sessions(&actor)?;
        Ok(json!({ "sessions": sessions }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.start" => Some(handle_start(state, req)),
        "sessions.liveCode" => Some(handle_live_code(state, req)),
        "sessions.end" => Some(handle_end(state, req)),
        "sessions.cancel" => Some(handle_cancel(state, req)),
        "sessions.mine" => Some(handle_mine(state, req)),
        "sessions.all" => Some(handle_all(state, req)),
        _ => None,
    }
}
