use crate::ipc::handlers::with_service;
use crate::ipc::params::{get_actor, get_optional_bool, get_required_str};
use crate::ipc::types::{AppState, Request};

fn handle_chain(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let student_id = get_required_str(params, "studentId")?;
        // strict: a broken chain comes back as a chain_broken error.
        if get_optional_bool(params, "strict")?.unwrap_or(false) {
            service.require_intact_chain(&actor, &student_id)
        } else {
            service.audit_chain(&actor, &student_id)
        }
    })
}

fn handle_stats(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        service.stats(&actor)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "audit.chain" => Some(handle_chain(state, req)),
        "stats.summary" => Some(handle_stats(state, req)),
        _ => None,
    }
}
