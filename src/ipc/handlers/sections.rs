use serde_json::json;

use crate::ipc::handlers::with_service;
use crate::ipc::params::{get_actor, get_required_str};
use crate::ipc::types::{AppState, Request};

fn handle_upsert(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let section_id = get_required_str(params, "sectionId")?;
        let name = get_required_str(params, "name")?;
        service.upsert_section(&actor, &section_id, &name)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_assign_teacher(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let section_id = get_required_str(params, "sectionId")?;
        let user_id = get_required_str(params, "userId")?;
        service.assign_teacher(&actor, &section_id, &user_id)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_remove_teacher(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let section_id = get_required_str(params, "sectionId")?;
        let user_id = get_required_str(params, "userId")?;
        let removed = service.remove_teacher(&actor, &section_id, &user_id)?;
        Ok(json!({ "ok": true, "removed": removed }))
    })
}

fn handle_list_teachers(state: &AppState, req: &Request) -> serde_json::Value {
    with_service(state, req, |service, params| {
        let actor = get_actor(params)?;
        let teachers = service.list_teachers(&actor)?;
        Ok(json!({ "teachers": teachers }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sections.upsert" => Some(handle_upsert(state, req)),
        "sections.assignTeacher" => Some(handle_assign_teacher(state, req)),
        "sections.removeTeacher" => Some(handle_remove_teacher(state, req)),
        "sections.listTeachers" => Some(handle_list_teachers(state, req)),
        _ => None,
    }
}
