use crate::directory::Actor;
use crate::error::AttendanceError;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, AttendanceError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| AttendanceError::BadParams(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, AttendanceError> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| AttendanceError::BadParams(format!("{} must be a string", key))),
    }
}

pub fn get_optional_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, AttendanceError> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| AttendanceError::BadParams(format!("{} must be a boolean", key))),
    }
}

pub fn get_actor(params: &serde_json::Value) -> Result<Actor, AttendanceError> {
    let Some(raw) = params.get("actor") else {
        return Err(AttendanceError::BadParams("missing actor".to_string()));
    };
    serde_json::from_value(raw.clone())
        .map_err(|e| AttendanceError::BadParams(format!("invalid actor: {e}")))
}

/// Accepts an array of ids; a missing or null key is an empty list.
pub fn get_id_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, AttendanceError> {
    let Some(v) = params.get(key) else {
        return Ok(Vec::new());
    };
    if v.is_null() {
        return Ok(Vec::new());
    }
    let Some(items) = v.as_array() else {
        return Err(AttendanceError::BadParams(format!("{} must be an array", key)));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| AttendanceError::BadParams(format!("{} must contain strings", key)))
        })
        .collect()
}
