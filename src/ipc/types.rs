use std::path::PathBuf;

use serde::Deserialize;

use crate::service::AttendanceService;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Replaces the active log filter with the given directives.
pub type LogFilterHook = Box<dyn Fn(&str) -> anyhow::Result<()>>;

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub service: Option<AttendanceService>,
    /// Absent when the filter is pinned by `RUST_LOG`.
    pub log_filter: Option<LogFilterHook>,
}
