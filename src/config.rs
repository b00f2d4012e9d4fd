//! Runtime settings.
//!
//! Read from an optional `rollcall.json` in the workspace directory, then
//! overridden by `ROLLCALL_*` environment variables.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "rollcall.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Confirmed classes needed per term (default: 25)
    #[serde(default = "default_required_classes")]
    pub required_classes: u32,

    /// How long a writer waits on the SQLite lock, in ms (default: 5000)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Database file inside the workspace (default: "rollcall.sqlite3")
    #[serde(default = "default_db_file_name")]
    pub db_file_name: String,

    /// `tracing` filter used when `RUST_LOG` is unset (default: "info")
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_required_classes() -> u32 {
    25
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_db_file_name() -> String {
    "rollcall.sqlite3".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            required_classes: default_required_classes(),
            busy_timeout_ms: default_busy_timeout_ms(),
            db_file_name: default_db_file_name(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    pub fn load(workspace: &Path) -> anyhow::Result<Config> {
        let path = workspace.join(CONFIG_FILE_NAME);
        let mut config = if path.is_file() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid config {}", path.to_string_lossy()))?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("ROLLCALL_REQUIRED_CLASSES") {
            self.required_classes = v
                .trim()
                .parse()
                .with_context(|| format!("ROLLCALL_REQUIRED_CLASSES must be a number, got {v:?}"))?;
        }
        if let Some(v) = lookup("ROLLCALL_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = v
                .trim()
                .parse()
                .with_context(|| format!("ROLLCALL_BUSY_TIMEOUT_MS must be a number, got {v:?}"))?;
        }
        if self.required_classes == 0 {
            anyhow::bail!("requiredClasses must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.required_classes, 25);
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert_eq!(config.db_file_name, "rollcall.sqlite3");
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"requiredClasses":30}"#).unwrap();
        assert_eq!(config.required_classes, 30);
        assert_eq!(config.db_file_name, "rollcall.sqlite3");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env(|k| (k == "ROLLCALL_REQUIRED_CLASSES").then(|| "12".to_string()))
            .unwrap();
        assert_eq!(config.required_classes, 12);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn env_rejects_garbage_and_zero() {
        let mut config = Config::default();
        assert!(config
            .apply_env(|k| (k == "ROLLCALL_BUSY_TIMEOUT_MS").then(|| "soon".to_string()))
            .is_err());
        let mut config = Config::default();
        assert!(config
            .apply_env(|k| (k == "ROLLCALL_REQUIRED_CLASSES").then(|| "0".to_string()))
            .is_err());
    }

    #[test]
    fn load_reads_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"dbFileName":"term1.sqlite3","busyTimeoutMs":250}"#,
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.db_file_name, "term1.sqlite3");
        assert_eq!(config.busy_timeout_ms, 250);
    }
}
