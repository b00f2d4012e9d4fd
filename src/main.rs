use rollcalld::{ipc, Config};
use std::io::{self, BufRead, Write};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

/// Installs the stderr subscriber. Unless `RUST_LOG` pins the filter, the
/// returned hook lets a workspace's `logFilter` replace the default later.
fn init_tracing() -> Option<ipc::LogFilterHook> {
    // stdout carries the protocol; logs go to stderr.
    let pinned = EnvFilter::try_from_default_env().ok();
    let from_env = pinned.is_some();
    let filter = pinned.unwrap_or_else(|| EnvFilter::new(Config::default().log_filter));
    let (filter, handle) = reload::Layer::new(filter);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(io::stderr))
        .try_init();

    if from_env {
        return None;
    }
    Some(Box::new(move |directives: &str| {
        let filter = EnvFilter::try_new(directives)?;
        handle.reload(filter)?;
        Ok(())
    }))
}

fn main() {
    let mut state = ipc::AppState {
        log_filter: init_tracing(),
        ..Default::default()
    };
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rollcalld starting");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!(error = %e, "unparseable request line");
                let reply = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", reply);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, shutting down");
}
