mod access;
mod attendance;
mod calendar;
mod config;
mod db;
mod error;
mod holidays;
mod ipc;
mod schedule;
mod sessions;
mod store;
mod timetable;

use std::io::{self, BufRead, Write};

fn init_logging(filter: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // stdout carries the IPC stream, so logs go to stderr only.
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("attendanced=info"));
    tracing_subscriber::registry().with(env_filter).with(layer).init();
}

fn main() {
    let config = config::AppConfig::from_env();
    init_logging(&config.log_filter);
    for warning in &config.warnings {
        tracing::warn!("{}", warning);
    }

    let mut state = ipc::AppState::new(config);
    if let Some(path) = state.config.workspace.clone() {
        match db::open_db(&path, state.config.busy_timeout) {
            Ok(conn) => {
                tracing::info!(workspace = %path.display(), "workspace opened at startup");
                state.workspace = Some(path);
                state.db = Some(conn);
            }
            Err(e) => tracing::warn!(workspace = %path.display(), error = %e, "startup workspace failed to open"),
        }
    }

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

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                })
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
