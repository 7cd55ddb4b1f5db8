use crate::attendance;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, fail, optional_date, today, HandlerResult};
use crate::ipc::types::{AppState, Request};

/// `date` defaults to today.
fn handle_dashboard_stats(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let day = optional_date(req, "date")?.unwrap_or_else(today);
    let stats = attendance::dashboard_stats(conn, state.actor.as_ref(), day).map_err(fail(req))?;
    Ok(ok(&req.id, stats))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "dashboard.stats" => handle_dashboard_stats(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
