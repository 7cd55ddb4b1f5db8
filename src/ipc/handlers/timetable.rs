use crate::calendar::resolve_week;
use crate::ipc::error::ok_with_warnings;
use crate::ipc::helpers::{db_conn, fail, today, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::timetable;

fn handle_timetable_week(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let anchor = req.params.get("date").and_then(|v| v.as_str());
    let (week, warnings) = resolve_week(anchor, today());
    let grid = timetable::timetable_week(conn, state.actor.as_ref(), week, state.config.slot_grid)
        .map_err(fail(req))?;
    Ok(ok_with_warnings(&req.id, grid.to_json(), warnings))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.week" => Some(handle_timetable_week(state, req).unwrap_or_else(|e| e)),
        _ => None,
    }
}
