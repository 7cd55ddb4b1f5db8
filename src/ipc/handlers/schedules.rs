use crate::access;
use crate::error::CoreError;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, fail, required_str, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{parse_time, parse_weekday, validate_entries, ScheduleEntry};
use crate::store;
use serde_json::{json, Value};

fn entry_str<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(|v| v.as_str()).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_entry(i: usize, raw: &Value) -> Result<ScheduleEntry, CoreError> {
    let field = |name: &str| format!("entries[{}].{}", i, name);
    let day = entry_str(raw, "dayOfWeek")
        .and_then(parse_weekday)
        .ok_or_else(|| CoreError::validation(field("dayOfWeek"), "expected a day name such as Monday"))?;
    let start = entry_str(raw, "startTime")
        .and_then(parse_time)
        .ok_or_else(|| CoreError::validation(field("startTime"), "expected HH:MM"))?;
    let end = entry_str(raw, "endTime")
        .and_then(parse_time)
        .ok_or_else(|| CoreError::validation(field("endTime"), "expected HH:MM"))?;
    Ok(ScheduleEntry {
        id: entry_str(raw, "id").map(str::to_string),
        day,
        start,
        end,
        location: entry_str(raw, "location").map(str::to_string),
    })
}

fn handle_schedules_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let class = store::load_class(conn, &class_id).map_err(fail(req))?;
    access::require_read(state.actor.as_ref(), &class_id, class.teacher()).map_err(fail(req))?;
    let source = store::schedule_source(conn, &class).map_err(fail(req))?;
    let entries = store::schedule_entries(conn, &class_id).map_err(fail(req))?;
    Ok(ok(
        &req.id,
        json!({
            "classId": class_id,
            "scheduleKind": source.kind(),
            "scheduleDetails": class.fields.schedule_details,
            "entries": entries.iter().map(|e| e.to_json()).collect::<Vec<_>>(),
        }),
    ))
}

/// Whole-list edit: the submitted entries become the class's schedule.
fn handle_schedules_replace(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let Some(raw_entries) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing entries", None));
    };
    let class = store::load_class(conn, &class_id).map_err(fail(req))?;
    access::require_write(state.actor.as_ref(), &class_id, class.teacher()).map_err(fail(req))?;

    let entries = raw_entries
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_entry(i, raw))
        .collect::<Result<Vec<_>, _>>()
        .map_err(fail(req))?;
    validate_entries(&entries).map_err(fail(req))?;
    let saved = store::replace_schedule_entries(conn, &class_id, &entries).map_err(fail(req))?;
    tracing::info!(class_id = %class_id, entries = saved.len(), "schedule replaced");
    Ok(ok(
        &req.id,
        json!({
            "classId": class_id,
            "entries": saved.iter().map(|e| e.to_json()).collect::<Vec<_>>(),
        }),
    ))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "schedules.list" => handle_schedules_list(state, req),
        "schedules.replace" => handle_schedules_replace(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
