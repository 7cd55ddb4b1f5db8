use crate::attendance::{self, AttendanceStatus, MarkEntry};
use crate::error::CoreError;
use crate::ipc::error::{err, ok, ok_with_warnings};
use crate::ipc::helpers::{
    db_conn, fail, optional_date, required_date, required_str, resolve_period, today, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use serde_json::Value;

fn text<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_mark_entry(i: usize, raw: &Value) -> Result<MarkEntry, CoreError> {
    let student_id = text(raw, "studentId")
        .ok_or_else(|| CoreError::validation(format!("entries[{}].studentId", i), "missing studentId"))?;
    let status_raw = text(raw, "status").unwrap_or_default();
    let status = AttendanceStatus::parse(status_raw).ok_or_else(|| {
        CoreError::validation(
            format!("entries[{}].status", i),
            format!("unknown attendance status '{}'", status_raw),
        )
    })?;
    Ok(MarkEntry {
        student_id: student_id.to_string(),
        status,
        remarks: text(raw, "remarks").map(str::to_string),
    })
}

fn handle_session_dates(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let (period, warnings) = resolve_period(state, req, today());
    let sessions =
        attendance::session_dates(conn, state.actor.as_ref(), &class_id, period).map_err(fail(req))?;
    Ok(ok_with_warnings(&req.id, sessions.to_json(), warnings))
}

fn handle_month_matrix(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let (period, warnings) = resolve_period(state, req, today());
    let view =
        attendance::month_matrix(conn, state.actor.as_ref(), &class_id, period).map_err(fail(req))?;
    Ok(ok_with_warnings(&req.id, view.to_json(), warnings))
}

fn handle_day_sheet(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    // A malformed date is corrected like any other read parameter.
    let mut warnings = Vec::new();
    let requested = match optional_date(req, "date") {
        Ok(d) => d,
        Err(_) => {
            warnings.push(format!("malformed date {}; using the current week", req.params["date"]));
            None
        }
    };
    let sheet = attendance::day_sheet(conn, state.actor.as_ref(), &class_id, requested, today())
        .map_err(fail(req))?;
    warnings.extend(sheet.warnings.iter().cloned());
    Ok(ok_with_warnings(&req.id, sheet.to_json(), warnings))
}

fn handle_mark(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let date = required_date(req, "date")?;
    let Some(raw_entries) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing entries", None));
    };
    let entries = raw_entries
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_mark_entry(i, raw))
        .collect::<Result<Vec<_>, _>>()
        .map_err(fail(req))?;
    let outcome = attendance::mark_attendance(conn, state.actor.as_ref(), &class_id, date, &entries)
        .map_err(fail(req))?;
    Ok(ok(&req.id, outcome.to_json()))
}

fn handle_summary(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let from = optional_date(req, "from")?;
    let to = optional_date(req, "to")?;
    let summary = attendance::class_summary(conn, state.actor.as_ref(), &class_id, from, to)
        .map_err(fail(req))?;
    Ok(ok(&req.id, summary))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.sessionDates" => handle_session_dates(state, req),
        "attendance.monthMatrix" => handle_month_matrix(state, req),
        "attendance.daySheet" => handle_day_sheet(state, req),
        "attendance.mark" => handle_mark(state, req),
        "attendance.summary" => handle_summary(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
