use crate::access;
use crate::error::CoreError;
use crate::holidays::HolidayType;
use crate::ipc::error::{ok, ok_with_warnings};
use crate::ipc::helpers::{
    db_conn, fail, optional_date, optional_str, required_date, required_str, resolve_period, today,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_holidays_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let date = required_date(req, "date")?;
    let kind_raw = required_str(req, "type")?;
    let kind = HolidayType::parse(&kind_raw)
        .ok_or_else(|| CoreError::validation("type", format!("unknown holiday type '{}'", kind_raw)))
        .map_err(fail(req))?;
    let name = required_str(req, "name")?;
    let description = optional_str(req, "description");
    let holiday =
        store::upsert_holiday(conn, date, kind, &name, description.as_deref()).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "holiday": holiday.to_json() })))
}

/// Either an explicit `from`/`to` range or a month (defaulting to the current
/// one). Half a range is ignored with a warning.
fn handle_holidays_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    if state.actor.is_none() {
        return Err(fail(req)(CoreError::NoActor));
    }
    let (from, to, warnings) = match (optional_date(req, "from")?, optional_date(req, "to")?) {
        (Some(from), Some(to)) => (from, to, Vec::new()),
        (None, None) => {
            let (period, warnings) = resolve_period(state, req, today());
            (period.first_day(), period.last_day(), warnings)
        }
        (from, _) => {
            let (period, mut warnings) = resolve_period(state, req, today());
            let (given, missing) = if from.is_some() { ("from", "to") } else { ("to", "from") };
            warnings.insert(
                0,
                format!("{} given without {}; listing {}", given, missing, period.key()),
            );
            (period.first_day(), period.last_day(), warnings)
        }
    };
    let holidays = store::holidays_between(conn, from, to).map_err(fail(req))?;
    Ok(ok_with_warnings(
        &req.id,
        json!({ "holidays": holidays.iter().map(|h| h.to_json()).collect::<Vec<_>>() }),
        warnings,
    ))
}

fn handle_holidays_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let date = required_date(req, "date")?;
    let removed = store::delete_holiday(conn, date).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "removed": removed })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "holidays.upsert" => handle_holidays_upsert(state, req),
        "holidays.list" => handle_holidays_list(state, req),
        "holidays.delete" => handle_holidays_delete(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
