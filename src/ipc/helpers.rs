use crate::calendar::{clamp_month_key, clamp_year_month, parse_date, resolve_week, Period};
use crate::error::CoreError;
use crate::ipc::error::{core_err, err};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;

pub type HandlerResult = Result<Value, Value>;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn fail(req: &Request) -> impl Fn(CoreError) -> Value + '_ {
    move |e| core_err(&req.id, &e)
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// For partial updates: an absent key keeps `current`, `null` or "" clears it.
pub fn patch_str(req: &Request, key: &str, current: Option<String>) -> Option<String> {
    match req.params.get(key) {
        None => current,
        Some(v) => v.as_str().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
    }
}

pub fn required_date(req: &Request, key: &str) -> Result<NaiveDate, Value> {
    let raw = required_str(req, key)?;
    parse_date(&raw).ok_or_else(|| {
        core_err(
            &req.id,
            &CoreError::validation(key, format!("'{}' is not a YYYY-MM-DD date", raw)),
        )
    })
}

pub fn optional_date(req: &Request, key: &str) -> Result<Option<NaiveDate>, Value> {
    match optional_str(req, key) {
        None => Ok(None),
        Some(_) => required_date(req, key).map(Some),
    }
}

/// Integer parameter given as a number or numeric string. A present but
/// unusable value becomes `None` plus a warning.
fn loose_int(req: &Request, key: &str, warnings: &mut Vec<String>) -> Option<i64> {
    let v = req.params.get(key).filter(|v| !v.is_null())?;
    let parsed = v
        .as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()));
    if parsed.is_none() {
        warnings.push(format!("malformed {} {}", key, v));
    }
    parsed
}

/// The period a read covers: `weekOf` selects a week, a `month` string such
/// as "2025-02" or numeric `year`/`month` select a month. Missing or bad
/// parts fall back to today.
pub fn resolve_period(state: &AppState, req: &Request, today: NaiveDate) -> (Period, Vec<String>) {
    if req.params.get("weekOf").is_some() {
        return resolve_week(req.params.get("weekOf").and_then(|v| v.as_str()), today);
    }
    let bounds = state.config.year_bounds;
    if let Some(key) = req.params.get("month").and_then(|v| v.as_str()) {
        if key.contains('-') {
            return clamp_month_key(key, today, bounds);
        }
    }
    let mut warnings = Vec::new();
    let year = loose_int(req, "year", &mut warnings);
    let month = loose_int(req, "month", &mut warnings);
    let (period, clamped) = clamp_year_month(year, month, today, bounds);
    warnings.extend(clamped);
    (period, warnings)
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
