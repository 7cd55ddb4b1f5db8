//! Runtime configuration loaded from `.env` and environment variables.
//!
//! Nothing here is fatal: a malformed value falls back to its default and the
//! problem is kept in `warnings` so `main` can log it once tracing is up.

use crate::calendar::YearBounds;
use crate::schedule::parse_time;
use crate::timetable::SlotGrid;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_filter: String,
    pub workspace: Option<PathBuf>,
    pub year_bounds: YearBounds,
    pub slot_grid: SlotGrid,
    pub busy_timeout: Duration,
    pub warnings: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_filter: "attendanced=info".into(),
            workspace: None,
            year_bounds: YearBounds { min: 2000, max: 2100 },
            slot_grid: SlotGrid::default(),
            busy_timeout: Duration::from_millis(5000),
            warnings: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = AppConfig::default();
        let mut warnings = Vec::new();

        if let Some(filter) = lookup("ATTENDANCED_LOG").filter(|s| !s.trim().is_empty()) {
            cfg.log_filter = filter;
        }
        cfg.workspace = lookup("ATTENDANCED_WORKSPACE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let min_year = number(&lookup, "ATTENDANCED_MIN_YEAR", cfg.year_bounds.min, &mut warnings);
        let max_year = number(&lookup, "ATTENDANCED_MAX_YEAR", cfg.year_bounds.max, &mut warnings);
        let min_year = supported_year("ATTENDANCED_MIN_YEAR", min_year, &mut warnings);
        let max_year = supported_year("ATTENDANCED_MAX_YEAR", max_year, &mut warnings);
        if min_year <= max_year {
            cfg.year_bounds = YearBounds {
                min: min_year,
                max: max_year,
            };
        } else {
            warnings.push(format!(
                "ATTENDANCED_MIN_YEAR {} exceeds ATTENDANCED_MAX_YEAR {}; using defaults",
                min_year, max_year
            ));
        }

        let start = time(&lookup, "ATTENDANCED_SLOT_START", &mut warnings);
        let end = time(&lookup, "ATTENDANCED_SLOT_END", &mut warnings);
        let slot_minutes: u32 = number(
            &lookup,
            "ATTENDANCED_SLOT_MINUTES",
            cfg.slot_grid.slot_minutes,
            &mut warnings,
        );
        let grid = SlotGrid {
            start: start.unwrap_or(cfg.slot_grid.start),
            end: end.unwrap_or(cfg.slot_grid.end),
            slot_minutes,
        };
        if grid.end > grid.start && slot_minutes > 0 {
            cfg.slot_grid = grid;
        } else {
            warnings.push("timetable grid is empty or has zero-width slots; using 08:00-18:00 hourly".into());
        }

        let busy_ms: u64 = number(&lookup, "ATTENDANCED_BUSY_TIMEOUT_MS", 5000, &mut warnings);
        cfg.busy_timeout = Duration::from_millis(busy_ms);

        cfg.warnings = warnings;
        cfg
    }
}

fn number<T: FromStr + std::fmt::Display + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    warnings: &mut Vec<String>,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warnings.push(format!("{} '{}' is not a valid number; using {}", key, raw, default));
            default
        }),
        None => default,
    }
}

fn supported_year(key: &str, year: i32, warnings: &mut Vec<String>) -> i32 {
    let supported = YearBounds::supported();
    if supported.contains(year) {
        return year;
    }
    let clamped = year.clamp(supported.min, supported.max);
    warnings.push(format!("{} {} is outside the calendar range; using {}", key, year, clamped));
    clamped
}

fn time(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    warnings: &mut Vec<String>,
) -> Option<chrono::NaiveTime> {
    let raw = lookup(key)?;
    let parsed = parse_time(&raw);
    if parsed.is_none() {
        warnings.push(format!("{} '{}' is not HH:MM; using default", key, raw));
    }
    parsed
}
