use crate::error::{CoreError, CoreResult};
use chrono::{NaiveDate, NaiveTime, Weekday};
use serde_json::{json, Value};

pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// One recurring weekly meeting of a class.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub id: Option<String>,
    pub day: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub location: Option<String>,
}

impl ScheduleEntry {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "dayOfWeek": day_name(self.day),
            "startTime": format_time(self.start),
            "endTime": format_time(self.end),
            "location": self.location,
        })
    }
}

/// The overall active date range of a class. A missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassWindow {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ClassWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |s| date >= s) && self.end_date.map_or(true, |e| date <= e)
    }

    pub fn intersects(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start_date.map_or(true, |s| s <= to) && self.end_date.map_or(true, |e| e >= from)
    }
}

/// Where a class's weekdays come from.
///
/// `LegacyText` only exists for classes that predate structured schedules and
/// carries nothing but a free-text descriptor such as "Mon 9-10 Room 4".
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleSource {
    Structured(Vec<ScheduleEntry>),
    LegacyText(String),
    Unscheduled,
}

impl ScheduleSource {
    pub fn resolve(entries: Vec<ScheduleEntry>, legacy: Option<&str>) -> Self {
        if !entries.is_empty() {
            return ScheduleSource::Structured(entries);
        }
        match legacy.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => ScheduleSource::LegacyText(text.to_string()),
            None => ScheduleSource::Unscheduled,
        }
    }

    /// Configured weekdays, Monday first, without duplicates.
    pub fn weekdays(&self) -> Vec<Weekday> {
        let mut days: Vec<Weekday> = match self {
            ScheduleSource::Structured(entries) => entries.iter().map(|e| e.day).collect(),
            ScheduleSource::LegacyText(text) => legacy_weekday(text).into_iter().collect(),
            ScheduleSource::Unscheduled => Vec::new(),
        };
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        days
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleSource::Structured(_) => "structured",
            ScheduleSource::LegacyText(_) => "legacyText",
            ScheduleSource::Unscheduled => "none",
        }
    }
}

/// Three-letter day prefix of a legacy descriptor, e.g. "Tue/Thu 10:00" -> Tuesday.
pub fn legacy_weekday(descriptor: &str) -> Option<Weekday> {
    let prefix: String = descriptor.trim().chars().take(3).collect();
    if prefix.chars().count() < 3 {
        return None;
    }
    weekday_from_prefix(&prefix.to_ascii_lowercase())
}

fn weekday_from_prefix(prefix: &str) -> Option<Weekday> {
    match prefix {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Accepts a full English day name or its three-letter form, any case.
pub fn parse_weekday(raw: &str) -> Option<Weekday> {
    let t = raw.trim().to_ascii_lowercase();
    if t.len() == 3 {
        return weekday_from_prefix(&t);
    }
    if DAY_NAMES.iter().any(|name| name.eq_ignore_ascii_case(&t)) {
        return weekday_from_prefix(&t[..3]);
    }
    None
}

pub fn day_name(day: Weekday) -> &'static str {
    DAY_NAMES[day.num_days_from_monday() as usize]
}

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
        .ok()
}

pub fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Rejects inverted entries and same-day overlaps within one class.
///
/// Intervals are half-open, so an entry ending at 10:00 and another starting
/// at 10:00 on the same day do not overlap.
pub fn validate_entries(entries: &[ScheduleEntry]) -> CoreResult<()> {
    for (i, e) in entries.iter().enumerate() {
        if e.end <= e.start {
            return Err(CoreError::validation(
                format!("entries[{}].endTime", i),
                format!(
                    "end time {} must be after start time {}",
                    format_time(e.end),
                    format_time(e.start)
                ),
            ));
        }
    }
    for (i, later) in entries.iter().enumerate() {
        for (j, earlier) in entries.iter().enumerate().take(i) {
            if later.day == earlier.day && later.start < earlier.end && earlier.start < later.end {
                return Err(CoreError::validation(
                    format!("entries[{}]", i),
                    format!(
                        "overlapping_schedule: {} {}-{} overlaps entry {} ({}-{})",
                        day_name(later.day),
                        format_time(later.start),
                        format_time(later.end),
                        j,
                        format_time(earlier.start),
                        format_time(earlier.end)
                    ),
                ));
            }
        }
    }
    Ok(())
}
