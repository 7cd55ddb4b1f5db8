use crate::attendance::AttendanceStatus;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolidayType {
    PublicHoliday,
    SchoolHoliday,
    SchoolEvent,
    StaffDay,
    Other,
}

impl HolidayType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "public holiday" => Some(Self::PublicHoliday),
            "school holiday" => Some(Self::SchoolHoliday),
            "school event" => Some(Self::SchoolEvent),
            "staff day" => Some(Self::StaffDay),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PublicHoliday => "Public Holiday",
            Self::SchoolHoliday => "School Holiday",
            Self::SchoolEvent => "School Event",
            Self::StaffDay => "Staff Day",
            Self::Other => "Other",
        }
    }

    /// Status an unmarked student gets on a day of this type, if any.
    pub fn default_status(self) -> Option<AttendanceStatus> {
        match self {
            Self::PublicHoliday => Some(AttendanceStatus::PublicHoliday),
            Self::SchoolHoliday => Some(AttendanceStatus::SchoolHoliday),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Holiday {
    pub id: String,
    pub date: NaiveDate,
    pub kind: HolidayType,
    pub name: String,
    pub description: Option<String>,
}

impl Holiday {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "date": crate::calendar::format_date(self.date),
            "type": self.kind.label(),
            "name": self.name,
            "description": self.description,
        })
    }
}

/// Date-keyed view over the holidays touching a run of session dates.
#[derive(Debug, Default)]
pub struct HolidayOverlay {
    by_date: HashMap<NaiveDate, Holiday>,
}

impl HolidayOverlay {
    pub fn new(holidays: impl IntoIterator<Item = Holiday>) -> Self {
        Self {
            by_date: holidays.into_iter().map(|h| (h.date, h)).collect(),
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Holiday> {
        self.by_date.get(&date)
    }

    pub fn default_status(&self, date: NaiveDate) -> Option<AttendanceStatus> {
        self.get(date).and_then(|h| h.kind.default_status())
    }

    /// One entry per input date; holidays never remove a date.
    pub fn annotate(&self, dates: &[NaiveDate]) -> Vec<(NaiveDate, Option<&Holiday>)> {
        dates.iter().map(|d| (*d, self.get(*d))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).expect("date")
    }

    fn holiday(date: NaiveDate, kind: HolidayType) -> Holiday {
        Holiday {
            id: format!("h-{}", date),
            date,
            kind,
            name: kind.label().to_string(),
            description: None,
        }
    }

    #[test]
    fn holiday_types_parse_from_labels_and_codes() {
        assert_eq!(HolidayType::parse("Public Holiday"), Some(HolidayType::PublicHoliday));
        assert_eq!(HolidayType::parse("school_holiday"), Some(HolidayType::SchoolHoliday));
        assert_eq!(HolidayType::parse("staff-day"), Some(HolidayType::StaffDay));
        assert_eq!(HolidayType::parse("long weekend"), None);
    }

    #[test]
    fn only_public_and_school_holidays_carry_a_default() {
        let overlay = HolidayOverlay::new(vec![
            holiday(d(3, 10), HolidayType::PublicHoliday),
            holiday(d(3, 17), HolidayType::SchoolHoliday),
            holiday(d(3, 24), HolidayType::SchoolEvent),
        ]);
        assert_eq!(overlay.default_status(d(3, 10)), Some(AttendanceStatus::PublicHoliday));
        assert_eq!(overlay.default_status(d(3, 17)), Some(AttendanceStatus::SchoolHoliday));
        assert_eq!(overlay.default_status(d(3, 24)), None);
        assert!(overlay.get(d(3, 24)).is_some());
        assert_eq!(overlay.default_status(d(3, 31)), None);
    }

    #[test]
    fn annotate_keeps_every_date() {
        let overlay = HolidayOverlay::new(vec![holiday(d(3, 17), HolidayType::PublicHoliday)]);
        let dates = [d(3, 10), d(3, 17), d(3, 24)];
        let annotated = overlay.annotate(&dates);
        assert_eq!(annotated.len(), 3);
        assert!(annotated[0].1.is_none());
        assert_eq!(annotated[1].1.map(|h| h.kind), Some(HolidayType::PublicHoliday));
    }
}
