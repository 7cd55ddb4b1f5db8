use chrono::{Datelike, Duration, NaiveDate};

/// Accepted range for caller-supplied years.
#[derive(Debug, Clone, Copy)]
pub struct YearBounds {
    pub min: i32,
    pub max: i32,
}

impl YearBounds {
    /// Years whose months and weeks chrono can represent along with their
    /// neighbouring days.
    pub fn supported() -> Self {
        Self {
            min: NaiveDate::MIN.year() + 1,
            max: NaiveDate::MAX.year() - 1,
        }
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

/// A calendar window the session expander can enumerate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Period {
    Month { year: i32, month: u32 },
    Week { start: NaiveDate },
}

impl Period {
    pub fn first_day(&self) -> NaiveDate {
        match *self {
            Period::Month { year, month } => first_of_month(year, month),
            Period::Week { start } => start,
        }
    }

    pub fn last_day(&self) -> NaiveDate {
        match *self {
            Period::Month { year, month } => {
                let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                first_of_month(ny, nm) - Duration::days(1)
            }
            Period::Week { start } => start + Duration::days(6),
        }
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last_day();
        self.first_day().iter_days().take_while(move |d| *d <= last)
    }

    pub fn key(&self) -> String {
        match *self {
            Period::Month { year, month } => format!("{:04}-{:02}", year, month),
            Period::Week { start } => format!("week-of-{}", format_date(start)),
        }
    }
}

// Callers only construct months that passed `clamp_year_month`.
fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Tolerant (year, month) resolution: anything unusable falls back to the
/// corresponding part of `today` and leaves a warning.
pub fn clamp_year_month(
    year: Option<i64>,
    month: Option<i64>,
    today: NaiveDate,
    bounds: YearBounds,
) -> (Period, Vec<String>) {
    let mut warnings = Vec::new();
    let year = match year {
        Some(y) if (bounds.min as i64..=bounds.max as i64).contains(&y) => y as i32,
        Some(y) => {
            warnings.push(format!(
                "year {} outside {}..={}; using {}",
                y,
                bounds.min,
                bounds.max,
                today.year()
            ));
            today.year()
        }
        None => today.year(),
    };
    let month = match month {
        Some(m) if (1..=12).contains(&m) => m as u32,
        Some(m) => {
            warnings.push(format!("month {} outside 1..=12; using {}", m, today.month()));
            today.month()
        }
        None => today.month(),
    };
    (Period::Month { year, month }, warnings)
}

/// Parses "YYYY-MM" (or a bare "MM") month keys, then clamps like
/// [`clamp_year_month`].
pub fn clamp_month_key(raw: &str, today: NaiveDate, bounds: YearBounds) -> (Period, Vec<String>) {
    let t = raw.trim();
    let (year, month) = match t.split_once('-') {
        Some((y, m)) => (y.parse::<i64>().ok(), m.parse::<i64>().ok()),
        None => (Some(today.year() as i64), t.parse::<i64>().ok()),
    };
    let (period, mut warnings) = clamp_year_month(year, month, today, bounds);
    if year.is_none() || month.is_none() {
        warnings.insert(0, format!("malformed month '{}'; using {}", t, period.key()));
    }
    (period, warnings)
}

/// Week anchor: a malformed or missing date falls back to `today`.
pub fn resolve_week(raw: Option<&str>, today: NaiveDate) -> (Period, Vec<String>) {
    let mut warnings = Vec::new();
    let anchor = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_date(s)
            .filter(|d| YearBounds::supported().contains(d.year()))
            .unwrap_or_else(|| {
                warnings.push(format!("malformed date '{}'; using {}", s, format_date(today)));
                today
            }),
        None => today,
    };
    (Period::Week { start: week_start(anchor) }, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: YearBounds = YearBounds { min: 2000, max: 2100 };

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("date")
    }

    #[test]
    fn month_period_spans_whole_month() {
        let feb = Period::Month { year: 2024, month: 2 };
        assert_eq!(feb.first_day(), d(2024, 2, 1));
        assert_eq!(feb.last_day(), d(2024, 2, 29));
        assert_eq!(feb.dates().count(), 29);
        let dec = Period::Month { year: 2025, month: 12 };
        assert_eq!(dec.last_day(), d(2025, 12, 31));
    }

    #[test]
    fn week_is_monday_anchored() {
        assert_eq!(week_start(d(2025, 3, 13)), d(2025, 3, 10));
        assert_eq!(week_start(d(2025, 3, 10)), d(2025, 3, 10));
        assert_eq!(week_start(d(2025, 3, 16)), d(2025, 3, 10));
        let (p, w) = resolve_week(Some("2025-03-16"), d(2000, 1, 1));
        assert!(w.is_empty());
        assert_eq!(p.last_day(), d(2025, 3, 16));
    }

    #[test]
    fn out_of_range_inputs_fall_back_to_today() {
        let today = d(2025, 6, 15);
        let (p, w) = clamp_year_month(Some(1850), Some(13), today, BOUNDS);
        assert_eq!(p, Period::Month { year: 2025, month: 6 });
        assert_eq!(w.len(), 2);

        let (p, w) = clamp_year_month(Some(2024), Some(2), today, BOUNDS);
        assert_eq!(p, Period::Month { year: 2024, month: 2 });
        assert!(w.is_empty());
    }

    #[test]
    fn month_keys_are_tolerant() {
        let today = d(2025, 6, 15);
        assert_eq!(
            clamp_month_key("2025-02", today, BOUNDS).0,
            Period::Month { year: 2025, month: 2 }
        );
        assert_eq!(
            clamp_month_key("9", today, BOUNDS).0,
            Period::Month { year: 2025, month: 9 }
        );
        let (p, w) = clamp_month_key("feb", today, BOUNDS);
        assert_eq!(p, Period::Month { year: 2025, month: 6 });
        assert!(!w.is_empty());
    }

    #[test]
    fn supported_years_keep_month_edges_representable() {
        let supported = YearBounds::supported();
        for year in [supported.min, supported.max] {
            let dec = Period::Month { year, month: 12 };
            assert_eq!(dec.last_day(), d(year, 12, 31));
            let jan = Period::Month { year, month: 1 };
            assert_eq!(jan.first_day(), d(year, 1, 1));
        }
        assert!(!supported.contains(NaiveDate::MAX.year()));
    }

    #[test]
    fn malformed_week_anchor_uses_today() {
        let today = d(2025, 3, 12);
        let (p, w) = resolve_week(Some("12/03/2025"), today);
        assert_eq!(p.first_day(), d(2025, 3, 10));
        assert_eq!(w.len(), 1);
    }
}
