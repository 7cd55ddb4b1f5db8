use crate::calendar::Period;
use crate::schedule::{ClassWindow, ScheduleSource};
use chrono::{Datelike, NaiveDate};

/// Concrete meeting dates of a class inside `period`, ascending and unique.
///
/// A date is kept when its weekday is one of the schedule's weekdays and it
/// falls inside the class window. An unscheduled class yields nothing.
pub fn expand_session_dates(
    source: &ScheduleSource,
    window: ClassWindow,
    period: Period,
) -> Vec<NaiveDate> {
    let weekdays = source.weekdays();
    if weekdays.is_empty() {
        match source {
            ScheduleSource::LegacyText(text) => tracing::warn!(
                descriptor = %text,
                "legacy schedule descriptor has no recognizable day prefix; no sessions"
            ),
            _ => tracing::warn!("class has no schedule entries; no sessions"),
        }
        return Vec::new();
    }

    // Period::dates is ascending with one item per day, so the output needs no
    // sort or dedup pass.
    period
        .dates()
        .filter(|d| weekdays.contains(&d.weekday()))
        .filter(|d| window.contains(*d))
        .collect()
}

/// Whether `date` is one of the class's session dates.
pub fn is_session_date(source: &ScheduleSource, window: ClassWindow, date: NaiveDate) -> bool {
    window.contains(date) && source.weekdays().contains(&date.weekday())
}

/// The class's first scheduled day within the Monday-anchored week of
/// `anchor`, clipped to the class window. Used to pick a default date for the
/// marking sheet.
pub fn default_session_in_week(
    source: &ScheduleSource,
    window: ClassWindow,
    anchor: NaiveDate,
) -> Option<NaiveDate> {
    let week = Period::Week {
        start: crate::calendar::week_start(anchor),
    };
    let sessions = expand_session_dates(source, window, week);
    sessions
        .iter()
        .copied()
        .find(|d| *d >= anchor)
        .or_else(|| sessions.last().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{parse_time, ScheduleEntry};
    use chrono::Weekday;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("date")
    }

    fn structured(days: &[Weekday]) -> ScheduleSource {
        ScheduleSource::Structured(
            days.iter()
                .map(|day| ScheduleEntry {
                    id: None,
                    day: *day,
                    start: parse_time("09:00").expect("time"),
                    end: parse_time("10:00").expect("time"),
                    location: None,
                })
                .collect(),
        )
    }

    #[test]
    fn mondays_of_february_inside_window() {
        let window = ClassWindow {
            start_date: Some(d(2025, 1, 1)),
            end_date: Some(d(2025, 3, 31)),
        };
        let dates = expand_session_dates(
            &structured(&[Weekday::Mon]),
            window,
            Period::Month { year: 2025, month: 2 },
        );
        assert_eq!(
            dates,
            vec![d(2025, 2, 3), d(2025, 2, 10), d(2025, 2, 17), d(2025, 2, 24)]
        );
    }

    #[test]
    fn window_clips_both_ends() {
        let window = ClassWindow {
            start_date: Some(d(2025, 2, 5)),
            end_date: Some(d(2025, 2, 20)),
        };
        let dates = expand_session_dates(
            &structured(&[Weekday::Mon, Weekday::Wed]),
            window,
            Period::Month { year: 2025, month: 2 },
        );
        assert_eq!(
            dates,
            vec![d(2025, 2, 5), d(2025, 2, 10), d(2025, 2, 12), d(2025, 2, 17), d(2025, 2, 19)]
        );
    }

    #[test]
    fn repeated_weekday_entries_do_not_duplicate_dates() {
        let src = structured(&[Weekday::Tue, Weekday::Tue]);
        let dates = expand_session_dates(
            &src,
            ClassWindow::default(),
            Period::Week { start: d(2025, 3, 10) },
        );
        assert_eq!(dates, vec![d(2025, 3, 11)]);
    }

    #[test]
    fn no_schedule_or_no_matches_is_empty() {
        let feb = Period::Month { year: 2025, month: 2 };
        assert!(expand_session_dates(&ScheduleSource::Unscheduled, ClassWindow::default(), feb).is_empty());
        assert!(expand_session_dates(
            &ScheduleSource::LegacyText("TBA".into()),
            ClassWindow::default(),
            feb
        )
        .is_empty());
        let closed = ClassWindow {
            start_date: Some(d(2025, 4, 1)),
            end_date: None,
        };
        assert!(expand_session_dates(&structured(&[Weekday::Fri]), closed, feb).is_empty());
    }

    #[test]
    fn legacy_descriptor_expands_its_single_day() {
        let dates = expand_session_dates(
            &ScheduleSource::LegacyText("Thu 14:00 Lab".into()),
            ClassWindow::default(),
            Period::Month { year: 2025, month: 5 },
        );
        assert_eq!(dates.len(), 5);
        assert!(dates.iter().all(|d| d.weekday() == Weekday::Thu));
    }

    #[test]
    fn default_session_prefers_upcoming_day_in_week() {
        let src = structured(&[Weekday::Mon, Weekday::Thu]);
        let w = ClassWindow::default();
        assert_eq!(default_session_in_week(&src, w, d(2025, 3, 11)), Some(d(2025, 3, 13)));
        assert_eq!(default_session_in_week(&src, w, d(2025, 3, 15)), Some(d(2025, 3, 13)));
        assert_eq!(default_session_in_week(&ScheduleSource::Unscheduled, w, d(2025, 3, 15)), None);
    }

    #[test]
    fn session_date_membership() {
        let src = structured(&[Weekday::Mon]);
        let w = ClassWindow {
            start_date: None,
            end_date: Some(d(2025, 3, 31)),
        };
        assert!(is_session_date(&src, w, d(2025, 3, 10)));
        assert!(!is_session_date(&src, w, d(2025, 3, 11)));
        assert!(!is_session_date(&src, w, d(2025, 4, 7)));
    }
}
