use crate::access::{self, Actor};
use crate::calendar::{format_date, Period};
use crate::error::{CoreError, CoreResult};
use crate::schedule::{day_name, format_time, ScheduleEntry};
use crate::store::{self, ClassRow};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde_json::{json, Value};

/// Time axis of the weekly grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotGrid {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub slot_minutes: u32,
}

impl Default for SlotGrid {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
            slot_minutes: 60,
        }
    }
}

impl SlotGrid {
    fn span_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes().max(0)
    }

    pub fn slot_count(&self) -> usize {
        let w = self.slot_minutes.max(1) as i64;
        ((self.span_minutes() + w - 1) / w) as usize
    }

    pub fn slot_starts(&self) -> Vec<NaiveTime> {
        (0..self.slot_count())
            .map(|i| self.start + Duration::minutes(i as i64 * self.slot_minutes as i64))
            .collect()
    }

    /// Slot whose `[slot_start, slot_end)` contains `t`.
    pub fn slot_index(&self, t: NaiveTime) -> Option<usize> {
        if t < self.start || t >= self.end {
            return None;
        }
        let idx = ((t - self.start).num_minutes() / self.slot_minutes.max(1) as i64) as usize;
        (idx < self.slot_count()).then_some(idx)
    }

    /// Slots covered by a session of `minutes`: nearest whole slot with
    /// halves rounding up, never less than one.
    pub fn rowspan(&self, minutes: i64) -> u32 {
        let w = self.slot_minutes.max(1) as i64;
        ((2 * minutes.max(0) + w) / (2 * w)).max(1) as u32
    }
}

/// One class and its structured entries, as fed to the projector.
#[derive(Debug, Clone)]
pub struct TimetableClass {
    pub class: ClassRow,
    pub entries: Vec<ScheduleEntry>,
}

/// A schedule entry landed on a concrete date of the week.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub class_id: String,
    pub class_name: String,
    pub subject: Option<String>,
    pub teacher_user_id: Option<String>,
    pub entry_id: Option<String>,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub location: Option<String>,
}

impl Occurrence {
    fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    fn overlaps(&self, other: &Occurrence) -> bool {
        self.date == other.date && self.start < other.end && other.start < self.end
    }

    pub fn to_json(&self) -> Value {
        json!({
            "classId": self.class_id,
            "className": self.class_name,
            "subject": self.subject,
            "teacherUserId": self.teacher_user_id,
            "entryId": self.entry_id,
            "date": format_date(self.date),
            "dayOfWeek": day_name(self.date.weekday()),
            "startTime": format_time(self.start),
            "endTime": format_time(self.end),
            "location": self.location,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placed {
    pub occurrence: Occurrence,
    pub day_index: usize,
    pub slot_index: usize,
    pub rowspan: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    Teacher,
    Location,
}

impl ConflictReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictReason::Teacher => "teacher",
            ConflictReason::Location => "location",
        }
    }
}

/// Two overlapping occurrences that share a teacher or a room.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub first: Occurrence,
    pub second: Occurrence,
    pub reason: ConflictReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekGrid {
    pub week_start: NaiveDate,
    pub grid: SlotGrid,
    pub placed: Vec<Placed>,
    pub outside_range: Vec<Occurrence>,
    pub conflicts: Vec<Conflict>,
}

impl WeekGrid {
    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..7).map(|i| self.week_start + Duration::days(i)).collect()
    }

    pub fn to_json(&self) -> Value {
        let days: Vec<Value> = self
            .dates()
            .into_iter()
            .map(|d| json!({ "date": format_date(d), "dayOfWeek": day_name(d.weekday()) }))
            .collect();
        let slots: Vec<String> = self.grid.slot_starts().into_iter().map(format_time).collect();
        let entries: Vec<Value> = self
            .placed
            .iter()
            .map(|p| {
                let mut v = p.occurrence.to_json();
                v["dayIndex"] = json!(p.day_index);
                v["slotIndex"] = json!(p.slot_index);
                v["slotStart"] = json!(slots.get(p.slot_index));
                v["rowspan"] = json!(p.rowspan);
                v
            })
            .collect();
        let conflicts: Vec<Value> = self
            .conflicts
            .iter()
            .map(|c| {
                json!({
                    "date": format_date(c.first.date),
                    "reason": c.reason.as_str(),
                    "first": c.first.to_json(),
                    "second": c.second.to_json(),
                })
            })
            .collect();
        json!({
            "weekStart": format_date(self.week_start),
            "weekEnd": format_date(self.week_start + Duration::days(6)),
            "slotMinutes": self.grid.slot_minutes,
            "days": days,
            "slots": slots,
            "entries": entries,
            "outsideRange": self.outside_range.iter().map(Occurrence::to_json).collect::<Vec<_>>(),
            "conflicts": conflicts,
        })
    }
}

fn same_location(a: &Option<String>, b: &Option<String>) -> bool {
    match (a.as_deref().map(str::trim), b.as_deref().map(str::trim)) {
        (Some(x), Some(y)) if !x.is_empty() => x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

fn find_conflicts(occurrences: &[Occurrence]) -> Vec<Conflict> {
    let mut out = Vec::new();
    for (i, a) in occurrences.iter().enumerate() {
        for b in &occurrences[i + 1..] {
            if a.class_id == b.class_id || !a.overlaps(b) {
                continue;
            }
            let reason = if a.teacher_user_id.is_some() && a.teacher_user_id == b.teacher_user_id {
                ConflictReason::Teacher
            } else if same_location(&a.location, &b.location) {
                ConflictReason::Location
            } else {
                continue;
            };
            out.push(Conflict {
                first: a.clone(),
                second: b.clone(),
                reason,
            });
        }
    }
    out
}

/// Lays the structured entries of `classes` onto the Monday-anchored week
/// starting at `week_start`. Classes whose window misses the week, and dates
/// of the week outside a class's window, produce nothing.
pub fn project_week(classes: &[TimetableClass], week_start: NaiveDate, grid: SlotGrid) -> WeekGrid {
    let week_end = week_start + Duration::days(6);
    let mut occurrences = Vec::new();
    for tc in classes {
        let window = tc.class.window();
        if !window.intersects(week_start, week_end) {
            continue;
        }
        for e in &tc.entries {
            let date = week_start + Duration::days(e.day.num_days_from_monday() as i64);
            if !window.contains(date) {
                continue;
            }
            occurrences.push(Occurrence {
                class_id: tc.class.id.clone(),
                class_name: tc.class.fields.name.clone(),
                subject: tc.class.fields.subject.clone(),
                teacher_user_id: tc.class.fields.teacher_user_id.clone(),
                entry_id: e.id.clone(),
                date,
                start: e.start,
                end: e.end,
                location: e.location.clone(),
            });
        }
    }
    occurrences.sort_by(|a, b| {
        (a.date, a.start, &a.class_name, &a.class_id).cmp(&(b.date, b.start, &b.class_name, &b.class_id))
    });

    let mut placed = Vec::new();
    let mut outside_range = Vec::new();
    for occ in &occurrences {
        match grid.slot_index(occ.start) {
            Some(slot_index) => placed.push(Placed {
                day_index: occ.date.weekday().num_days_from_monday() as usize,
                slot_index,
                rowspan: grid.rowspan(occ.duration_minutes()),
                occurrence: occ.clone(),
            }),
            None => {
                tracing::warn!(
                    class_id = %occ.class_id,
                    date = %format_date(occ.date),
                    start = %format_time(occ.start),
                    "session starts outside the timetable grid"
                );
                outside_range.push(occ.clone());
            }
        }
    }

    WeekGrid {
        week_start,
        grid,
        conflicts: find_conflicts(&occurrences),
        placed,
        outside_range,
    }
}

/// The week grid across every class the actor may read.
pub fn timetable_week(
    conn: &Connection,
    actor: Option<&Actor>,
    week: Period,
    grid: SlotGrid,
) -> CoreResult<WeekGrid> {
    let actor = actor.ok_or(CoreError::NoActor)?;
    let week_start = crate::calendar::week_start(week.first_day());
    let mut classes = Vec::new();
    for class in store::list_classes(conn)? {
        if !access::class_access(actor, class.teacher()).read {
            continue;
        }
        let entries = store::schedule_entries(conn, &class.id)?;
        classes.push(TimetableClass { class, entries });
    }
    Ok(project_week(&classes, week_start, grid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{parse_time, ClassWindow};
    use crate::store::ClassFields;
    use chrono::Weekday;

    fn t(raw: &str) -> NaiveTime {
        parse_time(raw).expect("time")
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).expect("date")
    }

    fn class(id: &str, teacher: Option<&str>, window: ClassWindow, entries: Vec<ScheduleEntry>) -> TimetableClass {
        TimetableClass {
            class: ClassRow {
                id: id.to_string(),
                fields: ClassFields {
                    name: format!("Class {}", id),
                    subject: None,
                    teacher_user_id: teacher.map(str::to_string),
                    academic_year: None,
                    schedule_details: None,
                    window,
                },
            },
            entries,
        }
    }

    fn entry(day: Weekday, start: &str, end: &str, location: Option<&str>) -> ScheduleEntry {
        ScheduleEntry {
            id: None,
            day,
            start: t(start),
            end: t(end),
            location: location.map(str::to_string),
        }
    }

    #[test]
    fn ninety_minutes_from_half_past_nine_spans_two_hourly_slots() {
        let classes = vec![class(
            "a",
            None,
            ClassWindow::default(),
            vec![entry(Weekday::Wed, "09:30", "11:00", None)],
        )];
        let g = project_week(&classes, d(3, 10), SlotGrid::default());
        assert_eq!(g.placed.len(), 1);
        let p = &g.placed[0];
        assert_eq!(p.slot_index, 1);
        assert_eq!(g.grid.slot_starts()[p.slot_index], t("09:00"));
        assert_eq!(p.rowspan, 2);
        assert_eq!(p.day_index, 2);
        assert_eq!(p.occurrence.date, d(3, 12));
        assert!(g.outside_range.is_empty());
    }

    #[test]
    fn rowspan_rounds_halves_up_with_minimum_one() {
        let grid = SlotGrid::default();
        assert_eq!(grid.rowspan(20), 1);
        assert_eq!(grid.rowspan(60), 1);
        assert_eq!(grid.rowspan(89), 1);
        assert_eq!(grid.rowspan(90), 2);
        assert_eq!(grid.rowspan(150), 3);
        assert_eq!(grid.slot_count(), 10);
    }

    #[test]
    fn sessions_outside_the_grid_are_reported() {
        let classes = vec![class(
            "a",
            None,
            ClassWindow::default(),
            vec![
                entry(Weekday::Mon, "07:00", "08:00", None),
                entry(Weekday::Mon, "18:00", "19:00", None),
                entry(Weekday::Mon, "17:30", "18:30", None),
            ],
        )];
        let g = project_week(&classes, d(3, 10), SlotGrid::default());
        assert_eq!(g.placed.len(), 1);
        assert_eq!(g.placed[0].slot_index, 9);
        assert_eq!(g.outside_range.len(), 2);
    }

    #[test]
    fn class_window_limits_the_week() {
        let window = ClassWindow {
            start_date: Some(d(3, 12)),
            end_date: Some(d(6, 30)),
        };
        let classes = vec![
            class(
                "a",
                None,
                window,
                vec![
                    entry(Weekday::Mon, "09:00", "10:00", None),
                    entry(Weekday::Fri, "09:00", "10:00", None),
                ],
            ),
            class(
                "b",
                None,
                ClassWindow {
                    start_date: Some(d(4, 1)),
                    end_date: None,
                },
                vec![entry(Weekday::Tue, "09:00", "10:00", None)],
            ),
        ];
        let g = project_week(&classes, d(3, 10), SlotGrid::default());
        assert_eq!(g.placed.len(), 1);
        assert_eq!(g.placed[0].occurrence.date, d(3, 14));
    }

    #[test]
    fn shared_cells_keep_every_entry_and_flag_double_booking() {
        let classes = vec![
            class("a", Some("t1"), ClassWindow::default(), vec![entry(Weekday::Tue, "10:00", "11:00", Some("Lab"))]),
            class("b", Some("t1"), ClassWindow::default(), vec![entry(Weekday::Tue, "10:30", "11:30", Some("R2"))]),
            class("c", Some("t2"), ClassWindow::default(), vec![entry(Weekday::Tue, "10:00", "11:00", Some("lab"))]),
            class("d", Some("t3"), ClassWindow::default(), vec![entry(Weekday::Tue, "11:00", "12:00", Some("Lab"))]),
        ];
        let g = project_week(&classes, d(3, 10), SlotGrid::default());
        assert_eq!(g.placed.iter().filter(|p| p.slot_index == 2).count(), 3);
        assert_eq!(g.conflicts.len(), 2);
        assert!(g
            .conflicts
            .iter()
            .any(|c| c.reason == ConflictReason::Teacher && c.second.class_id == "b"));
        assert!(g
            .conflicts
            .iter()
            .any(|c| c.reason == ConflictReason::Location && c.second.class_id == "c"));
    }
}
