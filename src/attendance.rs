//! Attendance matrix construction and the transactional mark path.

use crate::access::{self, Actor};
use crate::calendar::{format_date, Period};
use crate::error::{CoreError, CoreResult};
use crate::holidays::HolidayOverlay;
use crate::schedule::{ClassWindow, ScheduleSource};
use crate::sessions::{default_session_in_week, expand_session_dates, is_session_date};
use crate::store::{self, ClassRow, EnrolledStudent, MarkValues, RecordLookup, UpsertEffect};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
    PublicHoliday,
    SchoolHoliday,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 6] = [
        Self::Present,
        Self::Absent,
        Self::Late,
        Self::Excused,
        Self::PublicHoliday,
        Self::SchoolHoliday,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        Self::ALL.into_iter().find(|s| s.as_str().eq_ignore_ascii_case(t))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
            Self::PublicHoliday => "public_holiday",
            Self::SchoolHoliday => "school_holiday",
        }
    }
}

/// Natural identity of an attendance fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttendanceKey {
    pub student_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub session_time: Option<NaiveTime>,
}

impl AttendanceKey {
    /// Stored form of the session time; untimed marks use ''.
    pub fn session_time_column(&self) -> String {
        self.session_time
            .map(crate::schedule::format_time)
            .unwrap_or_default()
    }
}

/// One student × date position of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Recorded(AttendanceStatus),
    Holiday(AttendanceStatus),
    Unmarked,
}

impl Cell {
    pub fn status_str(&self) -> &'static str {
        match self {
            Cell::Recorded(s) | Cell::Holiday(s) => s.as_str(),
            Cell::Unmarked => "",
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Cell::Recorded(_) => "recorded",
            Cell::Holiday(_) => "holiday",
            Cell::Unmarked => "unmarked",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    pub student_id: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<MatrixRow>,
}

impl Matrix {
    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|r| r.cells.len()).sum()
    }

    pub fn cell(&self, student_id: &str, date: NaiveDate) -> Option<Cell> {
        let col = self.dates.iter().position(|d| *d == date)?;
        self.rows
            .iter()
            .find(|r| r.student_id == student_id)
            .and_then(|r| r.cells.get(col).copied())
    }
}

/// Dense matrix over `student_ids × dates`. A recorded status always wins;
/// otherwise a public or school holiday supplies its status; everything else
/// is `Unmarked`.
pub fn assemble_matrix(
    student_ids: &[String],
    dates: &[NaiveDate],
    lookup: &RecordLookup,
    overlay: &HolidayOverlay,
) -> Matrix {
    let rows = student_ids
        .iter()
        .map(|sid| {
            let recorded = lookup.get(sid);
            let cells = dates
                .iter()
                .map(|d| match recorded.and_then(|m| m.get(d)) {
                    Some(rec) => Cell::Recorded(rec.status),
                    None => overlay
                        .default_status(*d)
                        .map(Cell::Holiday)
                        .unwrap_or(Cell::Unmarked),
                })
                .collect();
            MatrixRow {
                student_id: sid.clone(),
                cells,
            }
        })
        .collect();
    Matrix {
        dates: dates.to_vec(),
        rows,
    }
}

/// Holidays covering `[min(dates), max(dates)]`.
pub fn overlay_for(conn: &Connection, dates: &[NaiveDate]) -> CoreResult<HolidayOverlay> {
    match (dates.iter().min(), dates.iter().max()) {
        (Some(from), Some(to)) => Ok(HolidayOverlay::new(store::holidays_between(conn, *from, *to)?)),
        _ => Ok(HolidayOverlay::default()),
    }
}

fn ids_of(students: &[EnrolledStudent]) -> Vec<String> {
    students.iter().map(|s| s.id.clone()).collect()
}

fn holidays_json(overlay: &HolidayOverlay, dates: &[NaiveDate]) -> Vec<Value> {
    overlay
        .annotate(dates)
        .into_iter()
        .filter_map(|(_, h)| h.map(|h| h.to_json()))
        .collect()
}

/// A class plus the pieces every read path needs.
struct ClassContext {
    class: ClassRow,
    source: ScheduleSource,
}

impl ClassContext {
    /// Loads the class, applies `gate` to it, then resolves its schedule.
    fn load(
        conn: &Connection,
        actor: Option<&Actor>,
        class_id: &str,
        gate: fn(Option<&Actor>, &str, Option<&str>) -> CoreResult<()>,
    ) -> CoreResult<Self> {
        let class = store::load_class(conn, class_id)?;
        gate(actor, class_id, class.teacher())?;
        let source = store::schedule_source(conn, &class)?;
        Ok(Self { class, source })
    }

    fn window(&self) -> ClassWindow {
        self.class.window()
    }
}

// ---- read path ------------------------------------------------------------

#[derive(Debug)]
pub struct SessionDates {
    pub class_id: String,
    pub schedule_kind: &'static str,
    pub period: Period,
    pub dates: Vec<NaiveDate>,
    pub overlay: HolidayOverlay,
}

impl SessionDates {
    pub fn to_json(&self) -> Value {
        json!({
            "classId": self.class_id,
            "scheduleKind": self.schedule_kind,
            "period": self.period.key(),
            "dates": self.dates.iter().map(|d| format_date(*d)).collect::<Vec<_>>(),
            "holidays": holidays_json(&self.overlay, &self.dates),
        })
    }
}

pub fn session_dates(
    conn: &Connection,
    actor: Option<&Actor>,
    class_id: &str,
    period: Period,
) -> CoreResult<SessionDates> {
    let ctx = ClassContext::load(conn, actor, class_id, access::require_read)?;
    let dates = expand_session_dates(&ctx.source, ctx.window(), period);
    let overlay = overlay_for(conn, &dates)?;
    Ok(SessionDates {
        class_id: class_id.to_string(),
        schedule_kind: ctx.source.kind(),
        period,
        dates,
        overlay,
    })
}

#[derive(Debug)]
pub struct MonthView {
    pub sessions: SessionDates,
    pub students: Vec<EnrolledStudent>,
    pub matrix: Matrix,
}

impl MonthView {
    pub fn to_json(&self) -> Value {
        let names: HashMap<&str, &str> = self
            .students
            .iter()
            .map(|s| (s.id.as_str(), s.display_name.as_str()))
            .collect();
        let rows: Vec<Value> = self
            .matrix
            .rows
            .iter()
            .map(|r| {
                json!({
                    "studentId": r.student_id,
                    "displayName": names.get(r.student_id.as_str()),
                    "statuses": r.cells.iter().map(|c| c.status_str()).collect::<Vec<_>>(),
                    "sources": r.cells.iter().map(|c| c.source()).collect::<Vec<_>>(),
                })
            })
            .collect();
        let mut out = self.sessions.to_json();
        out["cellCount"] = json!(self.matrix.cell_count());
        out["rows"] = json!(rows);
        out
    }
}

/// Session dates of `period` reconciled against stored marks for every active
/// enrolled student.
pub fn month_matrix(
    conn: &Connection,
    actor: Option<&Actor>,
    class_id: &str,
    period: Period,
) -> CoreResult<MonthView> {
    let sessions = session_dates(conn, actor, class_id, period)?;
    let students = store::enrolled_students(conn, class_id, true)?;
    let student_ids = ids_of(&students);
    let lookup = store::records_for(conn, class_id, &student_ids, &sessions.dates)?;
    let matrix = assemble_matrix(&student_ids, &sessions.dates, &lookup, &sessions.overlay);
    Ok(MonthView {
        sessions,
        students,
        matrix,
    })
}

#[derive(Debug)]
pub struct DaySheet {
    pub class_id: String,
    pub date: NaiveDate,
    pub is_session_date: bool,
    pub holiday: Option<Value>,
    pub rows: Vec<Value>,
    pub warnings: Vec<String>,
}

impl DaySheet {
    pub fn to_json(&self) -> Value {
        json!({
            "classId": self.class_id,
            "date": format_date(self.date),
            "isSessionDate": self.is_session_date,
            "holiday": self.holiday,
            "suggestedStatus": AttendanceStatus::Present.as_str(),
            "rows": self.rows,
            "warnings": self.warnings,
        })
    }
}

/// The single-date marking view. Without a usable date it falls back to the
/// class's session in the current week, or `today` for unscheduled classes.
pub fn day_sheet(
    conn: &Connection,
    actor: Option<&Actor>,
    class_id: &str,
    requested: Option<NaiveDate>,
    today: NaiveDate,
) -> CoreResult<DaySheet> {
    let ctx = ClassContext::load(conn, actor, class_id, access::require_read)?;

    let scheduled = !ctx.source.weekdays().is_empty();
    let fallback = || default_session_in_week(&ctx.source, ctx.window(), today).unwrap_or(today);
    let mut warnings = Vec::new();
    let date = match requested {
        Some(d) if !scheduled || is_session_date(&ctx.source, ctx.window(), d) => d,
        Some(d) => {
            let f = fallback();
            warnings.push(format!(
                "{} is not a session date of this class; showing {}",
                format_date(d),
                format_date(f)
            ));
            f
        }
        None => fallback(),
    };

    let students = store::enrolled_students(conn, class_id, true)?;
    let student_ids = ids_of(&students);
    let dates = [date];
    let lookup = store::records_for(conn, class_id, &student_ids, &dates)?;
    let overlay = overlay_for(conn, &dates)?;
    let matrix = assemble_matrix(&student_ids, &dates, &lookup, &overlay);

    let rows = students
        .iter()
        .zip(matrix.rows.iter())
        .map(|(s, row)| {
            let remarks = lookup
                .get(&s.id)
                .and_then(|m| m.get(&date))
                .and_then(|r| r.remarks.clone());
            json!({
                "studentId": s.id,
                "displayName": s.display_name,
                "status": row.cells[0].status_str(),
                "source": row.cells[0].source(),
                "remarks": remarks,
            })
        })
        .collect();

    Ok(DaySheet {
        class_id: class_id.to_string(),
        date,
        is_session_date: is_session_date(&ctx.source, ctx.window(), date),
        holiday: overlay.get(date).map(|h| h.to_json()),
        rows,
        warnings,
    })
}

// ---- write path -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MarkEntry {
    pub student_id: String,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Inserts that found a row created after the read pass and became updates.
    pub conflicts_resolved: usize,
}

impl MarkOutcome {
    pub fn to_json(&self) -> Value {
        json!({
            "inserted": self.inserted,
            "updated": self.updated,
            "unchanged": self.unchanged,
            "conflictsResolved": self.conflicts_resolved,
        })
    }
}

fn validate_batch(
    ctx: &ClassContext,
    date: NaiveDate,
    entries: &[MarkEntry],
    enrolled: &HashSet<String>,
) -> CoreResult<()> {
    if !ctx.window().contains(date) {
        return Err(CoreError::validation(
            "date",
            format!("{} is outside the class's active dates", format_date(date)),
        ));
    }
    if !ctx.source.weekdays().is_empty() && !is_session_date(&ctx.source, ctx.window(), date) {
        return Err(CoreError::validation(
            "date",
            format!("{} is not a session date of this class", format_date(date)),
        ));
    }
    let mut seen = HashSet::new();
    for (i, e) in entries.iter().enumerate() {
        if !seen.insert(e.student_id.as_str()) {
            return Err(CoreError::validation(
                format!("entries[{}].studentId", i),
                format!("student {} appears more than once", e.student_id),
            ));
        }
        if !enrolled.contains(&e.student_id) {
            return Err(CoreError::validation(
                format!("entries[{}].studentId", i),
                format!("student {} is not actively enrolled in this class", e.student_id),
            ));
        }
    }
    Ok(())
}

/// Writes `entries` under untimed keys for `date`, using `existing` (the
/// read pass) to pick between an in-place update and the atomic upsert.
///
/// A key `existing` says is present but which has since vanished is inserted;
/// a key it missed but which another writer created is updated and counted in
/// `conflicts_resolved`. The first failing row aborts with its student id.
pub fn apply_marks(
    conn: &Connection,
    class_id: &str,
    date: NaiveDate,
    entries: &[MarkEntry],
    existing: &RecordLookup,
    recorded_by: Option<&str>,
    now: &str,
) -> CoreResult<MarkOutcome> {
    let mut outcome = MarkOutcome::default();
    for e in entries {
        let key = AttendanceKey {
            student_id: e.student_id.clone(),
            class_id: class_id.to_string(),
            date,
            session_time: None,
        };
        let values = MarkValues {
            status: e.status,
            remarks: e.remarks.as_deref(),
            recorded_by,
        };
        // Only the exact key counts; a timed record on the same date does not.
        let matched = existing
            .get(&e.student_id)
            .and_then(|m| m.get(&date))
            .is_some_and(|r| r.session_time == key.session_time_column());

        let write = || -> CoreResult<UpsertEffect> {
            if matched {
                match store::update_by_key(conn, &key, &values, now)? {
                    UpsertEffect::Missing => store::upsert_by_key(conn, &key, &values, now),
                    effect => Ok(effect),
                }
            } else {
                store::upsert_by_key(conn, &key, &values, now)
            }
        };
        let effect = write().map_err(|err| CoreError::Transaction {
            student_id: e.student_id.clone(),
            cause: err.to_string(),
        })?;

        match (matched, effect) {
            (_, UpsertEffect::Inserted) => outcome.inserted += 1,
            (true, UpsertEffect::Updated) => outcome.updated += 1,
            (true, UpsertEffect::Unchanged) => outcome.unchanged += 1,
            (false, UpsertEffect::Updated) => {
                outcome.updated += 1;
                outcome.conflicts_resolved += 1;
            }
            (false, UpsertEffect::Unchanged) => {
                outcome.unchanged += 1;
                outcome.conflicts_resolved += 1;
            }
            (_, UpsertEffect::Missing) => {
                return Err(CoreError::Transaction {
                    student_id: e.student_id.clone(),
                    cause: "mark was not stored".into(),
                })
            }
        }
    }
    Ok(outcome)
}

/// Saves one date's marks for a class as a single transaction.
///
/// Any failure rolls back the whole batch.
pub fn mark_attendance(
    conn: &Connection,
    actor: Option<&Actor>,
    class_id: &str,
    date: NaiveDate,
    entries: &[MarkEntry],
) -> CoreResult<MarkOutcome> {
    let ctx = ClassContext::load(conn, actor, class_id, access::require_write)?;
    let recorded_by = actor.map(|a| a.user_id.as_str());

    let enrolled: HashSet<String> = ids_of(&store::enrolled_students(conn, class_id, true)?)
        .into_iter()
        .collect();
    validate_batch(&ctx, date, entries, &enrolled)?;

    let tx = conn.unchecked_transaction()?;
    let student_ids: Vec<String> = entries.iter().map(|e| e.student_id.clone()).collect();
    let existing = store::records_for(&tx, class_id, &student_ids, &[date])?;
    let outcome = apply_marks(&tx, class_id, date, entries, &existing, recorded_by, &store::now_ts())?;

    tx.commit().map_err(|err| CoreError::Transaction {
        student_id: String::new(),
        cause: err.to_string(),
    })?;
    tracing::info!(
        class_id,
        date = %format_date(date),
        inserted = outcome.inserted,
        updated = outcome.updated,
        unchanged = outcome.unchanged,
        conflicts = outcome.conflicts_resolved,
        "attendance batch committed"
    );
    Ok(outcome)
}

// ---- summary --------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentTally {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    pub holiday: usize,
    pub recorded: usize,
}

impl StudentTally {
    fn add(&mut self, status: AttendanceStatus) {
        self.recorded += 1;
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Excused => self.excused += 1,
            AttendanceStatus::PublicHoliday | AttendanceStatus::SchoolHoliday => self.holiday += 1,
        }
    }

    /// Share of attended sessions (present or late) among non-holiday marks.
    pub fn attendance_rate(&self) -> Option<f64> {
        let counted = self.recorded - self.holiday;
        (counted > 0).then(|| (self.present + self.late) as f64 / counted as f64)
    }
}

/// Per-student tallies of recorded marks for a class, optionally bounded by
/// date, plus the number of distinct dates with any mark.
pub fn class_summary(
    conn: &Connection,
    actor: Option<&Actor>,
    class_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> CoreResult<Value> {
    let class = store::load_class(conn, class_id)?;
    access::require_read(actor, class_id, class.teacher())?;
    let students = store::enrolled_students(conn, class_id, true)?;
    let records = store::class_records(conn, class_id, from, to)?;

    let distinct_dates: BTreeSet<NaiveDate> = records.iter().map(|(_, d, _)| *d).collect();
    let mut tallies: HashMap<&str, StudentTally> = students
        .iter()
        .map(|s| (s.id.as_str(), StudentTally::default()))
        .collect();
    for (student_id, _, status) in &records {
        if let Some(t) = tallies.get_mut(student_id.as_str()) {
            t.add(*status);
        }
    }

    let rows: Vec<Value> = students
        .iter()
        .map(|s| {
            let t = tallies.get(s.id.as_str()).cloned().unwrap_or_default();
            json!({
                "studentId": s.id,
                "displayName": s.display_name,
                "present": t.present,
                "absent": t.absent,
                "late": t.late,
                "excused": t.excused,
                "holiday": t.holiday,
                "totalRecorded": t.recorded,
                "attendanceRate": t.attendance_rate(),
            })
        })
        .collect();

    Ok(json!({
        "classId": class_id,
        "from": from.map(format_date),
        "to": to.map(format_date),
        "uniqueSessionDates": distinct_dates.len(),
        "students": rows,
    }))
}

// ---- dashboard ------------------------------------------------------------

/// Headline numbers for managers: active people, classes, and the marks
/// recorded on `day` with the share that were present or late.
pub fn dashboard_stats(conn: &Connection, actor: Option<&Actor>, day: NaiveDate) -> CoreResult<Value> {
    access::require_manager(actor)?;
    let c = store::dashboard_counts(conn, day)?;
    let rate = (c.records_on_day > 0).then(|| c.present_or_late_on_day as f64 / c.records_on_day as f64);
    Ok(json!({
        "date": format_date(day),
        "activeStudents": c.active_students,
        "activeTeachers": c.active_teachers,
        "subjects": c.subjects,
        "classes": c.classes,
        "recordsOnDate": c.records_on_day,
        "presentOrLateOnDate": c.present_or_late_on_day,
        "attendanceRate": rate,
    }))
}
