//! SQLite persistence for classes, schedules, enrollments, holidays and
//! attendance facts. Every function takes a plain `&Connection` so callers can
//! pass a transaction (it derefs to one) when they need atomicity.

use crate::access::{Actor, Role};
use crate::attendance::{AttendanceKey, AttendanceStatus};
use crate::calendar::{format_date, parse_date};
use crate::error::{CoreError, CoreResult};
use crate::holidays::{Holiday, HolidayType};
use crate::schedule::{day_name, format_time, parse_time, parse_weekday, ClassWindow, ScheduleEntry, ScheduleSource};
use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn opt_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.as_deref().and_then(parse_date)
}

// ---- users ----------------------------------------------------------------

pub fn insert_user(
    conn: &Connection,
    username: &str,
    display_name: Option<&str>,
    role: Role,
) -> CoreResult<String> {
    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE username = ?", [username], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(CoreError::validation("username", format!("username '{}' is taken", username)));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, username, display_name, role, is_active, created_at)
         VALUES(?, ?, ?, ?, 1, ?)",
        params![id, username, display_name, role.as_str(), now_ts()],
    )?;
    Ok(id)
}

pub fn user_count(conn: &Connection) -> CoreResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?)
}

pub fn list_users(conn: &Connection) -> CoreResult<Vec<JsonValue>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, display_name, role, is_active FROM users ORDER BY username",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "username": r.get::<_, String>(1)?,
                "displayName": r.get::<_, Option<String>>(2)?,
                "role": r.get::<_, String>(3)?,
                "active": r.get::<_, i64>(4)? != 0,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Resolves an active user into an [`Actor`].
pub fn load_actor(conn: &Connection, user_id: &str) -> CoreResult<Actor> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT role, is_active FROM users WHERE id = ?",
            [user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((role, active)) = row else {
        return Err(CoreError::NotFound("user"));
    };
    if active == 0 {
        return Err(CoreError::validation("userId", "user is inactive"));
    }
    let role = Role::parse(&role).ok_or_else(|| CoreError::Corrupt(format!("role '{}'", role)))?;
    Ok(Actor {
        user_id: user_id.to_string(),
        role,
    })
}

// ---- classes --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFields {
    pub name: String,
    pub subject: Option<String>,
    pub teacher_user_id: Option<String>,
    pub academic_year: Option<String>,
    pub schedule_details: Option<String>,
    pub window: ClassWindow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRow {
    pub id: String,
    pub fields: ClassFields,
}

impl ClassRow {
    pub fn window(&self) -> ClassWindow {
        self.fields.window
    }

    pub fn teacher(&self) -> Option<&str> {
        self.fields.teacher_user_id.as_deref()
    }

    pub fn to_json(&self) -> JsonValue {
        let f = &self.fields;
        json!({
            "id": self.id,
            "name": f.name,
            "subject": f.subject,
            "teacherUserId": f.teacher_user_id,
            "academicYear": f.academic_year,
            "scheduleDetails": f.schedule_details,
            "startDate": f.window.start_date.map(format_date),
            "endDate": f.window.end_date.map(format_date),
        })
    }
}

const CLASS_COLUMNS: &str =
    "id, name, subject, teacher_user_id, academic_year, schedule_details, start_date, end_date";

fn class_from_row(r: &Row<'_>) -> rusqlite::Result<ClassRow> {
    Ok(ClassRow {
        id: r.get(0)?,
        fields: ClassFields {
            name: r.get(1)?,
            subject: r.get(2)?,
            teacher_user_id: r.get(3)?,
            academic_year: r.get(4)?,
            schedule_details: r.get(5)?,
            window: ClassWindow {
                start_date: opt_date(r.get(6)?),
                end_date: opt_date(r.get(7)?),
            },
        },
    })
}

fn check_window(window: ClassWindow) -> CoreResult<()> {
    if let (Some(s), Some(e)) = (window.start_date, window.end_date) {
        if e < s {
            return Err(CoreError::validation("endDate", "end date must not precede start date"));
        }
    }
    Ok(())
}

pub fn insert_class(conn: &Connection, fields: &ClassFields) -> CoreResult<String> {
    check_window(fields.window)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, subject, teacher_user_id, academic_year, schedule_details, start_date, end_date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            fields.name,
            fields.subject,
            fields.teacher_user_id,
            fields.academic_year,
            fields.schedule_details,
            fields.window.start_date.map(format_date),
            fields.window.end_date.map(format_date),
            now_ts()
        ],
    )?;
    Ok(id)
}

pub fn update_class(conn: &Connection, class_id: &str, fields: &ClassFields) -> CoreResult<()> {
    check_window(fields.window)?;
    let changed = conn.execute(
        "UPDATE classes SET name = ?, subject = ?, teacher_user_id = ?, academic_year = ?,
           schedule_details = ?, start_date = ?, end_date = ?
         WHERE id = ?",
        params![
            fields.name,
            fields.subject,
            fields.teacher_user_id,
            fields.academic_year,
            fields.schedule_details,
            fields.window.start_date.map(format_date),
            fields.window.end_date.map(format_date),
            class_id
        ],
    )?;
    if changed == 0 {
        return Err(CoreError::NotFound("class"));
    }
    Ok(())
}

pub fn load_class(conn: &Connection, class_id: &str) -> CoreResult<ClassRow> {
    conn.query_row(
        &format!("SELECT {} FROM classes WHERE id = ?", CLASS_COLUMNS),
        [class_id],
        class_from_row,
    )
    .optional()?
    .ok_or(CoreError::NotFound("class"))
}

pub fn list_classes(conn: &Connection) -> CoreResult<Vec<ClassRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM classes ORDER BY name, id",
        CLASS_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], class_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Deletes a class together with its schedules and enrollments. Classes that
/// already hold attendance facts are kept.
pub fn delete_class(conn: &Connection, class_id: &str) -> CoreResult<()> {
    let records: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance_records WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    if records > 0 {
        return Err(CoreError::validation(
            "classId",
            format!("class has {} attendance records and cannot be deleted", records),
        ));
    }
    let changed = conn.execute("DELETE FROM classes WHERE id = ?", [class_id])?;
    if changed == 0 {
        return Err(CoreError::NotFound("class"));
    }
    Ok(())
}

// ---- schedules ------------------------------------------------------------

pub fn schedule_entries(conn: &Connection, class_id: &str) -> CoreResult<Vec<ScheduleEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, day_of_week, start_time, end_time, location
         FROM class_schedules
         WHERE class_id = ?",
    )?;
    let raw = stmt
        .query_map([class_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut entries = Vec::with_capacity(raw.len());
    for (id, day, start, end, location) in raw {
        let (Some(day), Some(start), Some(end)) = (parse_weekday(&day), parse_time(&start), parse_time(&end))
        else {
            return Err(CoreError::Corrupt(format!("schedule entry {}", id)));
        };
        entries.push(ScheduleEntry {
            id: Some(id),
            day,
            start,
            end,
            location,
        });
    }
    entries.sort_by_key(|e| (e.day.num_days_from_monday(), e.start));
    Ok(entries)
}

/// Replaces a class's schedule with `entries`: ids present are updated, ids
/// missing from the submission are deleted, entries without an id are
/// inserted. Runs in one transaction; the caller validates first.
pub fn replace_schedule_entries(
    conn: &Connection,
    class_id: &str,
    entries: &[ScheduleEntry],
) -> CoreResult<Vec<ScheduleEntry>> {
    let tx = conn.unchecked_transaction()?;
    let existing: HashSet<String> = schedule_entries(&tx, class_id)?
        .into_iter()
        .filter_map(|e| e.id)
        .collect();
    let kept: HashSet<&str> = entries.iter().filter_map(|e| e.id.as_deref()).collect();

    for stale in existing.iter().filter(|id| !kept.contains(id.as_str())) {
        tx.execute("DELETE FROM class_schedules WHERE id = ?", [stale])?;
    }
    for e in entries {
        match e.id.as_deref() {
            Some(id) if existing.contains(id) => {
                tx.execute(
                    "UPDATE class_schedules SET day_of_week = ?, start_time = ?, end_time = ?, location = ?
                     WHERE id = ? AND class_id = ?",
                    params![
                        day_name(e.day),
                        format_time(e.start),
                        format_time(e.end),
                        e.location,
                        id,
                        class_id
                    ],
                )?;
            }
            Some(id) => {
                return Err(CoreError::validation(
                    "entries.id",
                    format!("schedule entry {} does not belong to this class", id),
                ));
            }
            None => {
                tx.execute(
                    "INSERT INTO class_schedules(id, class_id, day_of_week, start_time, end_time, location, created_at)
                     VALUES(?, ?, ?, ?, ?, ?, ?)",
                    params![
                        Uuid::new_v4().to_string(),
                        class_id,
                        day_name(e.day),
                        format_time(e.start),
                        format_time(e.end),
                        e.location,
                        now_ts()
                    ],
                )?;
            }
        }
    }
    let saved = schedule_entries(&tx, class_id)?;
    tx.commit()?;
    Ok(saved)
}

pub fn schedule_source(conn: &Connection, class: &ClassRow) -> CoreResult<ScheduleSource> {
    let entries = schedule_entries(conn, &class.id)?;
    Ok(ScheduleSource::resolve(
        entries,
        class.fields.schedule_details.as_deref(),
    ))
}

// ---- students & enrollments ----------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EnrolledStudent {
    pub id: String,
    pub display_name: String,
    pub active: bool,
    pub enrollment_date: String,
}

impl EnrolledStudent {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "id": self.id,
            "displayName": self.display_name,
            "active": self.active,
            "enrollmentDate": self.enrollment_date,
        })
    }
}

pub fn insert_student(
    conn: &Connection,
    student_number: &str,
    last_name: &str,
    first_name: &str,
) -> CoreResult<String> {
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE student_number = ?",
            [student_number],
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(CoreError::validation(
            "studentNumber",
            format!("student number '{}' is already in use", student_number),
        ));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, student_number, last_name, first_name, is_active, created_at)
         VALUES(?, ?, ?, ?, 1, ?)",
        params![id, student_number, last_name, first_name, now_ts()],
    )?;
    Ok(id)
}

pub fn list_students(conn: &Connection) -> CoreResult<Vec<JsonValue>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_number, last_name, first_name, is_active
         FROM students
         ORDER BY last_name, first_name, id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentNumber": r.get::<_, String>(1)?,
                "lastName": r.get::<_, String>(2)?,
                "firstName": r.get::<_, String>(3)?,
                "active": r.get::<_, i64>(4)? != 0,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_student_active(conn: &Connection, student_id: &str, active: bool) -> CoreResult<()> {
    let changed = conn.execute(
        "UPDATE students SET is_active = ? WHERE id = ?",
        params![active as i64, student_id],
    )?;
    if changed == 0 {
        return Err(CoreError::NotFound("student"));
    }
    Ok(())
}

pub fn enroll(conn: &Connection, class_id: &str, student_id: &str, on: NaiveDate) -> CoreResult<bool> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(CoreError::NotFound("student"));
    }
    let inserted = conn.execute(
        "INSERT INTO enrollments(student_id, class_id, enrollment_date) VALUES(?, ?, ?)
         ON CONFLICT(student_id, class_id) DO NOTHING",
        params![student_id, class_id, format_date(on)],
    )?;
    Ok(inserted > 0)
}

/// Removes the join row only; past attendance facts stay.
pub fn unenroll(conn: &Connection, class_id: &str, student_id: &str) -> CoreResult<bool> {
    let removed = conn.execute(
        "DELETE FROM enrollments WHERE class_id = ? AND student_id = ?",
        params![class_id, student_id],
    )?;
    Ok(removed > 0)
}

/// Enrolled students of a class ordered by name. With `active_only`, students
/// flagged inactive are left out.
pub fn enrolled_students(
    conn: &Connection,
    class_id: &str,
    active_only: bool,
) -> CoreResult<Vec<EnrolledStudent>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.last_name, s.first_name, s.is_active, e.enrollment_date
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.class_id = ? AND (? = 0 OR s.is_active = 1)
         ORDER BY s.last_name, s.first_name, s.id",
    )?;
    let rows = stmt
        .query_map(params![class_id, active_only as i64], |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            Ok(EnrolledStudent {
                id: r.get(0)?,
                display_name: format!("{}, {}", last, first),
                active: r.get::<_, i64>(3)? != 0,
                enrollment_date: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---- holidays -------------------------------------------------------------

fn holiday_from_row(r: &Row<'_>) -> rusqlite::Result<(String, String, String, String, Option<String>)> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
}

fn holiday_from_parts(
    (id, date, kind, name, description): (String, String, String, String, Option<String>),
) -> CoreResult<Holiday> {
    let date = parse_date(&date).ok_or_else(|| CoreError::Corrupt(format!("holiday date '{}'", date)))?;
    let kind = HolidayType::parse(&kind).unwrap_or(HolidayType::Other);
    Ok(Holiday {
        id,
        date,
        kind,
        name,
        description,
    })
}

/// One holiday per date: a second upsert for the same date replaces it.
pub fn upsert_holiday(
    conn: &Connection,
    date: NaiveDate,
    kind: HolidayType,
    name: &str,
    description: Option<&str>,
) -> CoreResult<Holiday> {
    let now = now_ts();
    conn.execute(
        "INSERT INTO holidays(id, date, type, name, description, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(date) DO UPDATE SET
           type = excluded.type,
           name = excluded.name,
           description = excluded.description,
           updated_at = excluded.updated_at",
        params![
            Uuid::new_v4().to_string(),
            format_date(date),
            kind.label(),
            name,
            description,
            now,
            now
        ],
    )?;
    let parts = conn.query_row(
        "SELECT id, date, type, name, description FROM holidays WHERE date = ?",
        [format_date(date)],
        holiday_from_row,
    )?;
    holiday_from_parts(parts)
}

pub fn holidays_between(conn: &Connection, from: NaiveDate, to: NaiveDate) -> CoreResult<Vec<Holiday>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, type, name, description
         FROM holidays
         WHERE date >= ? AND date <= ?
         ORDER BY date",
    )?;
    let parts = stmt
        .query_map(params![format_date(from), format_date(to)], holiday_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    parts.into_iter().map(holiday_from_parts).collect()
}

pub fn delete_holiday(conn: &Connection, date: NaiveDate) -> CoreResult<bool> {
    let removed = conn.execute("DELETE FROM holidays WHERE date = ?", [format_date(date)])?;
    Ok(removed > 0)
}

// ---- attendance -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Stored form of the key's session time; '' for an untimed mark.
    pub session_time: String,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
    pub recorded_by: Option<String>,
    pub updated_at: String,
}

pub type RecordLookup = HashMap<String, HashMap<NaiveDate, StoredRecord>>;

/// Every record of `class_id` for the given students and dates, in one query,
/// as `student -> date -> record`. When a student has several timed sessions on
/// one date, the untimed mark wins, then the earliest session.
pub fn records_for(
    conn: &Connection,
    class_id: &str,
    student_ids: &[String],
    dates: &[NaiveDate],
) -> CoreResult<RecordLookup> {
    let mut lookup: RecordLookup = HashMap::new();
    if student_ids.is_empty() || dates.is_empty() {
        return Ok(lookup);
    }
    let sql = format!(
        "SELECT student_id, date, session_time, status, remarks, recorded_by, updated_at
         FROM attendance_records
         WHERE class_id = ?
           AND student_id IN ({})
           AND date IN ({})
         ORDER BY student_id, date, session_time",
        vec!["?"; student_ids.len()].join(", "),
        vec!["?"; dates.len()].join(", ")
    );
    let mut bind: Vec<Value> = Vec::with_capacity(1 + student_ids.len() + dates.len());
    bind.push(Value::Text(class_id.to_string()));
    bind.extend(student_ids.iter().map(|s| Value::Text(s.clone())));
    bind.extend(dates.iter().map(|d| Value::Text(format_date(*d))));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (student_id, date, session_time, status, remarks, recorded_by, updated_at) in rows {
        let date = parse_date(&date).ok_or_else(|| CoreError::Corrupt(format!("attendance date '{}'", date)))?;
        let status = AttendanceStatus::parse(&status)
            .ok_or_else(|| CoreError::Corrupt(format!("attendance status '{}'", status)))?;
        lookup
            .entry(student_id)
            .or_default()
            .entry(date)
            .or_insert(StoredRecord {
                session_time,
                status,
                remarks,
                recorded_by,
                updated_at,
            });
    }
    Ok(lookup)
}

/// Every record of a class, timed or not, optionally bounded by date, as
/// `(student_id, date, status)`.
pub fn class_records(
    conn: &Connection,
    class_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> CoreResult<Vec<(String, NaiveDate, AttendanceStatus)>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, date, status
         FROM attendance_records
         WHERE class_id = ?
           AND (? IS NULL OR date >= ?)
           AND (? IS NULL OR date <= ?)
         ORDER BY date, student_id",
    )?;
    let from = from.map(format_date);
    let to = to.map(format_date);
    let rows = stmt
        .query_map(params![class_id, from, from, to, to], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(student, date, status)| {
            let d = parse_date(&date).ok_or_else(|| CoreError::Corrupt(format!("attendance date '{}'", date)))?;
            let s = AttendanceStatus::parse(&status)
                .ok_or_else(|| CoreError::Corrupt(format!("attendance status '{}'", status)))?;
            Ok((student, d, s))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertEffect {
    Inserted,
    Updated,
    Unchanged,
    /// `update_by_key` found no row under the key.
    Missing,
}

/// The values a mark writes under its key.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkValues<'a> {
    pub status: AttendanceStatus,
    pub remarks: Option<&'a str>,
    pub recorded_by: Option<&'a str>,
}

/// Overwrites the record under `key` if any field differs. Returns
/// `Missing` when no record exists under the exact key.
pub fn update_by_key(
    conn: &Connection,
    key: &AttendanceKey,
    values: &MarkValues<'_>,
    now: &str,
) -> CoreResult<UpsertEffect> {
    let changed = conn.execute(
        "UPDATE attendance_records
         SET status = ?, remarks = ?, recorded_by = ?, updated_at = ?
         WHERE student_id = ? AND class_id = ? AND date = ? AND session_time = ?
           AND (status IS NOT ? OR remarks IS NOT ? OR recorded_by IS NOT ?)",
        params![
            values.status.as_str(),
            values.remarks,
            values.recorded_by,
            now,
            key.student_id,
            key.class_id,
            format_date(key.date),
            key.session_time_column(),
            values.status.as_str(),
            values.remarks,
            values.recorded_by
        ],
    )?;
    if changed > 0 {
        return Ok(UpsertEffect::Updated);
    }
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM attendance_records
             WHERE student_id = ? AND class_id = ? AND date = ? AND session_time = ?",
            params![key.student_id, key.class_id, format_date(key.date), key.session_time_column()],
            |r| r.get(0),
        )
        .optional()?;
    Ok(if exists.is_some() {
        UpsertEffect::Unchanged
    } else {
        UpsertEffect::Missing
    })
}

/// Insert-or-update by composite key as a single statement. A row that
/// appeared under the key since the caller last looked is updated in place
/// rather than tripping the UNIQUE constraint.
pub fn upsert_by_key(
    conn: &Connection,
    key: &AttendanceKey,
    values: &MarkValues<'_>,
    now: &str,
) -> CoreResult<UpsertEffect> {
    let new_id = Uuid::new_v4().to_string();
    let returned: Option<String> = conn
        .query_row(
            "INSERT INTO attendance_records(id, student_id, class_id, date, session_time, status, remarks, recorded_by, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(student_id, class_id, date, session_time) DO UPDATE SET
               status = excluded.status,
               remarks = excluded.remarks,
               recorded_by = excluded.recorded_by,
               updated_at = excluded.updated_at
             WHERE attendance_records.status IS NOT excluded.status
                OR attendance_records.remarks IS NOT excluded.remarks
                OR attendance_records.recorded_by IS NOT excluded.recorded_by
             RETURNING id",
            params![
                new_id,
                key.student_id,
                key.class_id,
                format_date(key.date),
                key.session_time_column(),
                values.status.as_str(),
                values.remarks,
                values.recorded_by,
                now
            ],
            |r| r.get(0),
        )
        .optional()?;
    Ok(match returned {
        None => UpsertEffect::Unchanged,
        Some(id) if id == new_id => UpsertEffect::Inserted,
        Some(_) => UpsertEffect::Updated,
    })
}

// ---- dashboard ------------------------------------------------------------

/// Workspace-wide counts behind the management dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardCounts {
    pub active_students: i64,
    pub active_teachers: i64,
    pub subjects: i64,
    pub classes: i64,
    pub records_on_day: i64,
    pub present_or_late_on_day: i64,
}

pub fn dashboard_counts(conn: &Connection, day: NaiveDate) -> CoreResult<DashboardCounts> {
    let count = |sql: &str| -> CoreResult<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let active_students = count("SELECT COUNT(*) FROM students WHERE is_active = 1")?;
    let active_teachers = count("SELECT COUNT(*) FROM users WHERE role = 'teacher' AND is_active = 1")?;
    let subjects = count(
        "SELECT COUNT(DISTINCT lower(trim(subject))) FROM classes
         WHERE subject IS NOT NULL AND trim(subject) <> ''",
    )?;
    let classes = count("SELECT COUNT(*) FROM classes")?;
    let (records_on_day, present_or_late_on_day): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(status IN ('present', 'late')), 0)
         FROM attendance_records
         WHERE date = ?",
        [format_date(day)],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(DashboardCounts {
        active_students,
        active_teachers,
        subjects,
        classes,
        records_on_day,
        present_or_late_on_day,
    })
}
