use crate::access::{self, class_access};
use crate::error::CoreError;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, fail, optional_date, optional_str, patch_str, required_str, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::schedule::ClassWindow;
use crate::store::{self, ClassFields};
use rusqlite::Connection;
use serde_json::json;

/// An assigned teacher must be an existing, active user.
fn check_teacher(conn: &Connection, teacher_user_id: Option<&str>) -> Result<(), CoreError> {
    if let Some(id) = teacher_user_id {
        store::load_actor(conn, id).map_err(|e| match e {
            CoreError::NotFound(_) => CoreError::validation("teacherUserId", format!("no user {}", id)),
            other => other,
        })?;
    }
    Ok(())
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let actor = state
        .actor
        .as_ref()
        .ok_or(CoreError::NoActor)
        .map_err(fail(req))?;
    let classes: Vec<serde_json::Value> = store::list_classes(conn)
        .map_err(fail(req))?
        .into_iter()
        .filter_map(|c| {
            let access = class_access(actor, c.teacher());
            access.read.then(|| {
                let mut v = c.to_json();
                v["canWrite"] = json!(access.write);
                v
            })
        })
        .collect();
    Ok(ok(&req.id, json!({ "classes": classes })))
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let class = store::load_class(conn, &class_id).map_err(fail(req))?;
    access::require_read(state.actor.as_ref(), &class_id, class.teacher()).map_err(fail(req))?;
    let source = store::schedule_source(conn, &class).map_err(fail(req))?;
    let entries = store::schedule_entries(conn, &class_id).map_err(fail(req))?;
    let enrolled = store::enrolled_students(conn, &class_id, true).map_err(fail(req))?;
    Ok(ok(
        &req.id,
        json!({
            "class": class.to_json(),
            "scheduleKind": source.kind(),
            "schedules": entries.iter().map(|e| e.to_json()).collect::<Vec<_>>(),
            "activeStudentCount": enrolled.len(),
        }),
    ))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let fields = ClassFields {
        name: required_str(req, "name")?,
        subject: optional_str(req, "subject"),
        teacher_user_id: optional_str(req, "teacherUserId"),
        academic_year: optional_str(req, "academicYear"),
        schedule_details: optional_str(req, "scheduleDetails"),
        window: ClassWindow {
            start_date: optional_date(req, "startDate")?,
            end_date: optional_date(req, "endDate")?,
        },
    };
    check_teacher(conn, fields.teacher_user_id.as_deref()).map_err(fail(req))?;
    let class_id = store::insert_class(conn, &fields).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "classId": class_id, "name": fields.name })))
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let class_id = required_str(req, "classId")?;
    let current = store::load_class(conn, &class_id).map_err(fail(req))?.fields;

    let window = ClassWindow {
        start_date: match req.params.get("startDate") {
            None => current.window.start_date,
            Some(_) => optional_date(req, "startDate")?,
        },
        end_date: match req.params.get("endDate") {
            None => current.window.end_date,
            Some(_) => optional_date(req, "endDate")?,
        },
    };
    let fields = ClassFields {
        name: optional_str(req, "name").unwrap_or(current.name),
        subject: patch_str(req, "subject", current.subject),
        teacher_user_id: patch_str(req, "teacherUserId", current.teacher_user_id),
        academic_year: patch_str(req, "academicYear", current.academic_year),
        schedule_details: patch_str(req, "scheduleDetails", current.schedule_details),
        window,
    };
    check_teacher(conn, fields.teacher_user_id.as_deref()).map_err(fail(req))?;
    store::update_class(conn, &class_id, &fields).map_err(fail(req))?;
    let class = store::load_class(conn, &class_id).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "class": class.to_json() })))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let class_id = required_str(req, "classId")?;
    store::delete_class(conn, &class_id).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => handle_classes_list(state, req),
        "classes.get" => handle_classes_get(state, req),
        "classes.create" => handle_classes_create(state, req),
        "classes.update" => handle_classes_update(state, req),
        "classes.delete" => handle_classes_delete(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
