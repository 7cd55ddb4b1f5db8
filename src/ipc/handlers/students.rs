use crate::access;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, fail, optional_date, required_str, today, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_students_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let student_number = required_str(req, "studentNumber")?;
    let last_name = required_str(req, "lastName")?;
    let first_name = required_str(req, "firstName")?;
    let student_id =
        store::insert_student(conn, &student_number, &last_name, &first_name).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "studentId": student_id })))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let students = store::list_students(conn).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "students": students })))
}

fn handle_students_set_active(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let student_id = required_str(req, "studentId")?;
    let Some(active) = req.params.get("active").and_then(|v| v.as_bool()) else {
        return Err(err(&req.id, "bad_params", "missing active", None));
    };
    store::set_student_active(conn, &student_id, active).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "studentId": student_id, "active": active })))
}

fn handle_enrollments_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let class = store::load_class(conn, &class_id).map_err(fail(req))?;
    access::require_read(state.actor.as_ref(), &class_id, class.teacher()).map_err(fail(req))?;
    let include_inactive = req
        .params
        .get("includeInactive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let students = store::enrolled_students(conn, &class_id, !include_inactive).map_err(fail(req))?;
    Ok(ok(
        &req.id,
        json!({
            "classId": class_id,
            "students": students.iter().map(|s| s.to_json()).collect::<Vec<_>>(),
        }),
    ))
}

fn handle_enrollments_add(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let class_id = required_str(req, "classId")?;
    let student_id = required_str(req, "studentId")?;
    let on = optional_date(req, "enrollmentDate")?.unwrap_or_else(today);
    store::load_class(conn, &class_id).map_err(fail(req))?;
    let added = store::enroll(conn, &class_id, &student_id, on).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "added": added })))
}

fn handle_enrollments_remove(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let class_id = required_str(req, "classId")?;
    let student_id = required_str(req, "studentId")?;
    let removed = store::unenroll(conn, &class_id, &student_id).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "removed": removed })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.create" => handle_students_create(state, req),
        "students.list" => handle_students_list(state, req),
        "students.setActive" => handle_students_set_active(state, req),
        "enrollments.list" => handle_enrollments_list(state, req),
        "enrollments.add" => handle_enrollments_add(state, req),
        "enrollments.remove" => handle_enrollments_remove(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
