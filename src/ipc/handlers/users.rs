use crate::access::{self, Role};
use crate::error::CoreError;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, fail, optional_str, required_str, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_users_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    // The first account of a fresh workspace is created without an actor.
    if store::user_count(conn).map_err(fail(req))? > 0 {
        access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    }
    let username = required_str(req, "username")?;
    let role_raw = required_str(req, "role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| CoreError::validation("role", format!("unknown role '{}'", role_raw)))
        .map_err(fail(req))?;
    let display_name = optional_str(req, "displayName");
    let user_id =
        store::insert_user(conn, &username, display_name.as_deref(), role).map_err(fail(req))?;
    Ok(ok(
        &req.id,
        json!({ "userId": user_id, "username": username, "role": role.as_str() }),
    ))
}

fn handle_users_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    access::require_manager(state.actor.as_ref()).map_err(fail(req))?;
    let users = store::list_users(conn).map_err(fail(req))?;
    Ok(ok(&req.id, json!({ "users": users })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.create" => handle_users_create(state, req),
        "users.list" => handle_users_list(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
