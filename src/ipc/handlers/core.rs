use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, fail, required_str, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use std::path::PathBuf;

fn actor_json(state: &AppState) -> serde_json::Value {
    match &state.actor {
        Some(a) => json!({ "userId": a.user_id, "role": a.role.as_str() }),
        None => serde_json::Value::Null,
    }
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path, state.config.busy_timeout) {
        Ok(conn) => {
            tracing::info!(workspace = %path.display(), "workspace selected");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            // Identities belong to a workspace.
            state.actor = None;
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_set_actor(state: &mut AppState, req: &Request) -> HandlerResult {
    let user_id = required_str(req, "userId")?;
    let actor = store::load_actor(db_conn(state, req)?, &user_id).map_err(fail(req))?;
    state.actor = Some(actor);
    Ok(ok(&req.id, json!({ "actor": actor_json(state) })))
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "actor": actor_json(state),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "session.setActor" => Some(handle_set_actor(state, req).unwrap_or_else(|e| e)),
        "session.get" => Some(handle_session_get(state, req)),
        _ => None,
    }
}
