use crate::error::CoreError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

/// Success envelope whose result carries the non-fatal input corrections.
pub fn ok_with_warnings(id: &str, mut result: serde_json::Value, warnings: Vec<String>) -> serde_json::Value {
    if result.is_object() {
        result["warnings"] = json!(warnings);
    }
    ok(id, result)
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn core_err(id: &str, e: &CoreError) -> serde_json::Value {
    if matches!(e, CoreError::Db(_) | CoreError::Corrupt(_) | CoreError::Transaction { .. }) {
        tracing::error!(code = e.code(), error = %e, "request failed");
    }
    err(id, e.code(), e.to_string(), e.details())
}
