use serde_json::{json, Value};

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the scheduling and attendance core.
///
/// Every variant maps to a stable machine code so the IPC layer can render it
/// without inspecting the message.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("actor is not permitted to {action} class {class_id}")]
    Forbidden { class_id: String, action: &'static str },

    #[error("no acting user; call session.setActor first")]
    NoActor,

    #[error("attendance batch rolled back at student {student_id}: {cause}")]
    Transaction { student_id: String, cause: String },

    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "validation",
            CoreError::NotFound(_) => "not_found",
            CoreError::Forbidden { .. } => "forbidden",
            CoreError::NoActor => "forbidden",
            CoreError::Transaction { .. } => "transaction_failed",
            CoreError::Corrupt(_) => "db_query_failed",
            CoreError::Db(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            CoreError::Validation { field, .. } => Some(json!({ "field": field })),
            CoreError::Forbidden { class_id, action } => {
                Some(json!({ "classId": class_id, "action": action }))
            }
            CoreError::Transaction { student_id, .. } => Some(json!({ "studentId": student_id })),
            _ => None,
        }
    }
}
