use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Superuser,
    Admin,
    Teacher,
    Staff,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "superuser" => Some(Self::Superuser),
            "admin" => Some(Self::Admin),
            "teacher" => Some(Self::Teacher),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superuser => "superuser",
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Staff => "staff",
        }
    }
}

/// The acting user as declared by the host's identity provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassAccess {
    pub read: bool,
    pub write: bool,
}

/// Capability of `actor` on a class taught by `teacher_user_id`.
///
/// Staff, admins and superusers may read and write every class; a teacher
/// only the classes assigned to them.
pub fn class_access(actor: &Actor, teacher_user_id: Option<&str>) -> ClassAccess {
    match actor.role {
        Role::Superuser | Role::Admin | Role::Staff => ClassAccess {
            read: true,
            write: true,
        },
        Role::Teacher => {
            let assigned = teacher_user_id == Some(actor.user_id.as_str());
            ClassAccess {
                read: assigned,
                write: assigned,
            }
        }
    }
}

pub fn require_read(actor: Option<&Actor>, class_id: &str, teacher_user_id: Option<&str>) -> CoreResult<()> {
    let actor = actor.ok_or(CoreError::NoActor)?;
    if class_access(actor, teacher_user_id).read {
        Ok(())
    } else {
        Err(CoreError::Forbidden {
            class_id: class_id.to_string(),
            action: "read",
        })
    }
}

pub fn require_write(actor: Option<&Actor>, class_id: &str, teacher_user_id: Option<&str>) -> CoreResult<()> {
    let actor = actor.ok_or(CoreError::NoActor)?;
    if class_access(actor, teacher_user_id).write {
        Ok(())
    } else {
        Err(CoreError::Forbidden {
            class_id: class_id.to_string(),
            action: "write",
        })
    }
}

/// Management operations (classes, students, holidays, users) are reserved
/// for non-teaching roles.
pub fn require_manager(actor: Option<&Actor>) -> CoreResult<()> {
    let actor = actor.ok_or(CoreError::NoActor)?;
    match actor.role {
        Role::Superuser | Role::Admin | Role::Staff => Ok(()),
        Role::Teacher => Err(CoreError::Forbidden {
            class_id: "*".to_string(),
            action: "manage",
        }),
    }
}
