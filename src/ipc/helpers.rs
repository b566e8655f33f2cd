use crate::data::ServiceError;
use crate::db::SqliteService;
use crate::gate::{self, AuthorizationResult, Role, Session};
use crate::ipc::error::err;
use crate::ipc::types::AppState;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ServiceError> for HandlerErr {
    fn from(e: ServiceError) -> Self {
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: None,
        }
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing or non-integer {}", key)))
}

pub fn get_role(params: &serde_json::Value, key: &str) -> Result<Role, HandlerErr> {
    let raw = get_required_str(params, key)?;
    Role::parse(&raw).ok_or_else(|| {
        HandlerErr::new("bad_params", format!("{} must be student or teacher", key))
    })
}

pub fn service(state: &AppState) -> Result<&SqliteService, HandlerErr> {
    state
        .service
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "no workspace selected"))
}

pub fn session_json(session: &Session) -> serde_json::Value {
    json!({
        "userId": session.user_id,
        "email": session.email,
        "role": session.role.as_str(),
        "displayName": session.display_name,
        "className": session.class_name,
    })
}

/// The one place gate outcomes become wire errors. Every gated handler goes
/// through here instead of re-reading the store itself.
pub fn require_role(state: &mut AppState, required: Role) -> Result<Session, HandlerErr> {
    match gate::authorize(state.session.as_mut(), required) {
        AuthorizationResult::Authorized(session) => Ok(session),
        AuthorizationResult::Unauthenticated => {
            Err(HandlerErr::new("unauthenticated", "no active session"))
        }
        AuthorizationResult::CorruptSession => Err(HandlerErr::new(
            "corrupt_session",
            "stored session was unreadable and has been cleared",
        )),
        AuthorizationResult::WrongRole { actual, required } => Err(HandlerErr {
            code: "wrong_role",
            message: format!(
                "session role {} cannot access {} operations",
                actual.as_str(),
                required.as_str()
            ),
            details: Some(json!({
                "actual": actual.as_str(),
                "required": required.as_str(),
            })),
        }),
    }
}
