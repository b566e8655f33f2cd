use serde::{Deserialize, Serialize};

use crate::data::DataService;
use crate::store::SessionStore;

/// Closed role set. Anything else in a stored record is corruption, not a
/// third role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            _ => None,
        }
    }
}

/// The locally cached record identifying the logged-in user. Written at
/// login, read by every gated operation, purged on logout or corruption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "className", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

/// Outcome of one gate check. Produced fresh per check, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResult {
    Authorized(Session),
    Unauthenticated,
    CorruptSession,
    WrongRole { actual: Role, required: Role },
}

fn parse_session(raw: &str) -> Option<Session> {
    let session: Session = serde_json::from_str(raw).ok()?;
    // Required identity fields must carry content, not just be present.
    if session.user_id.trim().is_empty() || session.email.trim().is_empty() {
        return None;
    }
    Some(session)
}

/// Decides whether a page requiring `required` may proceed. Deterministic
/// given store contents; the only mutation is the purge on the corrupt path.
/// A wrong-role session is left intact: it may still be valid for the other
/// dashboard.
pub fn authorize(store: &mut dyn SessionStore, required: Role) -> AuthorizationResult {
    let Some(raw) = store.get() else {
        return AuthorizationResult::Unauthenticated;
    };
    let Some(session) = parse_session(&raw) else {
        store.remove();
        return AuthorizationResult::CorruptSession;
    };
    if session.role != required {
        return AuthorizationResult::WrongRole {
            actual: session.role,
            required,
        };
    }
    AuthorizationResult::Authorized(session)
}

/// `authorize`, then best-effort revalidation against the `users` collection.
/// Refreshed profile fields are merged back into the stored session; a
/// service error or missing remote record never changes the authorization
/// outcome, so the result stays a function of the local store.
pub fn authorize_with_refresh(
    store: &mut dyn SessionStore,
    service: &dyn DataService,
    required: Role,
) -> AuthorizationResult {
    let result = authorize(store, required);
    let AuthorizationResult::Authorized(session) = result else {
        return result;
    };
    let refreshed = match service.find("users", &[("id", serde_json::json!(session.user_id))]) {
        Ok(rows) => rows.into_iter().next(),
        Err(_) => None,
    };
    let Some(record) = refreshed else {
        return AuthorizationResult::Authorized(session);
    };

    let mut merged = session.clone();
    if let Some(email) = record.get("email").and_then(|v| v.as_str()) {
        if !email.trim().is_empty() {
            merged.email = email.to_string();
        }
    }
    if let Some(name) = record.get("full_name").and_then(|v| v.as_str()) {
        merged.display_name = Some(name.to_string());
    }
    if let Some(class) = record.get("class").and_then(|v| v.as_str()) {
        merged.class_name = Some(class.to_string());
    }
    if merged != session {
        if let Ok(raw) = serde_json::to_string(&merged) {
            store.set(&raw);
        }
    }
    AuthorizationResult::Authorized(merged)
}

/// Peeks at the stored session without a role requirement, for "continue as
/// X" prompts on the login screen. Corruption is normalized the same way
/// `authorize` does it: purge and report nothing.
pub fn current(store: &mut dyn SessionStore) -> Option<Session> {
    let raw = store.get()?;
    match parse_session(&raw) {
        Some(session) => Some(session),
        None => {
            store.remove();
            None
        }
    }
}

/// Purges the store. Idempotent; a following `authorize` observes
/// `Unauthenticated`.
pub fn logout(store: &mut dyn SessionStore) {
    store.remove();
}
