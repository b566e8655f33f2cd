use crate::data::DataService;
use crate::gate::{self, AuthorizationResult, Session};
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, get_role, service, session_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

use super::setup::password_digest;

fn session_from_record(record: &serde_json::Value) -> Result<Session, HandlerErr> {
    serde_json::from_value(json!({
        "userId": record.get("id").cloned().unwrap_or(serde_json::Value::Null),
        "email": record.get("email").cloned().unwrap_or(serde_json::Value::Null),
        "role": record.get("role").cloned().unwrap_or(serde_json::Value::Null),
        "displayName": record.get("full_name").and_then(|v| v.as_str()),
        "className": record.get("class").and_then(|v| v.as_str()),
    }))
    .map_err(|e| HandlerErr::new("db_query_failed", format!("stored user is invalid: {}", e)))
}

/// Single equality-filtered lookup, the shape of the original login query:
/// email, password digest, and selected role must all match one record.
fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = (|| -> Result<serde_json::Value, HandlerErr> {
        let email = get_required_str(&req.params, "email")?;
        let password = get_required_str(&req.params, "password")?;
        let role = get_role(&req.params, "role")?;

        let rows = service(state)?.find(
            "users",
            &[
                ("email", json!(email)),
                ("password", json!(password_digest(&password))),
                ("role", json!(role.as_str())),
            ],
        )?;
        let Some(record) = rows.into_iter().next() else {
            return Err(HandlerErr::new(
                "invalid_credentials",
                "no account matches that email, password and role",
            ));
        };

        let session = session_from_record(&record)?;
        let raw = serde_json::to_string(&session)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
        state.session.set(&raw);
        Ok(json!({ "session": session_json(&session) }))
    })();

    match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    gate::logout(state.session.as_mut());
    ok(&req.id, json!({ "loggedOut": true }))
}

fn authorization_json(result: AuthorizationResult) -> serde_json::Value {
    match result {
        AuthorizationResult::Authorized(session) => json!({
            "status": "authorized",
            "session": session_json(&session),
        }),
        AuthorizationResult::Unauthenticated => json!({ "status": "unauthenticated" }),
        AuthorizationResult::CorruptSession => json!({ "status": "corruptSession" }),
        AuthorizationResult::WrongRole { actual, required } => json!({
            "status": "wrongRole",
            "actual": actual.as_str(),
            "required": required.as_str(),
        }),
    }
}

fn handle_authorize(state: &mut AppState, req: &Request) -> serde_json::Value {
    let role = match get_role(&req.params, "requiredRole") {
        Ok(role) => role,
        Err(e) => return e.response(&req.id),
    };
    let refresh = req
        .params
        .get("refresh")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    // Refresh is best-effort: without a workspace there is no service to ask,
    // and the local decision stands either way.
    let result = match (refresh, state.service.as_ref()) {
        (true, Some(svc)) => {
            gate::authorize_with_refresh(state.session.as_mut(), svc as &dyn DataService, role)
        }
        _ => gate::authorize(state.session.as_mut(), role),
    };
    ok(&req.id, authorization_json(result))
}

fn handle_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    match gate::current(state.session.as_mut()) {
        Some(session) => ok(&req.id, json!({ "session": session_json(&session) })),
        None => ok(&req.id, json!({ "session": null })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "session.authorize" => Some(handle_authorize(state, req)),
        "session.current" => Some(handle_current(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_failure_uses_err_envelope() {
        let mut state = AppState::new();
        let req = Request {
            id: "1".to_string(),
            method: "auth.login".to_string(),
            params: json!({ "email": "a@b.com", "password": "pw", "role": "student" }),
        };
        let resp = handle_login(&mut state, &req);
        // No workspace selected yet.
        assert_eq!(resp["ok"], json!(false));
        assert_eq!(resp["error"]["code"], json!("no_workspace"));
    }

    #[test]
    fn authorize_rejects_roles_outside_the_closed_set() {
        let mut state = AppState::new();
        let req = Request {
            id: "2".to_string(),
            method: "session.authorize".to_string(),
            params: json!({ "requiredRole": "admin" }),
        };
        let resp = handle_authorize(&mut state, &req);
        assert_eq!(resp["ok"], json!(false));
        assert_eq!(resp["error"]["code"], json!("bad_params"));
    }

    #[test]
    fn authorize_without_session_is_unauthenticated() {
        let mut state = AppState::new();
        let req = Request {
            id: "3".to_string(),
            method: "session.authorize".to_string(),
            params: json!({ "requiredRole": "teacher" }),
        };
        let resp = handle_authorize(&mut state, &req);
        assert_eq!(resp["ok"], json!(true));
        assert_eq!(resp["result"]["status"], json!("unauthenticated"));
    }
}
