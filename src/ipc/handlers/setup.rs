use crate::data::DataService;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_opt_str, get_required_str, get_role, service, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use sha2::{Digest, Sha256};

/// Passwords never reach the database as plaintext; login compares digests.
pub fn password_digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn looks_like_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Wire form of a user record: camelCase keys, credential material dropped.
pub fn public_user(record: &serde_json::Value) -> serde_json::Value {
    json!({
        "id": record.get("id").cloned().unwrap_or(serde_json::Value::Null),
        "email": record.get("email").cloned().unwrap_or(serde_json::Value::Null),
        "role": record.get("role").cloned().unwrap_or(serde_json::Value::Null),
        "fullName": record.get("full_name").cloned().unwrap_or(serde_json::Value::Null),
        "className": record.get("class").cloned().unwrap_or(serde_json::Value::Null),
    })
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = (|| -> Result<serde_json::Value, HandlerErr> {
        let email = get_required_str(&req.params, "email")?;
        if !looks_like_email(&email) {
            return Err(HandlerErr::new("bad_params", "email is not valid"));
        }
        let password = get_required_str(&req.params, "password")?;
        let role = get_role(&req.params, "role")?;

        let svc = service(state)?;
        let existing = svc.find("users", &[("email", json!(email))])?;
        if !existing.is_empty() {
            return Err(HandlerErr::new(
                "email_taken",
                format!("an account already exists for {}", email),
            ));
        }

        let mut record = json!({
            "email": email,
            "password": password_digest(&password),
            "role": role.as_str(),
        });
        if let Some(full_name) = get_opt_str(&req.params, "fullName") {
            record["full_name"] = json!(full_name);
        }
        if let Some(class) = get_opt_str(&req.params, "class") {
            record["class"] = json!(class);
        }

        let stored = svc.insert("users", record)?;
        Ok(json!({ "user": public_user(&stored) }))
    })();

    match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.create" => Some(handle_users_create(state, req)),
        _ => None,
    }
}
