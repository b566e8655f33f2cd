use crate::data::DataService;
use crate::gate::Role;
use crate::ipc::error::ok;
use crate::ipc::helpers::{require_role, service, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

use super::setup::public_user;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = (|| -> Result<serde_json::Value, HandlerErr> {
        require_role(state, Role::Teacher)?;
        let mut students = service(state)?.find("users", &[("role", json!("student"))])?;
        students.sort_by(|a, b| {
            let ka = a.get("email").and_then(|v| v.as_str()).unwrap_or("");
            let kb = b.get("email").and_then(|v| v.as_str()).unwrap_or("");
            ka.cmp(kb)
        });
        let out: Vec<serde_json::Value> = students.iter().map(public_user).collect();
        Ok(json!({ "students": out }))
    })();

    match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
