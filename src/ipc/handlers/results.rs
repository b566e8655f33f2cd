use crate::data::DataService;
use crate::gate::Role;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_opt_str, get_required_i64, get_required_str, require_role, service, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::{Local, NaiveDate};
use serde_json::json;

fn result_json(record: &serde_json::Value) -> serde_json::Value {
    json!({
        "id": record.get("id").cloned().unwrap_or(serde_json::Value::Null),
        "studentId": record.get("student_id").cloned().unwrap_or(serde_json::Value::Null),
        "subject": record.get("subject").cloned().unwrap_or(serde_json::Value::Null),
        "testName": record.get("test_name").cloned().unwrap_or(serde_json::Value::Null),
        "score": record.get("score").cloned().unwrap_or(serde_json::Value::Null),
        "maxScore": record.get("max_score").cloned().unwrap_or(serde_json::Value::Null),
        "testDate": record.get("test_date").cloned().unwrap_or(serde_json::Value::Null),
    })
}

fn handle_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = (|| -> Result<serde_json::Value, HandlerErr> {
        require_role(state, Role::Teacher)?;
        let student_id = get_required_str(&req.params, "studentId")?;
        let subject = get_required_str(&req.params, "subject")?;
        let test_name = get_required_str(&req.params, "testName")?;
        let score = get_required_i64(&req.params, "score")?;
        let max_score = get_required_i64(&req.params, "maxScore")?;

        if score < 0 {
            return Err(HandlerErr::new("bad_params", "score must not be negative"));
        }
        if max_score <= 0 {
            return Err(HandlerErr::new("bad_params", "maxScore must be positive"));
        }
        if score > max_score {
            return Err(HandlerErr::new("bad_params", "score must not exceed maxScore"));
        }

        let test_date = match get_opt_str(&req.params, "testDate") {
            Some(raw) => {
                if NaiveDate::parse_from_str(&raw, "%Y-%m-%d").is_err() {
                    return Err(HandlerErr::new("bad_params", "testDate must be YYYY-MM-DD"));
                }
                raw
            }
            None => Local::now().date_naive().format("%Y-%m-%d").to_string(),
        };

        let svc = service(state)?;
        let students = svc.find(
            "users",
            &[("id", json!(student_id)), ("role", json!("student"))],
        )?;
        if students.is_empty() {
            return Err(HandlerErr::new(
                "unknown_student",
                format!("no student {}", student_id),
            ));
        }

        let stored = svc.insert(
            "test_results",
            json!({
                "student_id": student_id,
                "subject": subject,
                "test_name": test_name,
                "score": score,
                "max_score": max_score,
                "test_date": test_date,
            }),
        )?;
        Ok(json!({ "result": result_json(&stored) }))
    })();

    match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = (|| -> Result<serde_json::Value, HandlerErr> {
        let session = require_role(state, Role::Student)?;
        let limit = req.params.get("limit").and_then(|v| v.as_u64());

        let svc = service(state)?;
        let mut rows = svc.find("test_results", &[("student_id", json!(session.user_id))])?;
        // Newest test first, as on the dashboard cards.
        rows.sort_by(|a, b| {
            let ka = a.get("test_date").and_then(|v| v.as_str()).unwrap_or("");
            let kb = b.get("test_date").and_then(|v| v.as_str()).unwrap_or("");
            kb.cmp(ka)
        });
        if let Some(limit) = limit {
            rows.truncate(limit as usize);
        }
        let out: Vec<serde_json::Value> = rows.iter().map(result_json).collect();
        Ok(json!({ "results": out }))
    })();

    match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.record" => Some(handle_record(state, req)),
        "results.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
