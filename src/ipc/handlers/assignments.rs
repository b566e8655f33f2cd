use crate::data::DataService;
use crate::gate::Role;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, require_role, service, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::{Local, NaiveDate};
use serde_json::json;

/// Deadline state the original dashboard derived per card, returned as data
/// instead of markup. `days_left` is None when the due date is unparseable.
fn deadline_status(
    is_completed: bool,
    due_date: Option<&str>,
    today: NaiveDate,
) -> (&'static str, Option<i64>) {
    if is_completed {
        return ("completed", None);
    }
    let Some(due) = due_date.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) else {
        return ("open", None);
    };
    let days = (due - today).num_days();
    let status = if days < 0 {
        "late"
    } else if days == 0 {
        "due_today"
    } else if days <= 3 {
        "due_soon"
    } else {
        "open"
    };
    (status, Some(days))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = (|| -> Result<serde_json::Value, HandlerErr> {
        let session = require_role(state, Role::Student)?;
        let svc = service(state)?;
        let assignments = svc.find("assignments", &[("student_id", json!(session.user_id))])?;
        let today = Local::now().date_naive();

        let mut entries = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            let Some(homework_id) = assignment.get("homework_id").and_then(|v| v.as_str()) else {
                continue;
            };
            let homeworks = svc.find("homeworks", &[("id", json!(homework_id))])?;
            let Some(homework) = homeworks.into_iter().next() else {
                continue;
            };

            let is_completed = assignment
                .get("is_completed")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let due_date = homework.get("due_date").and_then(|v| v.as_str());
            let (status, days_left) = deadline_status(is_completed, due_date, today);

            entries.push(json!({
                "id": assignment.get("id").cloned().unwrap_or(serde_json::Value::Null),
                "isCompleted": is_completed,
                "completedAt": assignment.get("completed_at").cloned().unwrap_or(serde_json::Value::Null),
                "status": status,
                "daysLeft": days_left,
                "homework": {
                    "id": homework.get("id").cloned().unwrap_or(serde_json::Value::Null),
                    "title": homework.get("title").cloned().unwrap_or(serde_json::Value::Null),
                    "subject": homework.get("subject").cloned().unwrap_or(serde_json::Value::Null),
                    "dueDate": homework.get("due_date").cloned().unwrap_or(serde_json::Value::Null),
                    "description": homework.get("description").cloned().unwrap_or(serde_json::Value::Null),
                    "fileUrl": homework.get("file_url").cloned().unwrap_or(serde_json::Value::Null),
                },
            }));
        }

        // Incomplete first, then nearest due date, as the original ordered
        // its list. ISO dates compare correctly as strings.
        entries.sort_by(|a, b| {
            let done_a = a["isCompleted"].as_bool().unwrap_or(false);
            let done_b = b["isCompleted"].as_bool().unwrap_or(false);
            done_a.cmp(&done_b).then_with(|| {
                let due_a = a["homework"]["dueDate"].as_str().unwrap_or("");
                let due_b = b["homework"]["dueDate"].as_str().unwrap_or("");
                due_a.cmp(due_b)
            })
        });
        Ok(json!({ "assignments": entries }))
    })();

    match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    }
}

fn handle_complete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = (|| -> Result<serde_json::Value, HandlerErr> {
        let session = require_role(state, Role::Student)?;
        let assignment_id = get_required_str(&req.params, "assignmentId")?;

        let svc = service(state)?;
        let rows = svc.find("assignments", &[("id", json!(assignment_id))])?;
        let Some(assignment) = rows.into_iter().next() else {
            return Err(HandlerErr::new(
                "not_found",
                format!("no assignment {}", assignment_id),
            ));
        };
        if assignment.get("student_id").and_then(|v| v.as_str())
            != Some(session.user_id.as_str())
        {
            return Err(HandlerErr::new(
                "forbidden",
                "assignment belongs to another student",
            ));
        }

        // Completing twice keeps the first completion timestamp.
        let already = assignment
            .get("is_completed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !already {
            svc.update(
                "assignments",
                &assignment_id,
                json!({
                    "is_completed": true,
                    "completed_at": chrono::Utc::now().to_rfc3339(),
                }),
            )?;
        }
        Ok(json!({ "completed": true, "alreadyCompleted": already }))
    })();

    match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(handle_list(state, req)),
        "assignments.complete" => Some(handle_complete(state, req)),
        _ => None,
    }
}
