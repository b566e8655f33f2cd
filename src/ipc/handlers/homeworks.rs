use crate::data::DataService;
use crate::gate::Role;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_opt_str, get_required_str, require_role, service, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use serde_json::json;

fn homework_json(record: &serde_json::Value, assigned_to: Vec<String>) -> serde_json::Value {
    json!({
        "id": record.get("id").cloned().unwrap_or(serde_json::Value::Null),
        "title": record.get("title").cloned().unwrap_or(serde_json::Value::Null),
        "subject": record.get("subject").cloned().unwrap_or(serde_json::Value::Null),
        "dueDate": record.get("due_date").cloned().unwrap_or(serde_json::Value::Null),
        "description": record.get("description").cloned().unwrap_or(serde_json::Value::Null),
        "fileUrl": record.get("file_url").cloned().unwrap_or(serde_json::Value::Null),
        "createdAt": record.get("created_at").cloned().unwrap_or(serde_json::Value::Null),
        "assignedTo": assigned_to,
    })
}

fn lookup_student(state: &AppState, student_id: &str) -> Result<serde_json::Value, HandlerErr> {
    let rows = service(state)?.find(
        "users",
        &[("id", json!(student_id)), ("role", json!("student"))],
    )?;
    rows.into_iter()
        .next()
        .ok_or_else(|| HandlerErr::new("unknown_student", format!("no student {}", student_id)))
}

/// Two-step create, as the original did it: insert the homework, then the
/// assignment row linking it to the chosen student.
fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = (|| -> Result<serde_json::Value, HandlerErr> {
        let session = require_role(state, Role::Teacher)?;
        let title = get_required_str(&req.params, "title")?;
        let subject = get_required_str(&req.params, "subject")?;
        let due_date = get_required_str(&req.params, "dueDate")?;
        if NaiveDate::parse_from_str(&due_date, "%Y-%m-%d").is_err() {
            return Err(HandlerErr::new("bad_params", "dueDate must be YYYY-MM-DD"));
        }
        let student_id = get_required_str(&req.params, "studentId")?;
        let student = lookup_student(state, &student_id)?;

        let mut record = json!({
            "title": title,
            "subject": subject,
            "due_date": due_date,
            "teacher_id": session.user_id,
        });
        if let Some(description) = get_opt_str(&req.params, "description") {
            record["description"] = json!(description);
        }
        if let Some(file_url) = get_opt_str(&req.params, "fileUrl") {
            record["file_url"] = json!(file_url);
        }

        let svc = service(state)?;
        let stored = svc.insert("homeworks", record)?;
        let homework_id = stored
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::new("db_query_failed", "stored homework has no id"))?;
        let assignment = svc.insert(
            "assignments",
            json!({
                "homework_id": homework_id,
                "student_id": student_id,
                "is_completed": false,
            }),
        )?;

        let assigned = student
            .get("email")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .into_iter()
            .collect();
        Ok(json!({
            "homework": homework_json(&stored, assigned),
            "assignmentId": assignment.get("id").cloned().unwrap_or(serde_json::Value::Null),
        }))
    })();

    match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = (|| -> Result<serde_json::Value, HandlerErr> {
        let session = require_role(state, Role::Teacher)?;
        let svc = service(state)?;
        let mut homeworks = svc.find("homeworks", &[("teacher_id", json!(session.user_id))])?;
        // Newest first, as on the original dashboard.
        homeworks.sort_by(|a, b| {
            let ka = a.get("created_at").and_then(|v| v.as_str()).unwrap_or("");
            let kb = b.get("created_at").and_then(|v| v.as_str()).unwrap_or("");
            kb.cmp(ka)
        });

        let mut out = Vec::with_capacity(homeworks.len());
        for hw in &homeworks {
            let hw_id = hw.get("id").and_then(|v| v.as_str()).unwrap_or("");
            let mut assigned = Vec::new();
            for assignment in svc.find("assignments", &[("homework_id", json!(hw_id))])? {
                let Some(student_id) = assignment.get("student_id").and_then(|v| v.as_str())
                else {
                    continue;
                };
                let students = svc.find("users", &[("id", json!(student_id))])?;
                if let Some(email) = students
                    .first()
                    .and_then(|u| u.get("email"))
                    .and_then(|v| v.as_str())
                {
                    assigned.push(email.to_string());
                }
            }
            out.push(homework_json(hw, assigned));
        }
        Ok(json!({ "homeworks": out }))
    })();

    match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = (|| -> Result<serde_json::Value, HandlerErr> {
        let session = require_role(state, Role::Teacher)?;
        let homework_id = get_required_str(&req.params, "homeworkId")?;

        let svc = service(state)?;
        let rows = svc.find("homeworks", &[("id", json!(homework_id))])?;
        let Some(homework) = rows.into_iter().next() else {
            return Err(HandlerErr::new(
                "not_found",
                format!("no homework {}", homework_id),
            ));
        };
        if homework.get("teacher_id").and_then(|v| v.as_str()) != Some(session.user_id.as_str()) {
            return Err(HandlerErr::new(
                "forbidden",
                "homework belongs to another teacher",
            ));
        }

        // Dependent assignment rows go first.
        let mut removed_assignments = 0;
        for assignment in svc.find("assignments", &[("homework_id", json!(homework_id))])? {
            if let Some(id) = assignment.get("id").and_then(|v| v.as_str()) {
                svc.delete("assignments", id)?;
                removed_assignments += 1;
            }
        }
        svc.delete("homeworks", &homework_id)?;
        Ok(json!({
            "deleted": true,
            "removedAssignments": removed_assignments,
        }))
    })();

    match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "homeworks.create" => Some(handle_create(state, req)),
        "homeworks.list" => Some(handle_list(state, req)),
        "homeworks.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
