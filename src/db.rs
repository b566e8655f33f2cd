use std::path::Path;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde_json::json;
use uuid::Uuid;

use crate::data::{DataService, ServiceError};

/// Closed schema for the portal collections. Predicates and patches are
/// validated against this before any SQL is composed.
const COLLECTIONS: &[(&str, &[&str])] = &[
    (
        "users",
        &["id", "email", "password", "role", "full_name", "class", "created_at"],
    ),
    (
        "homeworks",
        &[
            "id",
            "title",
            "subject",
            "due_date",
            "description",
            "file_url",
            "teacher_id",
            "created_at",
        ],
    ),
    (
        "assignments",
        &["id", "homework_id", "student_id", "is_completed", "completed_at"],
    ),
    (
        "test_results",
        &[
            "id",
            "student_id",
            "subject",
            "test_name",
            "score",
            "max_score",
            "test_date",
        ],
    ),
];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("portal.sqlite3");
    let conn = Connection::open(db_path)?;
    // Every call is bounded; a contended database surfaces as an error the
    // caller can downgrade instead of hanging a page load.
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            role TEXT NOT NULL,
            full_name TEXT,
            class TEXT,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS homeworks(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            subject TEXT NOT NULL,
            due_date TEXT NOT NULL,
            description TEXT,
            file_url TEXT,
            teacher_id TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_homeworks_teacher ON homeworks(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            homework_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            is_completed INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            FOREIGN KEY(homework_id) REFERENCES homeworks(id),
            FOREIGN KEY(student_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_homework ON assignments(homework_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_student ON assignments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_results(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            test_name TEXT NOT NULL,
            score INTEGER NOT NULL,
            max_score INTEGER NOT NULL,
            test_date TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_results_student ON test_results(student_id)",
        [],
    )?;

    Ok(conn)
}

/// Reference `DataService` backend over the workspace database. Lives behind
/// the trait so an embedder can point the same handlers at a hosted service.
pub struct SqliteService {
    conn: Connection,
}

impl SqliteService {
    pub fn new(conn: Connection) -> Self {
        SqliteService { conn }
    }
}

fn columns_of(collection: &str) -> Result<&'static [&'static str], ServiceError> {
    COLLECTIONS
        .iter()
        .find(|(name, _)| *name == collection)
        .map(|(_, cols)| *cols)
        .ok_or_else(|| ServiceError::UnknownCollection(collection.to_string()))
}

fn check_field(collection: &str, columns: &[&str], field: &str) -> Result<(), ServiceError> {
    if columns.contains(&field) {
        Ok(())
    } else {
        Err(ServiceError::UnknownField {
            collection: collection.to_string(),
            field: field.to_string(),
        })
    }
}

fn bind_value(value: &serde_json::Value) -> Result<Value, ServiceError> {
    match value {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Integer(i64::from(*b))),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Real(f))
            } else {
                Err(ServiceError::Query(format!("unbindable number {}", n)))
            }
        }
        serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
        other => Err(ServiceError::Query(format!(
            "unsupported predicate value {}",
            other
        ))),
    }
}

fn map_db_err(e: rusqlite::Error) -> ServiceError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == ErrorCode::DatabaseBusy || f.code == ErrorCode::DatabaseLocked =>
        {
            ServiceError::Unavailable(e.to_string())
        }
        _ => ServiceError::Query(e.to_string()),
    }
}

fn row_to_json(row: &rusqlite::Row<'_>, columns: &[&str]) -> rusqlite::Result<serde_json::Value> {
    let mut obj = serde_json::Map::new();
    for (idx, col) in columns.iter().enumerate() {
        let value: Value = row.get_ref(idx)?.into();
        let value = match value {
            Value::Null => serde_json::Value::Null,
            // is_completed is the one boolean column; surface it as a bool.
            Value::Integer(i) if *col == "is_completed" => json!(i != 0),
            Value::Integer(i) => json!(i),
            Value::Real(f) => json!(f),
            Value::Text(s) => json!(s),
            Value::Blob(_) => serde_json::Value::Null,
        };
        obj.insert((*col).to_string(), value);
    }
    Ok(serde_json::Value::Object(obj))
}

fn record_fields(
    collection: &str,
    columns: &[&str],
    record: &serde_json::Value,
) -> Result<Vec<(String, Value)>, ServiceError> {
    let Some(map) = record.as_object() else {
        return Err(ServiceError::Query(format!(
            "{} record must be a JSON object",
            collection
        )));
    };
    let mut fields = Vec::with_capacity(map.len());
    for (key, value) in map {
        check_field(collection, columns, key)?;
        fields.push((key.clone(), bind_value(value)?));
    }
    Ok(fields)
}

impl DataService for SqliteService {
    fn find(
        &self,
        collection: &str,
        filters: &[(&str, serde_json::Value)],
    ) -> Result<Vec<serde_json::Value>, ServiceError> {
        let columns = columns_of(collection)?;
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), collection);
        let mut params: Vec<Value> = Vec::with_capacity(filters.len());
        for (idx, (field, value)) in filters.iter().enumerate() {
            check_field(collection, columns, field)?;
            sql.push_str(if idx == 0 { " WHERE " } else { " AND " });
            sql.push_str(field);
            sql.push_str(" = ?");
            params.push(bind_value(value)?);
        }

        let mut stmt = self.conn.prepare(&sql).map_err(map_db_err)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| row_to_json(row, columns))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(map_db_err)?;
        Ok(rows)
    }

    fn insert(
        &self,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        let columns = columns_of(collection)?;
        let mut fields = record_fields(collection, columns, &record)?;

        let id = match fields.iter().find(|(k, _)| k == "id") {
            Some((_, Value::Text(id))) => id.clone(),
            Some(_) => return Err(ServiceError::Query("id must be a string".to_string())),
            None => {
                let id = Uuid::new_v4().to_string();
                fields.push(("id".to_string(), Value::Text(id.clone())));
                id
            }
        };
        if columns.contains(&"created_at") && !fields.iter().any(|(k, _)| k == "created_at") {
            fields.push((
                "created_at".to_string(),
                Value::Text(chrono::Utc::now().to_rfc3339()),
            ));
        }

        let names: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        let placeholders = vec!["?"; fields.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            collection,
            names.join(", "),
            placeholders
        );
        self.conn
            .execute(&sql, params_from_iter(fields.iter().map(|(_, v)| v.clone())))
            .map_err(map_db_err)?;

        // Read back so the caller sees normalized values.
        let stored = self.find(collection, &[("id", json!(id))])?;
        stored.into_iter().next().ok_or(ServiceError::NotFound {
            collection: collection.to_string(),
            id,
        })
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<(), ServiceError> {
        let columns = columns_of(collection)?;
        let fields = record_fields(collection, columns, &patch)?;
        if fields.is_empty() {
            return Err(ServiceError::Query("empty patch".to_string()));
        }

        let assignments: Vec<String> = fields.iter().map(|(k, _)| format!("{} = ?", k)).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            collection,
            assignments.join(", ")
        );
        let mut params: Vec<Value> = fields.into_iter().map(|(_, v)| v).collect();
        params.push(Value::Text(id.to_string()));

        let affected = self
            .conn
            .execute(&sql, params_from_iter(params))
            .map_err(map_db_err)?;
        if affected == 0 {
            return Err(ServiceError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), ServiceError> {
        columns_of(collection)?;
        let sql = format!("DELETE FROM {} WHERE id = ?", collection);
        let affected = self.conn.execute(&sql, [id]).map_err(map_db_err)?;
        if affected == 0 {
            return Err(ServiceError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_workspace(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "portald-db-{}-{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    fn service(name: &str) -> SqliteService {
        let conn = open_db(&temp_workspace(name)).expect("open db");
        SqliteService::new(conn)
    }

    fn insert_user(service: &SqliteService, email: &str, role: &str) -> String {
        let stored = service
            .insert(
                "users",
                json!({ "email": email, "password": "digest", "role": role }),
            )
            .expect("insert user");
        stored
            .get("id")
            .and_then(|v| v.as_str())
            .expect("id")
            .to_string()
    }

    #[test]
    fn insert_fills_id_and_created_at() {
        let svc = service("insert-fills");
        let stored = svc
            .insert(
                "users",
                json!({ "email": "t@school.org", "password": "digest", "role": "teacher" }),
            )
            .expect("insert");
        assert!(stored.get("id").and_then(|v| v.as_str()).is_some());
        assert!(stored.get("created_at").and_then(|v| v.as_str()).is_some());
    }

    #[test]
    fn find_applies_all_equality_filters() {
        let svc = service("find-filters");
        insert_user(&svc, "s1@school.org", "student");
        insert_user(&svc, "s2@school.org", "student");
        insert_user(&svc, "t@school.org", "teacher");

        let students = svc
            .find("users", &[("role", json!("student"))])
            .expect("find");
        assert_eq!(students.len(), 2);

        let one = svc
            .find(
                "users",
                &[("role", json!("student")), ("email", json!("s2@school.org"))],
            )
            .expect("find");
        assert_eq!(one.len(), 1);

        // No match is an empty vec, not an error.
        let none = svc
            .find("users", &[("email", json!("missing@school.org"))])
            .expect("find");
        assert!(none.is_empty());
    }

    #[test]
    fn unknown_collection_and_field_are_rejected() {
        let svc = service("unknown");
        let err = svc.find("grades", &[]).expect_err("unknown collection");
        assert_eq!(err.code(), "unknown_collection");

        let err = svc
            .find("users", &[("passwd", json!("x"))])
            .expect_err("unknown field");
        assert_eq!(err.code(), "unknown_field");
    }

    #[test]
    fn update_and_delete_of_missing_id_report_not_found() {
        let svc = service("missing-id");
        let err = svc
            .update("users", "nope", json!({ "full_name": "X" }))
            .expect_err("missing update");
        assert_eq!(err.code(), "not_found");
        let err = svc.delete("users", "nope").expect_err("missing delete");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn is_completed_round_trips_as_bool() {
        let svc = service("bool-col");
        let teacher_id = insert_user(&svc, "t@school.org", "teacher");
        let student_id = insert_user(&svc, "s@school.org", "student");
        let hw = svc
            .insert(
                "homeworks",
                json!({
                    "title": "Algebra 1",
                    "subject": "Math",
                    "due_date": "2026-09-10",
                    "teacher_id": teacher_id
                }),
            )
            .expect("insert homework");
        let hw_id = hw.get("id").and_then(|v| v.as_str()).expect("hw id");

        let stored = svc
            .insert(
                "assignments",
                json!({
                    "homework_id": hw_id,
                    "student_id": student_id,
                    "is_completed": false
                }),
            )
            .expect("insert assignment");
        assert_eq!(stored.get("is_completed"), Some(&json!(false)));

        let id = stored.get("id").and_then(|v| v.as_str()).expect("id");
        svc.update("assignments", id, json!({ "is_completed": true }))
            .expect("update");
        let rows = svc
            .find("assignments", &[("is_completed", json!(true))])
            .expect("find");
        assert_eq!(rows.len(), 1);
    }
}
