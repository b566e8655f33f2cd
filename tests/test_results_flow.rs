
use serde_json::json;
use test_support::{create_user, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn grade_entry_validation_and_student_listing() {
    let workspace = temp_dir("portal-results-flow");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = create_user(
        &mut stdin,
        &mut reader,
        "2",
        "teacher@school.org",
        "chalk",
        "teacher",
    );
    let student_id = create_user(
        &mut stdin,
        &mut reader,
        "3",
        "kid@school.org",
        "pencil",
        "student",
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "email": "teacher@school.org", "password": "chalk", "role": "teacher" }),
    );

    for (id, params, expect) in [
        (
            "5",
            json!({ "studentId": student_id, "subject": "Math", "testName": "Quiz", "score": 12, "maxScore": 10 }),
            "bad_params",
        ),
        (
            "6",
            json!({ "studentId": student_id, "subject": "Math", "testName": "Quiz", "score": -1, "maxScore": 10 }),
            "bad_params",
        ),
        (
            "7",
            json!({ "studentId": student_id, "subject": "Math", "testName": "Quiz", "score": 5, "maxScore": 0 }),
            "bad_params",
        ),
        (
            "8",
            json!({ "studentId": "missing", "subject": "Math", "testName": "Quiz", "score": 5, "maxScore": 10 }),
            "unknown_student",
        ),
    ] {
        let resp = request(&mut stdin, &mut reader, id, "results.record", params);
        assert_eq!(resp["ok"], json!(false), "case {}", id);
        assert_eq!(resp["error"]["code"], json!(expect), "case {}", id);
    }

    for (id, name, date, score) in [
        ("9", "Unit 1 test", "2026-09-05", 17),
        ("10", "Unit 2 test", "2026-10-12", 19),
        ("11", "Midterm", "2026-11-20", 15),
    ] {
        let recorded = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "results.record",
            json!({
                "studentId": student_id,
                "subject": "Math",
                "testName": name,
                "score": score,
                "maxScore": 20,
                "testDate": date
            }),
        );
        assert_eq!(recorded["result"]["testName"], json!(name));
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "auth.login",
        json!({ "email": "kid@school.org", "password": "pencil", "role": "student" }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "13", "results.list", json!({}));
    let results = listed["results"].as_array().expect("results");
    assert_eq!(results.len(), 3);
    // Newest first.
    assert_eq!(results[0]["testName"], json!("Midterm"));
    assert_eq!(results[2]["testName"], json!("Unit 1 test"));

    let limited = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "results.list",
        json!({ "limit": 2 }),
    );
    assert_eq!(limited["results"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(limited["results"][0]["testName"], json!("Midterm"));

    // Grade entry is teacher-only.
    let denied = request(
        &mut stdin,
        &mut reader,
        "15",
        "results.record",
        json!({
            "studentId": student_id,
            "subject": "Math",
            "testName": "Self-graded",
            "score": 20,
            "maxScore": 20
        }),
    );
    assert_eq!(denied["error"]["code"], json!("wrong_role"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
