use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn expect_ok(value: &serde_json::Value, method: &str) -> serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

#[test]
fn methods_before_workspace_select_report_no_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let health = expect_ok(&health, "health");
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let listed = request(&mut stdin, &mut reader, "2", "courses.list", json!({}));
    assert_eq!(listed["ok"], json!(false));
    assert_eq!(listed["error"]["code"], json!("no_workspace"));

    let unknown = {
        let payload = json!({ "id": "3", "method": "nope.nothing", "params": {} });
        writeln!(stdin, "{}", payload).expect("write request");
        stdin.flush().expect("flush request");
        let mut line = String::new();
        reader.read_line(&mut line).expect("read response line");
        serde_json::from_str::<serde_json::Value>(line.trim()).expect("parse response json")
    };
    assert_eq!(unknown["error"]["code"], json!("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("schoold-router-smoke");
    let export_out = workspace.join("smoke-accounts.xlsx");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let selected = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let selected = expect_ok(&selected, "workspace.select");
    assert_eq!(selected["sections"], json!(["a", "b", "c", "d"]));

    let course = request(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        json!({ "name": "BSIT", "description": "Information Technology" }),
    );
    let course_id = expect_ok(&course, "courses.create")["courseId"]
        .as_str()
        .expect("courseId")
        .to_string();

    let subject = request(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({
            "courseId": course_id,
            "code": "IT101",
            "name": "Intro to Computing",
            "semester": "1st",
            "yearLevel": "1st"
        }),
    );
    let subject_id = expect_ok(&subject, "subjects.create")["subjectId"]
        .as_str()
        .expect("subjectId")
        .to_string();

    let teacher = request(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({ "firstName": "Grace", "lastName": "Hopper" }),
    );
    let teacher_id = expect_ok(&teacher, "teachers.create")["profileId"]
        .as_str()
        .expect("teacher profileId")
        .to_string();

    let student = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "studentNo": "2024-0001",
            "firstName": "Ana",
            "lastName": "Reyes",
            "courseId": course_id,
            "year": "1st",
            "section": "a",
            "parent": { "firstName": "Rosa", "lastName": "Reyes" }
        }),
    );
    let student = expect_ok(&student, "students.create");
    let student_id = student["student"]["profileId"]
        .as_str()
        .expect("student profileId")
        .to_string();
    let parent_id = student["parentId"].as_str().expect("parentId").to_string();

    let synced = request(
        &mut stdin,
        &mut reader,
        "6",
        "offerings.sync",
        json!({
            "teacherId": teacher_id,
            "year": "1st",
            "schoolYear": "2024-2025",
            "selections": [{ "subjectId": subject_id, "section": "a" }]
        }),
    );
    let _ = expect_ok(&synced, "offerings.sync");

    let offerings = request(&mut stdin, &mut reader, "7", "offerings.list", json!({}));
    let offering_id = expect_ok(&offerings, "offerings.list")["offerings"][0]["id"]
        .as_str()
        .expect("offering id")
        .to_string();

    let mut statuses = serde_json::Map::new();
    statuses.insert(student_id.clone(), json!("present"));

    let calls = vec![
        ("courses.list", json!({})),
        ("subjects.list", json!({ "courseId": course_id })),
        ("offerings.grid", json!({ "year": "1st", "schoolYear": "2024-2025" })),
        ("offerings.forTeacher", json!({ "teacherId": teacher_id })),
        ("enrollment.reconcile", json!({})),
        ("teachers.list", json!({})),
        ("parents.list", json!({})),
        ("students.list", json!({ "year": "1st" })),
        ("students.get", json!({ "studentId": student_id })),
        ("students.forTeacher", json!({ "teacherId": teacher_id })),
        (
            "attendance.sheet",
            json!({ "offeringId": offering_id, "date": "2024-09-02" }),
        ),
        (
            "attendance.mark",
            json!({
                "offeringId": offering_id,
                "date": "2024-09-02",
                "time": "08:30",
                "statuses": statuses
            }),
        ),
        ("reports.attendance", json!({})),
        ("reports.parentStudents", json!({})),
        ("reports.studentDetails", json!({})),
        ("reports.teacherDetails", json!({})),
        ("reports.classOverview", json!({ "teacherId": teacher_id })),
        (
            "reports.attendanceSummary",
            json!({ "teacherId": teacher_id, "startDate": "2024-09-01", "endDate": "2024-09-30" }),
        ),
        (
            "reports.detailedAttendance",
            json!({ "teacherId": teacher_id, "startDate": "2024-09-01", "endDate": "2024-09-30" }),
        ),
        ("dashboard.admin", json!({})),
        ("dashboard.teacher", json!({ "teacherId": teacher_id })),
        ("dashboard.student", json!({ "studentId": student_id })),
        ("dashboard.parent", json!({ "parentId": parent_id })),
        ("dashboard.studentAttendance", json!({ "studentId": student_id })),
        (
            "dashboard.attendanceDetail",
            json!({ "studentId": student_id, "subjectId": subject_id }),
        ),
        ("accounts.dashboard", json!({})),
        (
            "accounts.export",
            json!({ "outPath": export_out.to_string_lossy() }),
        ),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("c{}", i);
        let resp = request(&mut stdin, &mut reader, &id, method, params);
        let _ = expect_ok(&resp, method);
    }
    assert!(export_out.is_file(), "export wrote the workbook");

    let logged_out = request(&mut stdin, &mut reader, "99", "auth.logout", json!({}));
    let _ = expect_ok(&logged_out, "auth.logout");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
