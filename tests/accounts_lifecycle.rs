use serde_json::{json, Value};
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
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({ "id": method, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(method));
    value
}

fn call(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    method: &str,
    params: Value,
) -> Value {
    let resp = request(stdin, reader, method, params);
    assert_eq!(resp["ok"], json!(true), "{} failed: {}", method, resp);
    resp["result"].clone()
}

fn error_code(resp: &Value) -> &str {
    resp["error"]["code"].as_str().unwrap_or("")
}

fn text(v: &Value) -> String {
    v.as_str().expect("string").to_string()
}

#[test]
fn teacher_login_forces_a_password_change_once() {
    let workspace = temp_dir("schoold-accounts-teacher");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, rd) = (&mut stdin, &mut reader);
    call(si, rd, "workspace.select", json!({ "path": workspace.to_string_lossy() }));

    let first = call(si, rd, "teachers.create", json!({ "firstName": "Grace", "lastName": "Hopper" }));
    assert_eq!(first["email"], json!("grace.hopper@teacher.isufst.com"));
    assert_eq!(first["username"], json!("grace.hopper"));
    let password = text(&first["password"]);
    assert_eq!(password.chars().count(), 8);
    assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));

    let namesake = call(si, rd, "teachers.create", json!({ "firstName": "Grace", "lastName": "Hopper" }));
    assert_eq!(namesake["email"], json!("grace.hopper1@teacher.isufst.com"));
    let other_teacher = text(&namesake["profileId"]);

    let wrong = request(
        si,
        rd,
        "auth.login",
        json!({ "email": "grace.hopper@teacher.isufst.com", "password": "nope" }),
    );
    assert_eq!(error_code(&wrong), "invalid_credentials");

    let session = call(
        si,
        rd,
        "auth.login",
        json!({ "email": "grace.hopper@teacher.isufst.com", "password": password }),
    );
    assert_eq!(session["role"], json!("teacher"));
    assert_eq!(session["mustChangePassword"], json!(true));
    assert_eq!(session["profileId"], first["profileId"]);

    // Teacher-scoped methods act for the logged-in teacher only.
    call(si, rd, "dashboard.teacher", json!({}));
    let foreign = request(si, rd, "offerings.forTeacher", json!({ "teacherId": other_teacher }));
    assert_eq!(error_code(&foreign), "not_found");

    for (p1, p2) in [
        ("abcdefgh1", "abcdefgh2"),
        ("short1", "short1"),
        ("12345678", "12345678"),
    ] {
        let rejected = request(
            si,
            rd,
            "auth.changePassword",
            json!({ "newPassword1": p1, "newPassword2": p2 }),
        );
        assert_eq!(error_code(&rejected), "bad_params", "{} / {}", p1, p2);
    }
    call(
        si,
        rd,
        "auth.changePassword",
        json!({ "newPassword1": "s3cure-pass", "newPassword2": "s3cure-pass" }),
    );
    call(si, rd, "auth.logout", json!({}));

    let stale = request(
        si,
        rd,
        "auth.login",
        json!({ "email": "grace.hopper@teacher.isufst.com", "password": password }),
    );
    assert_eq!(error_code(&stale), "invalid_credentials");
    let again = call(
        si,
        rd,
        "auth.login",
        json!({ "username": "grace.hopper", "password": "s3cure-pass" }),
    );
    assert_eq!(again["mustChangePassword"], json!(false));
    call(si, rd, "auth.logout", json!({}));

    // The export view forgets changed passwords.
    let accounts = call(si, rd, "accounts.dashboard", json!({ "role": "teacher" }));
    let teachers = accounts["teachers"].as_array().expect("teachers");
    assert_eq!(teachers.len(), 2);
    let by_email = |email: &str| {
        teachers
            .iter()
            .find(|t| t["email"] == json!(email))
            .cloned()
            .expect("teacher line")
    };
    assert_eq!(by_email("grace.hopper@teacher.isufst.com")["password"], json!("N/A"));
    assert_eq!(
        by_email("grace.hopper1@teacher.isufst.com")["password"],
        namesake["password"]
    );
    assert!(accounts["studentGroups"].as_array().expect("groups").is_empty());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn students_and_parents_only_see_their_own_records() {
    let workspace = temp_dir("schoold-accounts-family");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, rd) = (&mut stdin, &mut reader);
    call(si, rd, "workspace.select", json!({ "path": workspace.to_string_lossy() }));

    let course_id = text(&call(si, rd, "courses.create", json!({ "name": "BSIT", "description": "" }))["courseId"]);
    let student = |no: &str, first: &str| {
        json!({
            "studentNo": no,
            "firstName": first,
            "lastName": "Reyes",
            "courseId": course_id,
            "year": "1st",
            "section": "a"
        })
    };

    let mut with_parent = student("S-1", "Ana");
    with_parent["parent"] = json!({ "firstName": "Rosa", "lastName": "Reyes" });
    let created = call(si, rd, "students.create", with_parent);
    assert_eq!(created["student"]["email"], json!("ana.reyes@student.isufst.com"));
    let ana = text(&created["student"]["profileId"]);
    let ana_password = text(&created["student"]["password"]);
    let parent_email = text(&created["parent"]["email"]);
    let parent_password = text(&created["parent"]["password"]);
    assert_eq!(parent_email, "rosa.reyes@parent.isufst.com");

    let ben = text(&call(si, rd, "students.create", student("S-2", "Ben"))["student"]["profileId"]);

    let duplicate = request(si, rd, "students.create", student("S-1", "Other"));
    assert_eq!(error_code(&duplicate), "already_exists");
    assert_eq!(
        duplicate["error"]["message"],
        json!("Email or Student ID already exists.")
    );

    let mut bad_year = student("S-9", "Zed");
    bad_year["year"] = json!("9th");
    let bad_year = request(si, rd, "students.create", bad_year);
    assert_eq!(error_code(&bad_year), "bad_params");
    assert_eq!(bad_year["error"]["details"]["field"], json!("year"));

    // Parent session.
    let session = call(
        si,
        rd,
        "auth.login",
        json!({ "email": parent_email, "password": parent_password }),
    );
    assert_eq!(session["role"], json!("parent"));
    let dashboard = call(si, rd, "dashboard.parent", json!({}));
    let children = dashboard["children"].as_array().expect("children");
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["studentId"], json!(ana));
    call(si, rd, "dashboard.studentAttendance", json!({ "studentId": ana }));
    let foreign = request(si, rd, "dashboard.studentAttendance", json!({ "studentId": ben }));
    assert_eq!(error_code(&foreign), "not_found");
    call(si, rd, "auth.logout", json!({}));

    // Student session.
    call(
        si,
        rd,
        "auth.login",
        json!({ "email": "ana.reyes@student.isufst.com", "password": ana_password }),
    );
    let own = call(si, rd, "dashboard.student", json!({}));
    assert_eq!(own["student"]["id"], json!(ana));
    let foreign = request(si, rd, "dashboard.student", json!({ "studentId": ben }));
    assert_eq!(error_code(&foreign), "not_found");
    call(si, rd, "auth.logout", json!({}));

    // Guardian swap on edit.
    let mut edit = student("S-2", "Ben");
    edit["studentId"] = json!(ben);
    edit["parentAction"] = json!("add");
    edit["parent"] = json!({ "firstName": "Mario", "lastName": "Reyes" });
    let edited = call(si, rd, "students.update", edit);
    assert_eq!(edited["parent"]["email"], json!("mario.reyes@parent.isufst.com"));
    let parents = call(si, rd, "parents.list", json!({}));
    assert_eq!(parents["parents"].as_array().map(|a| a.len()), Some(2));

    let admin = call(
        si,
        rd,
        "users.createAdmin",
        json!({ "username": "admin", "email": "admin@school.test", "password": "adm1n-pass" }),
    );
    assert!(admin["userId"].is_string());
    let session = call(
        si,
        rd,
        "auth.login",
        json!({ "email": "admin", "password": "adm1n-pass" }),
    );
    assert_eq!(session["role"], json!("admin"));
    assert_eq!(session["mustChangePassword"], json!(false));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
