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
    serde_json::from_str(line.trim()).expect("parse response json")
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

fn id_of(v: &Value, key: &str) -> String {
    v[key].as_str().expect(key).to_string()
}

#[test]
fn deletes_cascade_or_detach_as_documented() {
    let workspace = temp_dir("schoold-cascade");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, rd) = (&mut stdin, &mut reader);
    call(si, rd, "workspace.select", json!({ "path": workspace.to_string_lossy() }));

    let course_id = id_of(
        &call(si, rd, "courses.create", json!({ "name": "BSIT", "description": "" })),
        "courseId",
    );
    let subject_id = id_of(
        &call(
            si,
            rd,
            "subjects.create",
            json!({ "courseId": course_id, "code": "IT101", "name": "Basics", "semester": "1st", "yearLevel": "1st" }),
        ),
        "subjectId",
    );
    let teacher_id = id_of(
        &call(si, rd, "teachers.create", json!({ "firstName": "Grace", "lastName": "Hopper" })),
        "profileId",
    );
    call(
        si,
        rd,
        "offerings.sync",
        json!({
            "teacherId": teacher_id,
            "year": "1st",
            "schoolYear": "2024-2025",
            "selections": [{ "subjectId": subject_id, "section": "a" }]
        }),
    );
    let offering_id = id_of(&call(si, rd, "offerings.list", json!({}))["offerings"][0], "id");
    let created = call(
        si,
        rd,
        "students.create",
        json!({
            "studentNo": "S-1",
            "firstName": "Ana",
            "lastName": "Reyes",
            "courseId": course_id,
            "year": "1st",
            "section": "a",
            "parent": { "firstName": "Rosa", "lastName": "Reyes", "contactNumber": "0917" }
        }),
    );
    let student_id = id_of(&created["student"], "profileId");
    let parent_id = id_of(&created, "parentId");
    call(
        si,
        rd,
        "attendance.mark",
        json!({
            "offeringId": offering_id,
            "date": "2024-09-02",
            "statuses": [{ "studentId": student_id, "status": "present" }]
        }),
    );

    // Teacher removal leaves the offering unassigned and its attendance intact.
    call(si, rd, "teachers.delete", json!({ "teacherId": teacher_id }));
    let offerings = call(si, rd, "offerings.list", json!({}));
    assert_eq!(offerings["offerings"].as_array().map(|a| a.len()), Some(1));
    assert!(offerings["offerings"][0]["teacherId"].is_null());
    let report = call(si, rd, "reports.attendance", json!({}));
    assert_eq!(report["records"].as_array().map(|a| a.len()), Some(1));

    // Course removal detaches subjects and students.
    call(si, rd, "courses.delete", json!({ "courseId": course_id }));
    let subjects = call(si, rd, "subjects.list", json!({}));
    assert!(subjects["subjects"][0]["courseId"].is_null());
    let student = call(si, rd, "students.get", json!({ "studentId": student_id }));
    assert!(student["courseId"].is_null());
    assert_eq!(student["parents"], json!([parent_id]));

    // Student removal drops attendance and the guardian link, not the parent.
    let deleted = call(si, rd, "students.delete", json!({ "studentId": student_id }));
    assert_eq!(
        deleted["message"],
        json!("Student Ana Reyes has been successfully deleted.")
    );
    let report = call(si, rd, "reports.attendance", json!({}));
    assert!(report["records"].as_array().expect("records").is_empty());
    let parents = call(si, rd, "parents.list", json!({}));
    assert_eq!(parents["parents"][0]["id"], json!(parent_id));
    assert!(parents["parents"][0]["children"]
        .as_array()
        .expect("children")
        .is_empty());

    // Subject removal takes its offerings with it.
    call(si, rd, "subjects.delete", json!({ "subjectId": subject_id }));
    let offerings = call(si, rd, "offerings.list", json!({}));
    assert!(offerings["offerings"].as_array().expect("offerings").is_empty());

    let missing = request(si, rd, "students.delete", json!({ "studentId": student_id }));
    assert_eq!(missing["error"]["code"], json!("not_found"));
    let missing = request(si, rd, "offerings.delete", json!({ "offeringId": offering_id }));
    assert_eq!(missing["error"]["code"], json!("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
