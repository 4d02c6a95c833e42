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
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn call(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    method: &str,
    params: Value,
) -> Value {
    let resp = request(stdin, reader, method, method, params);
    assert_eq!(resp["ok"], json!(true), "{} failed: {}", method, resp);
    resp["result"].clone()
}

fn subject_codes(student: &Value) -> Vec<String> {
    let mut codes: Vec<String> = student["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .filter_map(|s| s["code"].as_str().map(str::to_string))
        .collect();
    codes.sort();
    codes
}

#[test]
fn sync_makes_offerings_match_the_submitted_set_and_enrollment_follows() {
    let workspace = temp_dir("schoold-offerings-sync");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, rd) = (&mut stdin, &mut reader);

    call(si, rd, "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let course_id = call(si, rd, "courses.create", json!({ "name": "BSCS", "description": "" }))
        ["courseId"]
        .as_str()
        .expect("courseId")
        .to_string();
    let mut subject_ids = Vec::new();
    for code in ["CS101", "CS102"] {
        let created = call(
            si,
            rd,
            "subjects.create",
            json!({
                "courseId": course_id,
                "code": code,
                "name": format!("{} lecture", code),
                "semester": "1st",
                "yearLevel": "1st"
            }),
        );
        subject_ids.push(created["subjectId"].as_str().expect("subjectId").to_string());
    }
    let t1 = call(si, rd, "teachers.create", json!({ "firstName": "Ada", "lastName": "Lovelace" }))
        ["profileId"]
        .as_str()
        .expect("t1")
        .to_string();
    let t2 = call(si, rd, "teachers.create", json!({ "firstName": "Alan", "lastName": "Turing" }))
        ["profileId"]
        .as_str()
        .expect("t2")
        .to_string();
    let student = call(
        si,
        rd,
        "students.create",
        json!({
            "studentNo": "S-1",
            "firstName": "Lea",
            "lastName": "Santos",
            "courseId": course_id,
            "year": "1st",
            "section": "a"
        }),
    );
    let student_id = student["student"]["profileId"]
        .as_str()
        .expect("student id")
        .to_string();
    assert!(student["subjectIds"].as_array().expect("subjectIds").is_empty());

    let target = |teacher: &str, selections: Value| {
        json!({
            "teacherId": teacher,
            "year": "1st",
            "schoolYear": "2024-2025",
            "selections": selections
        })
    };

    // Both subjects for section a.
    let outcome = call(
        si,
        rd,
        "offerings.sync",
        target(
            &t1,
            json!([
                { "subjectId": subject_ids[0], "section": "a" },
                format!("{}_a", subject_ids[1])
            ]),
        ),
    );
    assert_eq!(outcome["created"].as_array().map(|a| a.len()), Some(2));
    let listed = call(si, rd, "offerings.forTeacher", json!({ "teacherId": t1 }));
    assert_eq!(listed["offerings"].as_array().map(|a| a.len()), Some(2));
    let fetched = call(si, rd, "students.get", json!({ "studentId": student_id }));
    assert_eq!(subject_codes(&fetched), vec!["CS101", "CS102"]);

    // Another teacher claiming CS101/a is rejected wholesale.
    let rejected = request(
        si,
        rd,
        "conflict",
        "offerings.sync",
        target(
            &t2,
            json!([
                { "subjectId": subject_ids[0], "section": "a" },
                { "subjectId": subject_ids[0], "section": "b" }
            ]),
        ),
    );
    assert_eq!(rejected["ok"], json!(false));
    assert_eq!(rejected["error"]["code"], json!("conflict"));
    let conflicts = rejected["error"]["details"]["conflicts"]
        .as_array()
        .expect("conflicts");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["teacherName"], json!("Ada Lovelace"));
    assert!(rejected["error"]["message"]
        .as_str()
        .unwrap_or("")
        .contains("Ada Lovelace"));
    let t2_listed = call(si, rd, "offerings.forTeacher", json!({ "teacherId": t2 }));
    assert!(t2_listed["offerings"].as_array().expect("offerings").is_empty());

    // Dropping CS101 removes it and unenrolls the class.
    let outcome = call(
        si,
        rd,
        "offerings.sync",
        target(&t1, json!([{ "subjectId": subject_ids[1], "section": "a" }])),
    );
    assert_eq!(outcome["removed"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(outcome["kept"], json!(1));
    let fetched = call(si, rd, "students.get", json!({ "studentId": student_id }));
    assert_eq!(subject_codes(&fetched), vec!["CS102"]);

    // The empty set clears everything for that (teacher, year, school year).
    let outcome = call(si, rd, "offerings.sync", target(&t1, json!([])));
    assert!(outcome["message"].as_str().unwrap_or("").contains("cleared"));
    let all = call(si, rd, "offerings.list", json!({}));
    assert!(all["offerings"].as_array().expect("offerings").is_empty());
    let fetched = call(si, rd, "students.get", json!({ "studentId": student_id }));
    assert!(subject_codes(&fetched).is_empty());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn assign_skips_taken_keys_and_selection_must_match_year_level() {
    let workspace = temp_dir("schoold-offerings-assign");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, rd) = (&mut stdin, &mut reader);

    call(si, rd, "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let course_id = call(si, rd, "courses.create", json!({ "name": "BSIT", "description": "" }))
        ["courseId"]
        .as_str()
        .expect("courseId")
        .to_string();
    let first_year = call(
        si,
        rd,
        "subjects.create",
        json!({ "courseId": course_id, "code": "IT101", "name": "Basics", "semester": "1st", "yearLevel": "1st" }),
    )["subjectId"]
        .as_str()
        .expect("subjectId")
        .to_string();
    let second_year = call(
        si,
        rd,
        "subjects.create",
        json!({ "courseId": course_id, "code": "IT201", "name": "Data", "semester": "1st", "yearLevel": "2nd" }),
    )["subjectId"]
        .as_str()
        .expect("subjectId")
        .to_string();
    let t1 = call(si, rd, "teachers.create", json!({ "firstName": "Ada", "lastName": "Lovelace" }))
        ["profileId"]
        .as_str()
        .expect("t1")
        .to_string();
    let t2 = call(si, rd, "teachers.create", json!({ "firstName": "Alan", "lastName": "Turing" }))
        ["profileId"]
        .as_str()
        .expect("t2")
        .to_string();

    let params = |teacher: &str, subject: &str| {
        json!({
            "teacherId": teacher,
            "year": "1st",
            "schoolYear": "2024-2025",
            "selections": [{ "subjectId": subject, "section": "a" }]
        })
    };

    let first = call(si, rd, "offerings.assign", params(&t1, &first_year));
    assert_eq!(first["created"].as_array().map(|a| a.len()), Some(1));
    let second = call(si, rd, "offerings.assign", params(&t2, &first_year));
    assert!(second["created"].as_array().expect("created").is_empty());
    assert!(second["skipped"][0]
        .as_str()
        .unwrap_or("")
        .contains("Ada Lovelace"));

    let wrong_year = request(si, rd, "wrong-year", "offerings.assign", params(&t1, &second_year));
    assert_eq!(wrong_year["error"]["code"], json!("bad_params"));

    let grid = call(
        si,
        rd,
        "offerings.grid",
        json!({ "year": "1st", "schoolYear": "2024-2025", "teacherId": t2 }),
    );
    assert_eq!(grid["subjects"].as_array().map(|a| a.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn editing_an_offering_moves_it_but_never_takes_another_teachers_key() {
    let workspace = temp_dir("schoold-offerings-edit");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, rd) = (&mut stdin, &mut reader);

    call(si, rd, "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let course_id = call(si, rd, "courses.create", json!({ "name": "BSIT", "description": "" }))
        ["courseId"]
        .as_str()
        .expect("courseId")
        .to_string();
    let mut subject_ids = Vec::new();
    for (code, level) in [("IT101", "1st"), ("IT201", "2nd")] {
        let created = call(
            si,
            rd,
            "subjects.create",
            json!({ "courseId": course_id, "code": code, "name": code, "semester": "1st", "yearLevel": level }),
        );
        subject_ids.push(created["subjectId"].as_str().expect("subjectId").to_string());
    }
    let (it101, it201) = (&subject_ids[0], &subject_ids[1]);
    let ada = call(si, rd, "teachers.create", json!({ "firstName": "Ada", "lastName": "Lovelace" }))
        ["profileId"]
        .as_str()
        .expect("ada")
        .to_string();
    let alan = call(si, rd, "teachers.create", json!({ "firstName": "Alan", "lastName": "Turing" }))
        ["profileId"]
        .as_str()
        .expect("alan")
        .to_string();
    let mut students = Vec::new();
    for (no, year) in [("S-1", "1st"), ("S-2", "2nd")] {
        let created = call(
            si,
            rd,
            "students.create",
            json!({
                "studentNo": no,
                "firstName": "Lea",
                "lastName": no,
                "courseId": course_id,
                "year": year,
                "section": "a"
            }),
        );
        students.push(
            created["student"]["profileId"]
                .as_str()
                .expect("student id")
                .to_string(),
        );
    }
    let (first_year, second_year) = (&students[0], &students[1]);

    call(
        si,
        rd,
        "offerings.sync",
        json!({
            "teacherId": ada,
            "year": "1st",
            "schoolYear": "2024-2025",
            "selections": [{ "subjectId": it101, "section": "a" }]
        }),
    );
    let offering_id = call(si, rd, "offerings.list", json!({}))["offerings"][0]["id"]
        .as_str()
        .expect("offering id")
        .to_string();

    // Alan cannot take Ada's key through her offering's edit page.
    let rejected = request(
        si,
        rd,
        "edit-conflict",
        "offerings.sync",
        json!({
            "teacherId": alan,
            "year": "1st",
            "schoolYear": "2024-2025",
            "offeringId": offering_id,
            "selections": [{ "subjectId": it101, "section": "a" }]
        }),
    );
    assert_eq!(rejected["error"]["code"], json!("conflict"));
    assert_eq!(
        rejected["error"]["details"]["conflicts"][0]["teacherName"],
        json!("Ada Lovelace")
    );
    let listed = call(si, rd, "offerings.list", json!({}));
    let offerings = listed["offerings"].as_array().expect("offerings");
    assert_eq!(offerings.len(), 1);
    assert_eq!(offerings[0]["teacherName"], json!("Ada Lovelace"));
    assert_eq!(offerings[0]["schoolYear"], json!("2024-2025"));
    let fetched = call(si, rd, "students.get", json!({ "studentId": first_year }));
    assert_eq!(subject_codes(&fetched), vec!["IT101"]);

    // Ada moves her own offering to the next school year; enrollment stays.
    let moved = call(
        si,
        rd,
        "offerings.sync",
        json!({
            "teacherId": ada,
            "year": "1st",
            "schoolYear": "2025-2026",
            "offeringId": offering_id,
            "selections": [{ "subjectId": it101, "section": "a" }]
        }),
    );
    assert_eq!(moved["kept"], json!(1));
    assert!(moved["created"].as_array().expect("created").is_empty());
    let listed = call(si, rd, "offerings.list", json!({}));
    assert_eq!(listed["offerings"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(listed["offerings"][0]["id"], json!(offering_id));
    assert_eq!(listed["offerings"][0]["schoolYear"], json!("2025-2026"));
    let fetched = call(si, rd, "students.get", json!({ "studentId": first_year }));
    assert_eq!(subject_codes(&fetched), vec!["IT101"]);

    // Handing the offering to Alan in another year level re-derives enrollment.
    let handed = call(
        si,
        rd,
        "offerings.sync",
        json!({
            "teacherId": alan,
            "year": "2nd",
            "schoolYear": "2025-2026",
            "offeringId": offering_id,
            "selections": [{ "subjectId": it201, "section": "a" }]
        }),
    );
    assert_eq!(handed["created"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(handed["removed"].as_array().map(|a| a.len()), Some(1));
    let listed = call(si, rd, "offerings.list", json!({}));
    let offerings = listed["offerings"].as_array().expect("offerings");
    assert_eq!(offerings.len(), 1);
    assert_eq!(offerings[0]["subjectCode"], json!("IT201"));
    assert_eq!(offerings[0]["teacherName"], json!("Alan Turing"));
    assert_eq!(offerings[0]["year"], json!("2nd"));
    let fetched = call(si, rd, "students.get", json!({ "studentId": first_year }));
    assert!(subject_codes(&fetched).is_empty());
    let fetched = call(si, rd, "students.get", json!({ "studentId": second_year }));
    assert_eq!(subject_codes(&fetched), vec!["IT201"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
