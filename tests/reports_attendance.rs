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

fn call(
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
    let resp: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(resp["ok"], json!(true), "{} failed: {}", method, resp);
    resp["result"].clone()
}

fn id_of(v: &Value, key: &str) -> String {
    v[key].as_str().expect(key).to_string()
}

fn approx(v: &Value, expected: f64) {
    let got = v.as_f64().expect("number");
    assert!((got - expected).abs() < 1e-9, "expected {}, got {}", expected, got);
}

#[test]
fn attendance_reports_compute_counts_and_percentages() {
    let workspace = temp_dir("schoold-reports-attendance");
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

    let mut ids = Vec::new();
    for (no, first) in [("S-1", "Ana"), ("S-2", "Ben"), ("S-3", "Carlo")] {
        let created = call(
            si,
            rd,
            "students.create",
            json!({
                "studentNo": no,
                "firstName": first,
                "lastName": "Reyes",
                "courseId": course_id,
                "year": "1st",
                "section": "a"
            }),
        );
        // Created after the offering, so enrollment is derived.
        assert_eq!(created["subjectIds"], json!([subject_id]));
        ids.push(id_of(&created["student"], "profileId"));
    }
    let (ana, ben, carlo) = (&ids[0], &ids[1], &ids[2]);

    for (date, marks) in [
        ("2024-09-02", vec![(ana, "present"), (ben, "late")]),
        ("2024-09-03", vec![(ana, "present"), (ben, "absent")]),
        ("2024-09-04", vec![(ana, "absent")]),
    ] {
        let statuses: Vec<Value> = marks
            .iter()
            .map(|(id, status)| json!({ "studentId": id, "status": status }))
            .collect();
        call(
            si,
            rd,
            "attendance.mark",
            json!({ "offeringId": offering_id, "date": date, "time": "09:00", "statuses": statuses }),
        );
    }

    let report = call(si, rd, "reports.attendance", json!({ "subjectId": subject_id }));
    let summary = report["summary"].as_array().expect("summary");
    assert_eq!(summary.len(), 2, "students without records are not listed");
    assert_eq!(summary[0]["studentId"], json!(ana));
    assert_eq!(summary[0]["present"], json!(2));
    assert_eq!(summary[0]["total"], json!(3));
    approx(&summary[0]["presentPercentage"], 66.67);
    assert_eq!(summary[1]["late"], json!(1));
    approx(&summary[1]["presentPercentage"], 0.0);
    assert_eq!(report["records"].as_array().map(|a| a.len()), Some(5));

    let ranged = call(si, rd, "reports.attendance", json!({ "startDate": "2024-09-03" }));
    approx(&ranged["summary"][0]["presentPercentage"], 50.0);

    let teacher_summary = call(
        si,
        rd,
        "reports.attendanceSummary",
        json!({ "teacherId": teacher_id, "startDate": "2024-09-01", "endDate": "2024-09-30" }),
    );
    let row = &teacher_summary["rows"][0];
    assert_eq!(row["totalInClass"], json!(3));
    assert_eq!(row["present"], json!(2));
    assert_eq!(row["late"], json!(1));
    assert_eq!(row["absent"], json!(2));
    approx(&row["avgAttendance"], 60.0);

    let empty = call(
        si,
        rd,
        "reports.attendanceSummary",
        json!({ "teacherId": teacher_id, "startDate": "2024-10-01", "endDate": "2024-10-02" }),
    );
    assert_eq!(empty["rows"][0]["present"], json!(0));
    approx(&empty["rows"][0]["avgAttendance"], 0.0);

    let detailed = call(
        si,
        rd,
        "reports.detailedAttendance",
        json!({
            "teacherId": teacher_id,
            "startDate": "2024-09-01",
            "endDate": "2024-09-30",
            "search": "ANA"
        }),
    );
    let rows = detailed["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["status"], json!("Present"));
    assert_eq!(rows[2]["status"], json!("Absent"));

    let per_subject = call(si, rd, "dashboard.studentAttendance", json!({ "studentId": ana }));
    approx(&per_subject["subjects"][0]["presentPercentage"], 66.67);

    let untouched = call(si, rd, "dashboard.studentAttendance", json!({ "studentId": carlo }));
    assert_eq!(untouched["subjects"][0]["total"], json!(0));
    approx(&untouched["subjects"][0]["presentPercentage"], 0.0);

    let detail = call(
        si,
        rd,
        "dashboard.attendanceDetail",
        json!({ "studentId": ben, "subjectId": subject_id }),
    );
    assert_eq!(detail["counts"]["late"], json!(1));
    assert_eq!(detail["records"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(detail["records"][0]["date"], json!("2024-09-03"));

    let overview = call(si, rd, "reports.classOverview", json!({ "teacherId": teacher_id }));
    assert_eq!(overview["rows"][0]["totalStudents"], json!(3));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
