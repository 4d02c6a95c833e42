use crate::accounts::Session;
use crate::error::AppResult;
use crate::ipc::error::{no_workspace, respond};
use crate::ipc::helpers::{optional_str, required_str, resolve_profile};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, Role};
use crate::reports;
use rusqlite::Connection;
use serde_json::{json, Value};

/// The student a student-scoped view is for. Students see only themselves,
/// parents only their own children.
fn scoped_student(conn: &Connection, session: Option<&Session>, params: &Value) -> AppResult<String> {
    match session.and_then(|s| Role::parse(&s.role)) {
        Some(Role::Student) => resolve_profile(params, session, Role::Student, "studentId"),
        Some(Role::Parent) => {
            let parent_id = resolve_profile(&Value::Null, session, Role::Parent, "parentId")?;
            let student_id = required_str(params, "studentId")?;
            reports::ensure_guardian(conn, &parent_id, &student_id)?;
            Ok(student_id)
        }
        _ => required_str(params, "studentId"),
    }
}

fn handle_dashboard_admin(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let year = optional_str(&req.params, "year");
    let subject_id = optional_str(&req.params, "subjectId");
    respond(
        &req.id,
        reports::admin_dashboard(conn, &state.config, year.as_deref(), subject_id.as_deref()),
    )
}

fn handle_dashboard_teacher(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = resolve_profile(&req.params, state.session.as_ref(), Role::Teacher, "teacherId")
        .and_then(|teacher_id| reports::teacher_dashboard(conn, &teacher_id, model::today()));
    respond(&req.id, result)
}

fn handle_dashboard_student(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = scoped_student(conn, state.session.as_ref(), &req.params)
        .and_then(|student_id| reports::student_dashboard(conn, &student_id, model::today()));
    respond(&req.id, result)
}

fn handle_dashboard_parent(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = resolve_profile(&req.params, state.session.as_ref(), Role::Parent, "parentId")
        .and_then(|parent_id| reports::parent_dashboard(conn, &parent_id));
    respond(&req.id, result)
}

fn handle_dashboard_student_attendance(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = scoped_student(conn, state.session.as_ref(), &req.params)
        .and_then(|student_id| reports::student_attendance(conn, &student_id))
        .map(|subjects| json!({ "subjects": subjects }));
    respond(&req.id, result)
}

fn attendance_detail(conn: &Connection, session: Option<&Session>, params: &Value) -> AppResult<reports::AttendanceDetail> {
    let student_id = scoped_student(conn, session, params)?;
    let subject_id = required_str(params, "subjectId")?;
    reports::attendance_detail(conn, &student_id, &subject_id)
}

fn handle_dashboard_attendance_detail(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(
        &req.id,
        attendance_detail(conn, state.session.as_ref(), &req.params),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "dashboard.admin" => Some(handle_dashboard_admin(state, req)),
        "dashboard.teacher" => Some(handle_dashboard_teacher(state, req)),
        "dashboard.student" => Some(handle_dashboard_student(state, req)),
        "dashboard.parent" => Some(handle_dashboard_parent(state, req)),
        "dashboard.studentAttendance" => Some(handle_dashboard_student_attendance(state, req)),
        "dashboard.attendanceDetail" => Some(handle_dashboard_attendance_detail(state, req)),
        _ => None,
    }
}
