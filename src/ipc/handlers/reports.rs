use crate::error::AppResult;
use crate::ipc::error::{no_workspace, respond};
use crate::ipc::helpers::{optional_date, optional_str, resolve_profile};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::reports::{self, ReportFilter};
use serde_json::{json, Value};

fn report_filter(params: &Value) -> AppResult<ReportFilter> {
    Ok(ReportFilter {
        course_id: optional_str(params, "courseId"),
        year: optional_str(params, "year"),
        section: optional_str(params, "section"),
        semester: optional_str(params, "semester"),
        subject_id: optional_str(params, "subjectId"),
        start_date: optional_date(params, "startDate")?,
        end_date: optional_date(params, "endDate")?,
        search: optional_str(params, "search").or_else(|| optional_str(params, "searchName")),
    })
}

fn handle_reports_attendance(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = report_filter(&req.params).and_then(|f| reports::attendance_report(conn, &f));
    respond(&req.id, result)
}

fn handle_reports_parent_students(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = report_filter(&req.params)
        .and_then(|f| reports::parent_students(conn, &f))
        .map(|parents| json!({ "parents": parents }));
    respond(&req.id, result)
}

fn handle_reports_student_details(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = report_filter(&req.params)
        .and_then(|f| reports::student_details(conn, &f))
        .map(|students| json!({ "students": students }));
    respond(&req.id, result)
}

fn handle_reports_teacher_details(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = report_filter(&req.params)
        .and_then(|f| reports::teacher_details(conn, &state.config, &f))
        .map(|teachers| json!({ "sections": state.config.sections, "teachers": teachers }));
    respond(&req.id, result)
}

fn handle_reports_class_overview(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = resolve_profile(&req.params, state.session.as_ref(), Role::Teacher, "teacherId")
        .and_then(|teacher_id| {
            let f = report_filter(&req.params)?;
            reports::class_overview(conn, &state.config, &teacher_id, &f)
        })
        .map(|rows| json!({ "sections": state.config.sections, "rows": rows }));
    respond(&req.id, result)
}

fn handle_reports_attendance_summary(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = resolve_profile(&req.params, state.session.as_ref(), Role::Teacher, "teacherId")
        .and_then(|teacher_id| {
            let f = report_filter(&req.params)?;
            reports::attendance_summary(conn, &teacher_id, &f)
        });
    respond(&req.id, result)
}

fn handle_reports_detailed_attendance(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = resolve_profile(&req.params, state.session.as_ref(), Role::Teacher, "teacherId")
        .and_then(|teacher_id| {
            let f = report_filter(&req.params)?;
            reports::detailed_attendance(conn, &teacher_id, &f)
        });
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reports.attendance" => Some(handle_reports_attendance(state, req)),
        "reports.parentStudents" => Some(handle_reports_parent_students(state, req)),
        "reports.studentDetails" => Some(handle_reports_student_details(state, req)),
        "reports.teacherDetails" => Some(handle_reports_teacher_details(state, req)),
        "reports.classOverview" => Some(handle_reports_class_overview(state, req)),
        "reports.attendanceSummary" => Some(handle_reports_attendance_summary(state, req)),
        "reports.detailedAttendance" => Some(handle_reports_detailed_attendance(state, req)),
        _ => None,
    }
}
