use crate::accounts::Session;
use crate::attendance::{self, MarkSummary, PopulateSummary, Sheet, StatusMode};
use crate::config::SchoolConfig;
use crate::error::{AppError, AppResult};
use crate::ipc::error::{no_workspace, respond};
use crate::ipc::helpers::{optional_date, optional_str, optional_time, optional_u64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, AttendanceStatus};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::Connection;
use serde_json::Value;

fn session_teacher(session: Option<&Session>) -> Option<&str> {
    session.and_then(|s| s.teacher_id())
}

fn attendance_sheet(conn: &Connection, session: Option<&Session>, params: &Value) -> AppResult<Sheet> {
    let offering_id = required_str(params, "offeringId")?;
    let offering = attendance::offering_for(conn, &offering_id, session_teacher(session))?;
    let date = optional_date(params, "date")?.unwrap_or_else(model::today);
    let time = optional_time(params, "time")?.unwrap_or_else(model::now_time);
    let year = optional_str(params, "year");
    let section = optional_str(params, "section");
    attendance::sheet(conn, offering, date, time, year.as_deref(), section.as_deref())
}

fn handle_attendance_sheet(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(
        &req.id,
        attendance_sheet(conn, state.session.as_ref(), &req.params),
    )
}

fn parse_status(raw: &Value) -> AppResult<Option<AttendanceStatus>> {
    match raw {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => AttendanceStatus::parse(s).map(Some).ok_or_else(|| {
            AppError::invalid(
                "statuses",
                format!("status must be one of: present, absent, late (got {})", s),
            )
        }),
        _ => Err(AppError::invalid("statuses", "status must be a string")),
    }
}

/// `statuses` as `{studentId: status}` or `[{studentId, status}]`.
fn parse_statuses(params: &Value) -> AppResult<Vec<(String, Option<AttendanceStatus>)>> {
    match params.get("statuses") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(student_id, status)| Ok((student_id.clone(), parse_status(status)?)))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                let student_id = required_str(item, "studentId")
                    .map_err(|_| AppError::invalid("statuses", "entry is missing studentId"))?;
                let status = parse_status(item.get("status").unwrap_or(&Value::Null))?;
                Ok((student_id, status))
            })
            .collect(),
        Some(_) => Err(AppError::invalid(
            "statuses",
            "statuses must be an object or an array",
        )),
    }
}

fn attendance_mark(conn: &Connection, session: Option<&Session>, params: &Value) -> AppResult<MarkSummary> {
    let offering_id = required_str(params, "offeringId")?;
    let offering = attendance::offering_for(conn, &offering_id, session_teacher(session))?;
    let date = optional_date(params, "date")?.unwrap_or_else(model::today);
    let time = optional_time(params, "time")?.unwrap_or_else(model::now_time);
    let year = optional_str(params, "year");
    let section = optional_str(params, "section");
    let statuses = parse_statuses(params)?;
    attendance::mark(
        conn,
        &offering,
        date,
        time,
        year.as_deref(),
        section.as_deref(),
        &statuses,
    )
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(
        &req.id,
        attendance_mark(conn, state.session.as_ref(), &req.params),
    )
}

fn attendance_populate(conn: &Connection, cfg: &SchoolConfig, params: &Value) -> AppResult<PopulateSummary> {
    let start = model::parse_date("startDate", &required_str(params, "startDate")?)?;
    let end = model::parse_date("endDate", &required_str(params, "endDate")?)?;
    let raw_mode = optional_str(params, "status").unwrap_or_else(|| "random".to_string());
    let mode = StatusMode::parse(&raw_mode).ok_or_else(|| {
        AppError::invalid(
            "status",
            "status must be one of: present, absent, late, random",
        )
    })?;
    let mut rng = match optional_u64(params, "seed")? {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    attendance::populate(conn, cfg, start, end, mode, &mut rng)
}

fn handle_attendance_populate(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(
        &req.id,
        attendance_populate(conn, &state.config, &req.params),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "attendance.sheet" => Some(handle_attendance_sheet(state, req)),
        "attendance.mark" => Some(handle_attendance_mark(state, req)),
        "attendance.populate" => Some(handle_attendance_populate(state, req)),
        _ => None,
    }
}
