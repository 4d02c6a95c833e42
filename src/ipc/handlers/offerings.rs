use crate::config::SchoolConfig;
use crate::enrollment;
use crate::error::AppResult;
use crate::ipc::error::{no_workspace, respond};
use crate::ipc::helpers::{
    optional_bool, optional_str, raw_str, required_str, resolve_profile, selections,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::offerings::{self, AssignOutcome, AssignmentTarget, AutoAssignSummary, SyncOutcome};
use rusqlite::Connection;
use serde_json::{json, Value};

fn target(params: &Value) -> AssignmentTarget {
    AssignmentTarget {
        teacher_id: raw_str(params, "teacherId").trim().to_string(),
        year: raw_str(params, "year").trim().to_string(),
        school_year: raw_str(params, "schoolYear").trim().to_string(),
    }
}

fn handle_offerings_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(
        &req.id,
        offerings::list_offerings(conn).map(|rows| json!({ "offerings": rows })),
    )
}

fn offerings_grid(conn: &Connection, cfg: &SchoolConfig, params: &Value) -> AppResult<Value> {
    let year = required_str(params, "year")?;
    let school_year = optional_str(params, "schoolYear");
    let teacher_id = optional_str(params, "teacherId");
    let rows = offerings::assignment_grid(
        conn,
        cfg,
        &year,
        school_year.as_deref(),
        teacher_id.as_deref(),
    )?;
    Ok(json!({
        "year": year,
        "schoolYear": school_year,
        "sections": cfg.sections,
        "subjects": rows,
    }))
}

fn handle_offerings_grid(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(&req.id, offerings_grid(conn, &state.config, &req.params))
}

fn offerings_assign(conn: &Connection, cfg: &SchoolConfig, params: &Value) -> AppResult<AssignOutcome> {
    let wanted = selections(params)?;
    offerings::assign(conn, cfg, &target(params), &wanted)
}

fn handle_offerings_assign(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(&req.id, offerings_assign(conn, &state.config, &req.params))
}

fn offerings_sync(conn: &Connection, cfg: &SchoolConfig, params: &Value) -> AppResult<SyncOutcome> {
    let wanted = selections(params)?;
    let editing = optional_str(params, "offeringId");
    offerings::sync(conn, cfg, &target(params), &wanted, editing.as_deref())
}

fn handle_offerings_sync(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(&req.id, offerings_sync(conn, &state.config, &req.params))
}

fn handle_offerings_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = required_str(&req.params, "offeringId")
        .and_then(|id| offerings::delete_offering(conn, &id))
        .map(|unenrolled| {
            json!({
                "message": "Assignment deleted successfully.",
                "unenrolled": unenrolled,
            })
        });
    respond(&req.id, result)
}

fn handle_offerings_for_teacher(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = resolve_profile(&req.params, state.session.as_ref(), Role::Teacher, "teacherId")
        .and_then(|teacher_id| offerings::offerings_for_teacher(conn, &teacher_id))
        .map(|rows| json!({ "offerings": rows }));
    respond(&req.id, result)
}

fn offerings_auto_assign(conn: &Connection, params: &Value) -> AppResult<AutoAssignSummary> {
    let school_year = optional_str(params, "schoolYear");
    let unassigned_only = optional_bool(params, "unassignedOnly", false)?;
    offerings::auto_assign(conn, school_year.as_deref(), unassigned_only)
}

fn handle_offerings_auto_assign(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(&req.id, offerings_auto_assign(conn, &req.params))
}

fn handle_offerings_generate(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let school_year = optional_str(&req.params, "schoolYear")
        .unwrap_or_else(|| state.config.default_school_year.clone());
    respond(
        &req.id,
        offerings::generate(conn, &state.config, &school_year),
    )
}

fn handle_enrollment_reconcile(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = optional_bool(&req.params, "prune", false)
        .and_then(|prune| enrollment::reconcile(conn, prune));
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "offerings.list" => Some(handle_offerings_list(state, req)),
        "offerings.grid" => Some(handle_offerings_grid(state, req)),
        "offerings.assign" => Some(handle_offerings_assign(state, req)),
        "offerings.sync" => Some(handle_offerings_sync(state, req)),
        "offerings.delete" => Some(handle_offerings_delete(state, req)),
        "offerings.forTeacher" => Some(handle_offerings_for_teacher(state, req)),
        "offerings.autoAssign" => Some(handle_offerings_auto_assign(state, req)),
        "offerings.generate" => Some(handle_offerings_generate(state, req)),
        "enrollment.reconcile" => Some(handle_enrollment_reconcile(state, req)),
        _ => None,
    }
}
