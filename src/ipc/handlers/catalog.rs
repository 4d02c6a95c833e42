use crate::catalog::{self, SubjectFilter, SubjectInput};
use crate::error::AppResult;
use crate::ipc::error::{no_workspace, respond};
use crate::ipc::helpers::{optional_str, raw_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn handle_courses_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(
        &req.id,
        catalog::list_courses(conn).map(|courses| json!({ "courses": courses })),
    )
}

fn courses_create(conn: &Connection, params: &Value) -> AppResult<Value> {
    let name = required_str(params, "name")?;
    let id = catalog::create_course(conn, &name, &raw_str(params, "description"))?;
    Ok(json!({ "courseId": id }))
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(&req.id, courses_create(conn, &req.params))
}

fn courses_update(conn: &Connection, params: &Value) -> AppResult<Value> {
    let id = required_str(params, "courseId")?;
    let name = required_str(params, "name")?;
    catalog::update_course(conn, &id, &name, &raw_str(params, "description"))?;
    Ok(json!({ "ok": true }))
}

fn handle_courses_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(&req.id, courses_update(conn, &req.params))
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = required_str(&req.params, "courseId")
        .and_then(|id| catalog::delete_course(conn, &id))
        .map(|_| json!({ "ok": true }));
    respond(&req.id, result)
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let filter = SubjectFilter {
        semester: optional_str(&req.params, "semester"),
        course_id: optional_str(&req.params, "courseId"),
        year: optional_str(&req.params, "year"),
        year_level: optional_str(&req.params, "yearLevel"),
    };
    respond(
        &req.id,
        catalog::list_subjects(conn, &filter).map(|subjects| json!({ "subjects": subjects })),
    )
}

fn subject_input(params: &Value) -> SubjectInput {
    SubjectInput {
        course_id: optional_str(params, "courseId"),
        code: raw_str(params, "code"),
        name: raw_str(params, "name"),
        semester: raw_str(params, "semester"),
        year_level: raw_str(params, "yearLevel"),
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = catalog::create_subject(conn, &state.config, &subject_input(&req.params))
        .map(|(id, message)| json!({ "subjectId": id, "message": message }));
    respond(&req.id, result)
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = required_str(&req.params, "subjectId")
        .and_then(|id| catalog::update_subject(conn, &state.config, &id, &subject_input(&req.params)))
        .map(|message| json!({ "message": message }));
    respond(&req.id, result)
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = required_str(&req.params, "subjectId")
        .and_then(|id| catalog::delete_subject(conn, &id))
        .map(|message| json!({ "message": message }));
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.update" => Some(handle_courses_update(state, req)),
        "courses.delete" => Some(handle_courses_delete(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.update" => Some(handle_subjects_update(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
