use crate::accounts::{
    self, AccountsFilter, Guardian, ParentAction, ParentInput, StudentFilter, StudentInput,
    TeacherInput, TeacherStudentFilter,
};
use crate::config::SchoolConfig;
use crate::error::{AppError, AppResult};
use crate::export;
use crate::ipc::error::{app_err, no_workspace, ok, respond};
use crate::ipc::helpers::{optional_str, raw_str, required_str, resolve_profile, string_list};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;

fn teacher_input(params: &Value) -> TeacherInput {
    TeacherInput {
        first_name: raw_str(params, "firstName"),
        last_name: raw_str(params, "lastName"),
    }
}

fn parent_input(params: &Value) -> ParentInput {
    ParentInput {
        first_name: raw_str(params, "firstName"),
        last_name: raw_str(params, "lastName"),
        contact_number: optional_str(params, "contactNumber"),
    }
}

fn student_input(params: &Value) -> StudentInput {
    StudentInput {
        student_no: raw_str(params, "studentNo"),
        first_name: raw_str(params, "firstName"),
        middle_name: optional_str(params, "middleName"),
        last_name: raw_str(params, "lastName"),
        course_id: optional_str(params, "courseId"),
        year: raw_str(params, "year").trim().to_string(),
        section: raw_str(params, "section").trim().to_string(),
        semester: raw_str(params, "semester"),
        is_regular: raw_str(params, "isRegular"),
    }
}

// ---------------------------------------------------------------- teachers

fn handle_teachers_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(
        &req.id,
        accounts::list_teachers(conn).map(|rows| json!({ "teachers": rows })),
    )
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(
        &req.id,
        accounts::create_teacher(conn, &state.config, &teacher_input(&req.params)),
    )
}

fn handle_teachers_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = required_str(&req.params, "teacherId")
        .and_then(|id| accounts::update_teacher(conn, &id, &teacher_input(&req.params)))
        .map(|_| json!({ "message": "Teacher updated successfully." }));
    respond(&req.id, result)
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = required_str(&req.params, "teacherId")
        .and_then(|id| accounts::delete_teacher(conn, &id))
        .map(|_| json!({ "message": "Teacher deleted successfully." }));
    respond(&req.id, result)
}

// ----------------------------------------------------------------- parents

fn handle_parents_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(
        &req.id,
        accounts::list_parents(conn).map(|rows| json!({ "parents": rows })),
    )
}

fn handle_parents_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(
        &req.id,
        accounts::create_parent(conn, &state.config, &parent_input(&req.params)),
    )
}

fn handle_parents_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = required_str(&req.params, "parentId")
        .and_then(|id| accounts::update_parent(conn, &id, &parent_input(&req.params)))
        .map(|_| json!({ "message": "Parent updated successfully." }));
    respond(&req.id, result)
}

fn handle_parents_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = required_str(&req.params, "parentId")
        .and_then(|id| accounts::delete_parent(conn, &id))
        .map(|_| json!({ "message": "Parent deleted successfully." }));
    respond(&req.id, result)
}

// ---------------------------------------------------------------- students

fn handle_students_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let filter = StudentFilter {
        course_id: optional_str(&req.params, "courseId"),
        year: optional_str(&req.params, "year"),
        section: optional_str(&req.params, "section"),
    };
    respond(
        &req.id,
        accounts::list_students(conn, &filter).map(|rows| json!({ "students": rows })),
    )
}

fn handle_students_get(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = required_str(&req.params, "studentId")
        .and_then(|id| accounts::get_student(conn, &id));
    respond(&req.id, result)
}

fn guardian(params: &Value) -> Guardian {
    if let Some(parent_id) = optional_str(params, "parentId") {
        return Guardian::Existing(parent_id);
    }
    match params.get("parent") {
        Some(p) if p.is_object() => Guardian::New(parent_input(p)),
        _ => Guardian::None,
    }
}

fn students_create(conn: &Connection, cfg: &SchoolConfig, params: &Value) -> AppResult<Value> {
    let subject_ids = string_list(params, "subjectIds")?;
    let created = accounts::create_student(
        conn,
        cfg,
        &student_input(params),
        &guardian(params),
        subject_ids.as_deref(),
    )?;
    Ok(json!({
        "message": "Student added successfully.",
        "student": created.student,
        "parent": created.parent,
        "parentId": created.parent_id,
        "subjectIds": created.subject_ids,
    }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(&req.id, students_create(conn, &state.config, &req.params))
}

fn parent_action(params: &Value) -> AppResult<ParentAction> {
    match optional_str(params, "parentAction").as_deref() {
        None | Some("keep") => Ok(ParentAction::Keep),
        Some("change") => Ok(ParentAction::Change(required_str(params, "parentId")?)),
        Some("add") => match params.get("parent") {
            Some(p) if p.is_object() => Ok(ParentAction::Add(parent_input(p))),
            _ => Err(AppError::invalid("parent", "missing parent")),
        },
        Some(other) => Err(AppError::invalid(
            "parentAction",
            format!("parentAction must be one of: keep, change, add (got {})", other),
        )),
    }
}

fn students_update(conn: &Connection, cfg: &SchoolConfig, params: &Value) -> AppResult<Value> {
    let student_id = required_str(params, "studentId")?;
    let subject_ids = string_list(params, "subjectIds")?;
    let action = parent_action(params)?;
    let new_parent = accounts::update_student(
        conn,
        cfg,
        &student_id,
        &student_input(params),
        subject_ids.as_deref(),
        &action,
    )?;
    Ok(json!({
        "message": "Student updated successfully.",
        "parent": new_parent,
    }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(&req.id, students_update(conn, &state.config, &req.params))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let result = required_str(&req.params, "studentId")
        .and_then(|id| accounts::delete_student(conn, &id))
        .map(|message| json!({ "message": message }));
    respond(&req.id, result)
}

fn handle_students_for_teacher(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let filter = TeacherStudentFilter {
        offering_id: optional_str(&req.params, "offeringId"),
        year: optional_str(&req.params, "year"),
        section: optional_str(&req.params, "section"),
        status: optional_str(&req.params, "status"),
    };
    let result = resolve_profile(&req.params, state.session.as_ref(), Role::Teacher, "teacherId")
        .and_then(|teacher_id| accounts::students_for_teacher(conn, &teacher_id, &filter))
        .map(|rows| json!({ "students": rows }));
    respond(&req.id, result)
}

// ------------------------------------------------------------- auth/admin

fn users_create_admin(conn: &Connection, params: &Value) -> AppResult<Value> {
    let username = required_str(params, "username")?;
    let email = required_str(params, "email")?;
    let password = raw_str(params, "password");
    let user_id = accounts::create_admin(conn, &username, &email, &password)?;
    Ok(json!({ "userId": user_id }))
}

fn handle_users_create_admin(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    respond(&req.id, users_create_admin(conn, &req.params))
}

fn handle_auth_login(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let identifier = raw_str(&req.params, "email");
    let identifier = if identifier.trim().is_empty() {
        raw_str(&req.params, "username")
    } else {
        identifier
    };
    let password = raw_str(&req.params, "password");
    match accounts::login(conn, &identifier, &password) {
        Ok(session) => {
            let result = json!({
                "role": session.role,
                "userId": session.user_id,
                "profileId": session.profile_id,
                "email": session.email,
                "mustChangePassword": session.must_change_password,
            });
            state.session = Some(session);
            ok(&req.id, result)
        }
        Err(e) => app_err(&req.id, &e),
    }
}

fn handle_auth_logout(state: &mut AppState, req: &Request) -> Value {
    if let Some(session) = state.session.take() {
        tracing::info!(user = %session.user_id, "logout");
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_auth_change_password(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let user_id = match state.session.as_ref() {
        Some(s) => Ok(s.user_id.clone()),
        None => required_str(&req.params, "userId"),
    };
    let result = user_id.and_then(|user_id| {
        accounts::change_password(
            conn,
            &user_id,
            &raw_str(&req.params, "newPassword1"),
            &raw_str(&req.params, "newPassword2"),
        )
    });
    match result {
        Ok(()) => {
            if let Some(session) = state.session.as_mut() {
                session.must_change_password = false;
            }
            ok(
                &req.id,
                json!({ "message": "Your password was successfully updated!" }),
            )
        }
        Err(e) => app_err(&req.id, &e),
    }
}

fn handle_accounts_dashboard(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let filter = AccountsFilter {
        role: optional_str(&req.params, "role"),
        year: optional_str(&req.params, "year"),
        section: optional_str(&req.params, "section"),
        course_id: optional_str(&req.params, "courseId"),
    };
    respond(&req.id, accounts::accounts_dashboard(conn, &filter))
}

fn handle_accounts_export(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let out_path = match (optional_str(&req.params, "outPath"), state.workspace.as_ref()) {
        (Some(p), _) => PathBuf::from(p),
        (None, Some(ws)) => ws.join(export::DEFAULT_EXPORT_FILE),
        (None, None) => PathBuf::from(export::DEFAULT_EXPORT_FILE),
    };
    respond(
        &req.id,
        export::export_accounts(conn, &out_path).map_err(AppError::Other),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.update" => Some(handle_teachers_update(state, req)),
        "teachers.delete" => Some(handle_teachers_delete(state, req)),
        "parents.list" => Some(handle_parents_list(state, req)),
        "parents.create" => Some(handle_parents_create(state, req)),
        "parents.update" => Some(handle_parents_update(state, req)),
        "parents.delete" => Some(handle_parents_delete(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.forTeacher" => Some(handle_students_for_teacher(state, req)),
        "users.createAdmin" => Some(handle_users_create_admin(state, req)),
        "auth.login" => Some(handle_auth_login(state, req)),
        "auth.logout" => Some(handle_auth_logout(state, req)),
        "auth.changePassword" => Some(handle_auth_change_password(state, req)),
        "accounts.dashboard" => Some(handle_accounts_dashboard(state, req)),
        "accounts.export" => Some(handle_accounts_export(state, req)),
        _ => None,
    }
}
