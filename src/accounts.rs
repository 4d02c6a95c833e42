//! Teacher, student, parent and admin accounts.

use crate::config::SchoolConfig;
use crate::enrollment;
use crate::error::{AppError, AppResult};
use crate::model::{self, Role};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Lowercase ASCII slug: accents are stripped via NFKD, spaces become
/// hyphens, everything else that is not alphanumeric, `_` or `-` is dropped.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().nfkd() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch.to_ascii_lowercase());
        } else if ch == '-' || ch.is_whitespace() {
            if !out.ends_with('-') {
                out.push('-');
            }
        }
    }
    out.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// `first.last` from whichever halves survive slugifying.
fn address_base(first_name: &str, last_name: &str) -> String {
    let parts: Vec<String> = [first_name, last_name]
        .iter()
        .map(|part| slugify(part))
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        return "user".to_string();
    }
    parts.join(".")
}

fn exists(conn: &Connection, sql: &str, value: &str) -> AppResult<bool> {
    let hit: Option<i64> = conn.query_row(sql, [value], |r| r.get(0)).optional()?;
    Ok(hit.is_some())
}

/// `first.last@domain` and `first.last`, with a numeric suffix on collision.
pub fn generate_unique_email(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    domain: &str,
) -> AppResult<(String, String)> {
    let base = address_base(first_name, last_name);

    let mut email = format!("{}@{}", base, domain);
    let mut counter = 1;
    while exists(conn, "SELECT 1 FROM users WHERE email = ?", &email)? {
        email = format!("{}{}@{}", base, counter, domain);
        counter += 1;
    }

    let mut username = base.clone();
    let mut counter = 1;
    while exists(conn, "SELECT 1 FROM users WHERE username = ?", &username)? {
        username = format!("{}{}", base, counter);
        counter += 1;
    }
    Ok((email, username))
}

pub fn random_password(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
}

/// Argon2id PHC string (`$argon2id$v=19$...`) with a fresh random salt.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// False for a wrong password or a stored value that is not a PHC string.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub user_id: String,
    pub profile_id: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

struct CreatedUser {
    id: String,
    email: String,
    username: String,
    password: String,
}

fn insert_generated_user(
    conn: &Connection,
    cfg: &SchoolConfig,
    role: Role,
    first_name: &str,
    last_name: &str,
    domain: &str,
) -> AppResult<CreatedUser> {
    let (email, username) = generate_unique_email(conn, first_name, last_name, domain)?;
    let password = random_password(cfg.password_length);
    let hash = hash_password(&password)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, username, email, role, password_hash,
                           initial_password, first_login, created_at)
         VALUES(?, ?, ?, ?, ?, ?, 1, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&id, &username, &email, role.as_str(), &hash, &password),
    )?;
    Ok(CreatedUser {
        id,
        email,
        username,
        password,
    })
}

pub fn create_admin(conn: &Connection, username: &str, email: &str, password: &str) -> AppResult<String> {
    let username = required("username", username)?;
    let email = required("email", email)?;
    check_new_password(password, password)?;
    let hash = hash_password(password)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, username, email, role, password_hash,
                           initial_password, first_login, created_at)
         VALUES(?, ?, ?, 'admin', ?, NULL, 0, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&id, &username, &email, &hash),
    )
    .map_err(|e| match AppError::from(e) {
        AppError::AlreadyExists(_) => AppError::AlreadyExists("Email Already exists.".into()),
        other => other,
    })?;
    tracing::info!(user = %id, "admin account created");
    Ok(id)
}

fn required(field: &str, raw: &str) -> AppResult<String> {
    let v = raw.trim();
    if v.is_empty() {
        return Err(AppError::invalid(field, format!("{} is required", field)));
    }
    Ok(v.to_string())
}

fn optional(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

// ---------------------------------------------------------------- teachers

#[derive(Debug, Clone, Default)]
pub struct TeacherInput {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRow {
    pub id: String,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub offering_count: i64,
}

pub fn list_teachers(conn: &Connection) -> AppResult<Vec<TeacherRow>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.user_id, t.first_name, t.last_name, u.email, u.username,
                (SELECT COUNT(*) FROM subject_offerings o WHERE o.teacher_id = t.id)
         FROM teachers t
         JOIN users u ON u.id = t.user_id
         ORDER BY t.last_name, t.first_name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(TeacherRow {
                id: r.get(0)?,
                user_id: r.get(1)?,
                first_name: r.get(2)?,
                last_name: r.get(3)?,
                email: r.get(4)?,
                username: r.get(5)?,
                offering_count: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_teacher(conn: &Connection, cfg: &SchoolConfig, input: &TeacherInput) -> AppResult<NewAccount> {
    let first = required("firstName", &input.first_name)?;
    let last = required("lastName", &input.last_name)?;
    let tx = conn.unchecked_transaction()?;
    let user = insert_generated_user(&tx, cfg, Role::Teacher, &first, &last, &cfg.domains.teacher)?;
    let profile_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO teachers(id, user_id, first_name, last_name) VALUES(?, ?, ?, ?)",
        (&profile_id, &user.id, &first, &last),
    )?;
    tx.commit()?;
    tracing::info!(teacher = %profile_id, email = %user.email, "teacher created");
    Ok(NewAccount {
        user_id: user.id,
        profile_id,
        email: user.email,
        username: user.username,
        password: user.password,
    })
}

pub fn update_teacher(conn: &Connection, teacher_id: &str, input: &TeacherInput) -> AppResult<()> {
    let first = required("firstName", &input.first_name)?;
    let last = required("lastName", &input.last_name)?;
    let n = conn.execute(
        "UPDATE teachers SET first_name = ?, last_name = ? WHERE id = ?",
        (&first, &last, teacher_id),
    )?;
    if n == 0 {
        return Err(AppError::NotFound("teacher"));
    }
    Ok(())
}

/// Removes the login and the profile; the teacher's offerings stay and
/// become unassigned.
pub fn delete_teacher(conn: &Connection, teacher_id: &str) -> AppResult<()> {
    let user_id: String = conn
        .query_row("SELECT user_id FROM teachers WHERE id = ?", [teacher_id], |r| r.get(0))
        .optional()?
        .ok_or(AppError::NotFound("teacher"))?;
    conn.execute("DELETE FROM users WHERE id = ?", [&user_id])?;
    tracing::info!(teacher = %teacher_id, "teacher deleted");
    Ok(())
}

// ----------------------------------------------------------------- parents

#[derive(Debug, Clone, Default)]
pub struct ParentInput {
    pub first_name: String,
    pub last_name: String,
    pub contact_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRow {
    pub id: String,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub contact_number: Option<String>,
    pub email: String,
    pub children: Vec<String>,
}

pub fn list_parents(conn: &Connection) -> AppResult<Vec<ParentRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.user_id, p.first_name, p.last_name, p.contact_number, u.email
         FROM parents p
         JOIN users u ON u.id = p.user_id
         ORDER BY p.first_name, p.last_name",
    )?;
    let mut parents = stmt
        .query_map([], |r| {
            Ok(ParentRow {
                id: r.get(0)?,
                user_id: r.get(1)?,
                first_name: r.get(2)?,
                last_name: r.get(3)?,
                contact_number: r.get(4)?,
                email: r.get(5)?,
                children: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for p in &mut parents {
        p.children = children_names(conn, &p.id)?;
    }
    Ok(parents)
}

fn children_names(conn: &Connection, parent_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT s.first_name || ' ' || s.last_name
         FROM student_guardians g
         JOIN students s ON s.id = g.student_id
         WHERE g.parent_id = ?
         ORDER BY s.last_name, s.first_name",
    )?;
    let names = stmt
        .query_map([parent_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

pub fn create_parent(conn: &Connection, cfg: &SchoolConfig, input: &ParentInput) -> AppResult<NewAccount> {
    let tx = conn.unchecked_transaction()?;
    let account = insert_parent(&tx, cfg, input)?;
    tx.commit()?;
    Ok(account)
}

fn insert_parent(conn: &Connection, cfg: &SchoolConfig, input: &ParentInput) -> AppResult<NewAccount> {
    let first = required("parent.firstName", &input.first_name)?;
    let last = required("parent.lastName", &input.last_name)?;
    let user = insert_generated_user(conn, cfg, Role::Parent, &first, &last, &cfg.domains.parent)?;
    let profile_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO parents(id, user_id, first_name, last_name, contact_number)
         VALUES(?, ?, ?, ?, ?)",
        (
            &profile_id,
            &user.id,
            &first,
            &last,
            optional(input.contact_number.as_deref()),
        ),
    )?;
    tracing::info!(parent = %profile_id, email = %user.email, "parent created");
    Ok(NewAccount {
        user_id: user.id,
        profile_id,
        email: user.email,
        username: user.username,
        password: user.password,
    })
}

pub fn update_parent(conn: &Connection, parent_id: &str, input: &ParentInput) -> AppResult<()> {
    let first = required("firstName", &input.first_name)?;
    let last = required("lastName", &input.last_name)?;
    let n = conn.execute(
        "UPDATE parents SET first_name = ?, last_name = ?, contact_number = ? WHERE id = ?",
        (
            &first,
            &last,
            optional(input.contact_number.as_deref()),
            parent_id,
        ),
    )?;
    if n == 0 {
        return Err(AppError::NotFound("parent"));
    }
    Ok(())
}

pub fn delete_parent(conn: &Connection, parent_id: &str) -> AppResult<()> {
    let user_id: String = conn
        .query_row("SELECT user_id FROM parents WHERE id = ?", [parent_id], |r| r.get(0))
        .optional()?
        .ok_or(AppError::NotFound("parent"))?;
    conn.execute("DELETE FROM users WHERE id = ?", [&user_id])?;
    tracing::info!(parent = %parent_id, "parent deleted");
    Ok(())
}

// ---------------------------------------------------------------- students

#[derive(Debug, Clone, Default)]
pub struct StudentInput {
    pub student_no: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub course_id: Option<String>,
    pub year: String,
    pub section: String,
    pub semester: String,
    pub is_regular: String,
}

struct CleanStudent {
    student_no: String,
    first_name: String,
    middle_name: Option<String>,
    last_name: String,
    course_id: Option<String>,
    year: String,
    section: String,
    semester: String,
    is_regular: String,
}

fn clean_student(conn: &Connection, cfg: &SchoolConfig, input: &StudentInput) -> AppResult<CleanStudent> {
    let student_no = required("studentNo", &input.student_no)?;
    let first_name = required("firstName", &input.first_name)?;
    let last_name = required("lastName", &input.last_name)?;
    if !cfg.is_year_level(&input.year) {
        return Err(AppError::invalid("year", format!("unknown year level: {}", input.year)));
    }
    if !cfg.is_section(&input.section) {
        return Err(AppError::invalid(
            "section",
            format!("unknown section: {}", input.section),
        ));
    }
    let semester = if input.semester.trim().is_empty() {
        "1st".to_string()
    } else {
        model::check_semester("semester", input.semester.trim())?
    };
    let is_regular = match input.is_regular.trim() {
        "" | "regular" => "regular".to_string(),
        "irregular" => "irregular".to_string(),
        _ => {
            return Err(AppError::invalid(
                "isRegular",
                "isRegular must be one of: regular, irregular",
            ))
        }
    };
    let course_id = optional(input.course_id.as_deref());
    if let Some(course_id) = &course_id {
        if !exists(conn, "SELECT 1 FROM courses WHERE id = ?", course_id)? {
            return Err(AppError::NotFound("course"));
        }
    }
    Ok(CleanStudent {
        student_no,
        first_name,
        middle_name: optional(input.middle_name.as_deref()),
        last_name,
        course_id,
        year: input.year.clone(),
        section: input.section.clone(),
        semester,
        is_regular,
    })
}

/// Guardian choice when creating a student.
#[derive(Debug, Clone)]
pub enum Guardian {
    None,
    Existing(String),
    New(ParentInput),
}

/// Guardian change when editing a student.
#[derive(Debug, Clone)]
pub enum ParentAction {
    Keep,
    Change(String),
    Add(ParentInput),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub student: NewAccount,
    pub parent: Option<NewAccount>,
    pub parent_id: Option<String>,
    pub subject_ids: Vec<String>,
}

fn duplicate_student(e: AppError) -> AppError {
    match e {
        AppError::AlreadyExists(_) => {
            AppError::AlreadyExists("Email or Student ID already exists.".into())
        }
        other => other,
    }
}

fn check_parent(conn: &Connection, parent_id: &str) -> AppResult<()> {
    if !exists(conn, "SELECT 1 FROM parents WHERE id = ?", parent_id)? {
        return Err(AppError::NotFound("parent"));
    }
    Ok(())
}

fn check_subjects(conn: &Connection, subject_ids: &[String]) -> AppResult<()> {
    for id in subject_ids {
        if !exists(conn, "SELECT 1 FROM subjects WHERE id = ?", id)? {
            return Err(AppError::NotFound("subject"));
        }
    }
    Ok(())
}

/// Creates the student's login and profile, links the guardian, and enrolls
/// either the given subjects or whatever the class's offerings imply.
pub fn create_student(
    conn: &Connection,
    cfg: &SchoolConfig,
    input: &StudentInput,
    guardian: &Guardian,
    subject_ids: Option<&[String]>,
) -> AppResult<NewStudent> {
    let s = clean_student(conn, cfg, input)?;
    let tx = conn.unchecked_transaction()?;

    let (parent, parent_id) = match guardian {
        Guardian::None => (None, None),
        Guardian::Existing(id) => {
            check_parent(&tx, id)?;
            (None, Some(id.clone()))
        }
        Guardian::New(p) => {
            let account = insert_parent(&tx, cfg, p)?;
            let id = account.profile_id.clone();
            (Some(account), Some(id))
        }
    };

    let user = insert_generated_user(
        &tx,
        cfg,
        Role::Student,
        &s.first_name,
        &s.last_name,
        &cfg.domains.student,
    )?;
    let profile_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO students(id, user_id, student_no, first_name, middle_name, last_name,
                              course_id, year, section, semester, is_regular)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &profile_id,
            &user.id,
            &s.student_no,
            &s.first_name,
            &s.middle_name,
            &s.last_name,
            &s.course_id,
            &s.year,
            &s.section,
            &s.semester,
            &s.is_regular,
        ),
    )
    .map_err(|e| duplicate_student(e.into()))?;

    if let Some(parent_id) = &parent_id {
        tx.execute(
            "INSERT INTO student_guardians(student_id, parent_id) VALUES(?, ?)",
            (&profile_id, parent_id),
        )?;
    }

    let subject_ids = match subject_ids {
        Some(ids) => {
            check_subjects(&tx, ids)?;
            ids.to_vec()
        }
        None => enrollment::derived_subjects_for_student(&tx, &profile_id)?,
    };
    enrollment::set_student_subjects(&tx, &profile_id, &subject_ids)?;
    tx.commit()?;

    tracing::info!(
        student = %profile_id,
        email = %user.email,
        subjects = subject_ids.len(),
        "student created"
    );
    Ok(NewStudent {
        student: NewAccount {
            user_id: user.id,
            profile_id,
            email: user.email,
            username: user.username,
            password: user.password,
        },
        parent,
        parent_id,
        subject_ids,
    })
}

pub fn update_student(
    conn: &Connection,
    cfg: &SchoolConfig,
    student_id: &str,
    input: &StudentInput,
    subject_ids: Option<&[String]>,
    parent_action: &ParentAction,
) -> AppResult<Option<NewAccount>> {
    let s = clean_student(conn, cfg, input)?;
    let tx = conn.unchecked_transaction()?;
    let n = tx
        .execute(
            "UPDATE students SET student_no = ?, first_name = ?, middle_name = ?, last_name = ?,
                                 course_id = ?, year = ?, section = ?, semester = ?, is_regular = ?
             WHERE id = ?",
            (
                &s.student_no,
                &s.first_name,
                &s.middle_name,
                &s.last_name,
                &s.course_id,
                &s.year,
                &s.section,
                &s.semester,
                &s.is_regular,
                student_id,
            ),
        )
        .map_err(|e| duplicate_student(e.into()))?;
    if n == 0 {
        return Err(AppError::NotFound("student"));
    }

    if let Some(ids) = subject_ids.filter(|ids| !ids.is_empty()) {
        check_subjects(&tx, ids)?;
        enrollment::set_student_subjects(&tx, student_id, ids)?;
    }

    let created_parent = match parent_action {
        ParentAction::Keep => None,
        ParentAction::Change(parent_id) => {
            check_parent(&tx, parent_id)?;
            tx.execute(
                "DELETE FROM student_guardians WHERE student_id = ?",
                [student_id],
            )?;
            tx.execute(
                "INSERT INTO student_guardians(student_id, parent_id) VALUES(?, ?)",
                (student_id, parent_id),
            )?;
            None
        }
        ParentAction::Add(p) => {
            let account = insert_parent(&tx, cfg, p)?;
            tx.execute(
                "INSERT INTO student_guardians(student_id, parent_id) VALUES(?, ?)",
                (student_id, &account.profile_id),
            )?;
            Some(account)
        }
    };
    tx.commit()?;
    tracing::info!(student = %student_id, "student updated");
    Ok(created_parent)
}

pub fn delete_student(conn: &Connection, student_id: &str) -> AppResult<String> {
    let (user_id, name): (String, String) = conn
        .query_row(
            "SELECT user_id, first_name || ' ' || last_name FROM students WHERE id = ?",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?
        .ok_or(AppError::NotFound("student"))?;
    conn.execute("DELETE FROM users WHERE id = ?", [&user_id])?;
    tracing::info!(student = %student_id, "student deleted");
    Ok(format!("Student {} has been successfully deleted.", name))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectBrief {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub user_id: String,
    pub student_no: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub year: String,
    pub section: String,
    pub semester: String,
    pub is_regular: String,
    pub subjects: Vec<SubjectBrief>,
    pub parents: Vec<String>,
}

const STUDENT_SELECT: &str = "SELECT st.id, st.user_id, st.student_no, st.first_name, st.middle_name,
        st.last_name, u.email, st.course_id, c.name, st.year, st.section, st.semester, st.is_regular
     FROM students st
     JOIN users u ON u.id = st.user_id
     LEFT JOIN courses c ON c.id = st.course_id";

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    let first: String = r.get(3)?;
    let last: String = r.get(5)?;
    Ok(StudentRow {
        id: r.get(0)?,
        user_id: r.get(1)?,
        student_no: r.get(2)?,
        full_name: model::full_name(&first, &last),
        first_name: first,
        middle_name: r.get(4)?,
        last_name: last,
        email: r.get(6)?,
        course_id: r.get(7)?,
        course_name: r.get(8)?,
        year: r.get(9)?,
        section: r.get(10)?,
        semester: r.get(11)?,
        is_regular: r.get(12)?,
        subjects: Vec::new(),
        parents: Vec::new(),
    })
}

pub fn student_subjects(conn: &Connection, student_id: &str) -> AppResult<Vec<SubjectBrief>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.code, s.name
         FROM student_subjects ss
         JOIN subjects s ON s.id = ss.subject_id
         WHERE ss.student_id = ?
         ORDER BY s.code",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok(SubjectBrief {
                id: r.get(0)?,
                code: r.get(1)?,
                name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn student_parents(conn: &Connection, student_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT p.id FROM student_guardians g
         JOIN parents p ON p.id = g.parent_id
         WHERE g.student_id = ?
         ORDER BY p.first_name, p.last_name",
    )?;
    let rows = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub course_id: Option<String>,
    pub year: Option<String>,
    pub section: Option<String>,
}

pub fn list_students(conn: &Connection, filter: &StudentFilter) -> AppResult<Vec<StudentRow>> {
    let sql = format!(
        "{} WHERE (?1 IS NULL OR st.course_id = ?1)
             AND (?2 IS NULL OR st.year = ?2)
             AND (?3 IS NULL OR st.section = ?3)
         ORDER BY st.last_name, st.first_name",
        STUDENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query_map(
            (&filter.course_id, &filter.year, &filter.section),
            student_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    for row in &mut rows {
        row.subjects = student_subjects(conn, &row.id)?;
        row.parents = student_parents(conn, &row.id)?;
    }
    Ok(rows)
}

pub fn get_student(conn: &Connection, student_id: &str) -> AppResult<StudentRow> {
    let sql = format!("{} WHERE st.id = ?", STUDENT_SELECT);
    let mut row = conn
        .query_row(&sql, [student_id], student_from_row)
        .optional()?
        .ok_or(AppError::NotFound("student"))?;
    row.subjects = student_subjects(conn, student_id)?;
    row.parents = student_parents(conn, student_id)?;
    Ok(row)
}

#[derive(Debug, Clone, Default)]
pub struct TeacherStudentFilter {
    pub offering_id: Option<String>,
    pub year: Option<String>,
    pub section: Option<String>,
    pub status: Option<String>,
}

/// The teacher's student list: one offering's class, or every student
/// enrolled in a subject the teacher offers.
pub fn students_for_teacher(
    conn: &Connection,
    teacher_id: &str,
    filter: &TeacherStudentFilter,
) -> AppResult<Vec<StudentRow>> {
    let ids: Vec<String> = match &filter.offering_id {
        Some(offering_id) => {
            let offering = crate::attendance::offering_for(conn, offering_id, Some(teacher_id))?;
            enrollment::matching_students(
                conn,
                offering.course_id.as_deref(),
                &offering.year,
                &offering.section,
            )?
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT ss.student_id
                 FROM student_subjects ss
                 JOIN subject_offerings o ON o.subject_id = ss.subject_id
                 WHERE o.teacher_id = ?",
            )?;
            let rows = stmt
                .query_map([teacher_id], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };

    let mut out = Vec::new();
    for id in ids {
        let row = get_student(conn, &id)?;
        if filter.year.as_deref().is_some_and(|y| y != row.year)
            || filter.section.as_deref().is_some_and(|s| s != row.section)
            || filter.status.as_deref().is_some_and(|s| s != row.is_regular)
        {
            continue;
        }
        out.push(row);
    }
    out.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
    Ok(out)
}

// ------------------------------------------------------------------- login

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub role: String,
    pub profile_id: Option<String>,
    pub email: String,
    pub must_change_password: bool,
}

impl Session {
    pub fn teacher_id(&self) -> Option<&str> {
        if self.role == Role::Teacher.as_str() {
            self.profile_id.as_deref()
        } else {
            None
        }
    }
}

fn profile_id_for(conn: &Connection, role: Role, user_id: &str) -> AppResult<Option<String>> {
    let table = match role {
        Role::Admin => return Ok(None),
        Role::Teacher => "teachers",
        Role::Student => "students",
        Role::Parent => "parents",
    };
    let sql = format!("SELECT id FROM {} WHERE user_id = ?", table);
    let id = conn.query_row(&sql, [user_id], |r| r.get(0)).optional()?;
    Ok(id)
}

/// Authenticates by email or username.
pub fn login(conn: &Connection, identifier: &str, password: &str) -> AppResult<Session> {
    let found = conn
        .query_row(
            "SELECT id, email, role, password_hash, first_login
             FROM users WHERE email = ?1 OR username = ?1",
            [identifier.trim()],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;
    let Some((user_id, email, role, hash, first_login)) = found else {
        tracing::info!("login rejected: unknown account");
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password(password, &hash) {
        tracing::info!(user = %user_id, "login rejected: bad password");
        return Err(AppError::InvalidCredentials);
    }
    let parsed = Role::parse(&role).ok_or(AppError::InvalidCredentials)?;
    let profile_id = profile_id_for(conn, parsed, &user_id)?;
    tracing::info!(user = %user_id, role = %role, "login");
    Ok(Session {
        user_id,
        role,
        profile_id,
        email,
        must_change_password: first_login != 0,
    })
}

fn check_new_password(new1: &str, new2: &str) -> AppResult<()> {
    if new1 != new2 {
        return Err(AppError::invalid(
            "newPassword2",
            "The two password fields didn't match.",
        ));
    }
    if new1.chars().count() < 8 {
        return Err(AppError::invalid(
            "newPassword1",
            "This password is too short. It must contain at least 8 characters.",
        ));
    }
    if new1.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::invalid(
            "newPassword1",
            "This password is entirely numeric.",
        ));
    }
    Ok(())
}

/// Sets a new password, clears the first-login flag and forgets the
/// generated one.
pub fn change_password(conn: &Connection, user_id: &str, new1: &str, new2: &str) -> AppResult<()> {
    check_new_password(new1, new2)?;
    let hash = hash_password(new1)?;
    let n = conn.execute(
        "UPDATE users SET password_hash = ?, initial_password = NULL, first_login = 0
         WHERE id = ?",
        (&hash, user_id),
    )?;
    if n == 0 {
        return Err(AppError::NotFound("user"));
    }
    tracing::info!(user = %user_id, "password changed");
    Ok(())
}

// --------------------------------------------------------------- dashboard

#[derive(Debug, Clone, Default)]
pub struct AccountsFilter {
    pub role: Option<String>,
    pub year: Option<String>,
    pub section: Option<String>,
    pub course_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLine {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub course: Option<String>,
    pub children: Option<String>,
    pub subjects: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGroup {
    pub key: String,
    pub students: Vec<AccountLine>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsDashboard {
    pub student_groups: Vec<StudentGroup>,
    pub parents: Vec<AccountLine>,
    pub teachers: Vec<AccountLine>,
}

fn password_column(initial: Option<String>) -> String {
    initial.unwrap_or_else(|| "N/A".to_string())
}

/// Account listing for the admin: students grouped by "year - section",
/// parents narrowed to those with a matching child, teachers narrowed by
/// the year and course they teach.
pub fn accounts_dashboard(conn: &Connection, filter: &AccountsFilter) -> AppResult<AccountsDashboard> {
    let role = filter.role.as_deref().unwrap_or("");
    let mut out = AccountsDashboard::default();

    if role.is_empty() || role == "student" {
        let mut stmt = conn.prepare(
            "SELECT st.year, st.section, st.first_name, st.last_name, u.email,
                    u.initial_password, c.name
             FROM students st
             JOIN users u ON u.id = st.user_id
             LEFT JOIN courses c ON c.id = st.course_id
             WHERE (?1 IS NULL OR st.year = ?1)
               AND (?2 IS NULL OR st.section = ?2)
               AND (?3 IS NULL OR st.course_id = ?3)
             ORDER BY st.year, st.section, st.last_name, st.first_name",
        )?;
        let rows = stmt
            .query_map((&filter.year, &filter.section, &filter.course_id), |r| {
                Ok((
                    format!("{} - {}", r.get::<_, String>(0)?, r.get::<_, String>(1)?),
                    AccountLine {
                        first_name: r.get(2)?,
                        last_name: r.get(3)?,
                        email: r.get(4)?,
                        password: password_column(r.get(5)?),
                        course: Some(r.get::<_, Option<String>>(6)?.unwrap_or_else(|| "N/A".into())),
                        children: None,
                        subjects: None,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (key, line) in rows {
            match out.student_groups.iter_mut().find(|g| g.key == key) {
                Some(group) => group.students.push(line),
                None => out.student_groups.push(StudentGroup {
                    key,
                    students: vec![line],
                }),
            }
        }
    }

    if role.is_empty() || role == "parent" {
        let mut stmt = conn.prepare(
            "SELECT p.id, p.first_name, p.last_name, u.email, u.initial_password
             FROM parents p
             JOIN users u ON u.id = p.user_id
             WHERE (?1 IS NULL AND ?2 IS NULL AND ?3 IS NULL)
                OR EXISTS (
                   SELECT 1 FROM student_guardians g
                   JOIN students st ON st.id = g.student_id
                   WHERE g.parent_id = p.id
                     AND (?1 IS NULL OR st.year = ?1)
                     AND (?2 IS NULL OR st.section = ?2)
                     AND (?3 IS NULL OR st.course_id = ?3))
             ORDER BY p.first_name, p.last_name",
        )?;
        let rows = stmt
            .query_map((&filter.year, &filter.section, &filter.course_id), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (id, first_name, last_name, email, initial) in rows {
            out.parents.push(AccountLine {
                first_name,
                last_name,
                email,
                password: password_column(initial),
                course: None,
                children: Some(children_names(conn, &id)?.join(", ")),
                subjects: None,
            });
        }
    }

    if role.is_empty() || role == "teacher" {
        let mut stmt = conn.prepare(
            "SELECT t.id, t.first_name, t.last_name, u.email, u.initial_password
             FROM teachers t
             JOIN users u ON u.id = t.user_id
             WHERE (?1 IS NULL OR EXISTS (
                      SELECT 1 FROM subject_offerings o
                      WHERE o.teacher_id = t.id AND o.year = ?1))
               AND (?2 IS NULL OR EXISTS (
                      SELECT 1 FROM subject_offerings o
                      JOIN subjects s ON s.id = o.subject_id
                      WHERE o.teacher_id = t.id AND s.course_id = ?2))
             ORDER BY t.last_name, t.first_name",
        )?;
        let rows = stmt
            .query_map((&filter.year, &filter.course_id), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (id, first_name, last_name, email, initial) in rows {
            out.teachers.push(AccountLine {
                first_name,
                last_name,
                email,
                password: password_column(initial),
                course: None,
                children: None,
                subjects: Some(teacher_subject_codes(conn, &id)?.join(", ")),
            });
        }
    }

    Ok(out)
}

pub fn teacher_subject_codes(conn: &Connection, teacher_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT s.code FROM subject_offerings o
         JOIN subjects s ON s.id = o.subject_id
         WHERE o.teacher_id = ?
         ORDER BY o.school_year, o.year, o.section, s.code",
    )?;
    let codes = stmt
        .query_map([teacher_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_matches_form_expectations() {
        assert_eq!(slugify("Mary Ann"), "mary-ann");
        assert_eq!(slugify("  O'Brien "), "obrien");
        assert_eq!(slugify("Dela  Cruz"), "dela-cruz");
        assert_eq!(slugify("José"), "jose");
        assert_eq!(slugify("Ñuñez Peña"), "nunez-pena");
        assert_eq!(slugify("李"), "");
    }

    #[test]
    fn address_base_skips_empty_halves() {
        assert_eq!(address_base("José", "Rizal"), "jose.rizal");
        assert_eq!(address_base("李", "Rizal"), "rizal");
        assert_eq!(address_base("李", "王"), "user");
    }

    #[test]
    fn stored_hash_is_a_salted_argon2_phc_string() {
        let a = hash_password("secret-pass").expect("hash");
        let b = hash_password("secret-pass").expect("hash");
        assert!(a.starts_with("$argon2id$"));
        assert_ne!(a, b);
        assert!(verify_password("secret-pass", &a));
        assert!(verify_password("secret-pass", &b));
        assert!(!verify_password("secret-pasS", &a));
        assert!(!verify_password("secret-pass", "not-a-phc-string"));
    }

    #[test]
    fn random_password_has_requested_length() {
        let p = random_password(8);
        assert_eq!(p.chars().count(), 8);
        assert!(p.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn new_password_rules() {
        assert!(check_new_password("abcdefgh", "abcdefgh").is_ok());
        assert!(check_new_password("abcdefgh", "abcdefgi").is_err());
        assert!(check_new_password("short", "short").is_err());
        assert!(check_new_password("12345678", "12345678").is_err());
    }
}
