use crate::config::SchoolConfig;
use crate::error::{AppError, AppResult};
use crate::model;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub subject_count: i64,
    pub student_count: i64,
}

pub fn list_courses(conn: &Connection) -> AppResult<Vec<CourseRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.description,
                (SELECT COUNT(*) FROM subjects s WHERE s.course_id = c.id),
                (SELECT COUNT(*) FROM students st WHERE st.course_id = c.id)
         FROM courses c
         ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(CourseRow {
                id: r.get(0)?,
                name: r.get(1)?,
                description: r.get(2)?,
                subject_count: r.get(3)?,
                student_count: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn clean_course(name: &str, description: &str) -> AppResult<(String, String)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::invalid("name", "course name is required"));
    }
    Ok((name.to_string(), description.trim().to_string()))
}

pub fn create_course(conn: &Connection, name: &str, description: &str) -> AppResult<String> {
    let (name, description) = clean_course(name, description)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO courses(id, name, description) VALUES(?, ?, ?)",
        (&id, &name, &description),
    )?;
    tracing::info!(course = %id, name = %name, "course created");
    Ok(id)
}

pub fn update_course(conn: &Connection, course_id: &str, name: &str, description: &str) -> AppResult<()> {
    let (name, description) = clean_course(name, description)?;
    let n = conn.execute(
        "UPDATE courses SET name = ?, description = ? WHERE id = ?",
        (&name, &description, course_id),
    )?;
    if n == 0 {
        return Err(AppError::NotFound("course"));
    }
    Ok(())
}

/// Subjects and students keep existing with no course.
pub fn delete_course(conn: &Connection, course_id: &str) -> AppResult<()> {
    let n = conn.execute("DELETE FROM courses WHERE id = ?", [course_id])?;
    if n == 0 {
        return Err(AppError::NotFound("course"));
    }
    tracing::info!(course = %course_id, "course deleted");
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub id: String,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub code: String,
    pub name: String,
    pub semester: String,
    pub year_level: String,
}

#[derive(Debug, Clone, Default)]
pub struct SubjectFilter {
    pub semester: Option<String>,
    pub course_id: Option<String>,
    /// Only subjects with at least one offering for this year.
    pub year: Option<String>,
    pub year_level: Option<String>,
}

pub fn list_subjects(conn: &Connection, filter: &SubjectFilter) -> AppResult<Vec<SubjectRow>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.course_id, c.name, s.code, s.name, s.semester, s.year_level
         FROM subjects s
         LEFT JOIN courses c ON c.id = s.course_id
         WHERE (?1 IS NULL OR s.semester = ?1)
           AND (?2 IS NULL OR s.course_id = ?2)
           AND (?3 IS NULL OR s.id IN (SELECT subject_id FROM subject_offerings WHERE year = ?3))
           AND (?4 IS NULL OR s.year_level = ?4)
         ORDER BY s.code, s.year_level, s.semester",
    )?;
    let rows = stmt
        .query_map(
            (
                &filter.semester,
                &filter.course_id,
                &filter.year,
                &filter.year_level,
            ),
            |r| {
                Ok(SubjectRow {
                    id: r.get(0)?,
                    course_id: r.get(1)?,
                    course_name: r.get(2)?,
                    code: r.get(3)?,
                    name: r.get(4)?,
                    semester: r.get(5)?,
                    year_level: r.get(6)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct SubjectInput {
    pub course_id: Option<String>,
    pub code: String,
    pub name: String,
    pub semester: String,
    pub year_level: String,
}

fn clean_subject(conn: &Connection, cfg: &SchoolConfig, input: &SubjectInput) -> AppResult<SubjectInput> {
    let code = input.code.trim();
    if code.is_empty() {
        return Err(AppError::invalid("code", "subject code is required"));
    }
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::invalid("name", "subject name is required"));
    }
    let semester = model::check_semester("semester", input.semester.trim())?;
    if !cfg.is_year_level(&input.year_level) {
        return Err(AppError::invalid(
            "yearLevel",
            format!("unknown year level: {}", input.year_level),
        ));
    }
    let course_id = input
        .course_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(course_id) = course_id {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| r.get(0))
            .optional()?;
        if found.is_none() {
            return Err(AppError::NotFound("course"));
        }
    }
    Ok(SubjectInput {
        course_id: course_id.map(str::to_string),
        code: code.to_string(),
        name: name.to_string(),
        semester,
        year_level: input.year_level.clone(),
    })
}

fn duplicate_subject(e: rusqlite::Error) -> AppError {
    match AppError::from(e) {
        AppError::AlreadyExists(_) => AppError::AlreadyExists(
            "A subject with this code, semester and year level already exists.".into(),
        ),
        other => other,
    }
}

pub fn create_subject(conn: &Connection, cfg: &SchoolConfig, input: &SubjectInput) -> AppResult<(String, String)> {
    let s = clean_subject(conn, cfg, input)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, course_id, code, name, semester, year_level)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &s.course_id, &s.code, &s.name, &s.semester, &s.year_level),
    )
    .map_err(duplicate_subject)?;
    tracing::info!(subject = %id, code = %s.code, "subject created");
    Ok((id, format!("Subject {} created successfully.", s.code)))
}

pub fn update_subject(
    conn: &Connection,
    cfg: &SchoolConfig,
    subject_id: &str,
    input: &SubjectInput,
) -> AppResult<String> {
    let s = clean_subject(conn, cfg, input)?;
    let n = conn
        .execute(
            "UPDATE subjects SET course_id = ?, code = ?, name = ?, semester = ?, year_level = ?
             WHERE id = ?",
            (&s.course_id, &s.code, &s.name, &s.semester, &s.year_level, subject_id),
        )
        .map_err(duplicate_subject)?;
    if n == 0 {
        return Err(AppError::NotFound("subject"));
    }
    Ok(format!("Subject {} updated successfully.", s.code))
}

/// Offerings, their attendance and enrollments go with the subject.
pub fn delete_subject(conn: &Connection, subject_id: &str) -> AppResult<String> {
    let code: String = conn
        .query_row("SELECT code FROM subjects WHERE id = ?", [subject_id], |r| r.get(0))
        .optional()?
        .ok_or(AppError::NotFound("subject"))?;
    conn.execute("DELETE FROM subjects WHERE id = ?", [subject_id])?;
    tracing::info!(subject = %subject_id, code = %code, "subject deleted");
    Ok(format!("Subject {} deleted successfully.", code))
}
