//! Student-subject enrollment derived from offerings.
//!
//! A student takes a subject when some offering of that subject targets the
//! student's (course, year, section). Every mutation that changes offerings
//! goes through these helpers so the matching rule lives in one place.

use crate::error::AppResult;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

/// The (subject, year, section) key plus the subject's course, which is what
/// student matching needs.
#[derive(Debug, Clone)]
pub struct OfferingKey {
    pub offering_id: String,
    pub subject_id: String,
    pub course_id: Option<String>,
    pub year: String,
    pub section: String,
}

pub fn offering_key(conn: &Connection, offering_id: &str) -> AppResult<Option<OfferingKey>> {
    let key = conn
        .query_row(
            "SELECT o.id, o.subject_id, s.course_id, o.year, o.section
             FROM subject_offerings o
             JOIN subjects s ON s.id = o.subject_id
             WHERE o.id = ?",
            [offering_id],
            |r| {
                Ok(OfferingKey {
                    offering_id: r.get(0)?,
                    subject_id: r.get(1)?,
                    course_id: r.get(2)?,
                    year: r.get(3)?,
                    section: r.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(key)
}

/// Students whose class matches. A subject without a course matches nobody.
pub fn matching_students(
    conn: &Connection,
    course_id: Option<&str>,
    year: &str,
    section: &str,
) -> AppResult<Vec<String>> {
    let Some(course_id) = course_id else {
        return Ok(Vec::new());
    };
    let mut stmt = conn.prepare(
        "SELECT id FROM students
         WHERE course_id = ? AND year = ? AND section = ?
         ORDER BY last_name, first_name",
    )?;
    let ids = stmt
        .query_map((course_id, year, section), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Adds the offering's subject to every matching student. Returns how many
/// enrollments were new.
pub fn enroll_for_offering(conn: &Connection, key: &OfferingKey) -> AppResult<usize> {
    let students = matching_students(conn, key.course_id.as_deref(), &key.year, &key.section)?;
    let mut added = 0;
    for student_id in students {
        added += conn.execute(
            "INSERT OR IGNORE INTO student_subjects(student_id, subject_id) VALUES(?, ?)",
            (&student_id, &key.subject_id),
        )?;
    }
    Ok(added)
}

/// Removes the subject from matching students unless another offering of the
/// same subject still targets that (year, section).
pub fn unenroll_for_offering(conn: &Connection, key: &OfferingKey) -> AppResult<usize> {
    let still_offered: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subject_offerings
             WHERE subject_id = ? AND year = ? AND section = ? AND id <> ?
             LIMIT 1",
            (&key.subject_id, &key.year, &key.section, &key.offering_id),
            |r| r.get(0),
        )
        .optional()?;
    if still_offered.is_some() {
        return Ok(0);
    }
    let students = matching_students(conn, key.course_id.as_deref(), &key.year, &key.section)?;
    let mut removed = 0;
    for student_id in students {
        removed += conn.execute(
            "DELETE FROM student_subjects WHERE student_id = ? AND subject_id = ?",
            (&student_id, &key.subject_id),
        )?;
    }
    Ok(removed)
}

/// Subjects a student should take given the current offerings.
pub fn derived_subjects_for_student(conn: &Connection, student_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT o.subject_id
         FROM students st
         JOIN subject_offerings o ON o.year = st.year AND o.section = st.section
         JOIN subjects s ON s.id = o.subject_id AND s.course_id = st.course_id
         WHERE st.id = ?
         ORDER BY o.subject_id",
    )?;
    let ids = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub students_checked: usize,
    pub enrollments_added: usize,
    pub enrollments_removed: usize,
}

/// Re-derives enrollment for every student. Without `prune` only missing
/// links are added, so hand-picked enrollments of irregular students stay.
pub fn reconcile(conn: &Connection, prune: bool) -> AppResult<ReconcileSummary> {
    let tx = conn.unchecked_transaction()?;
    let student_ids = {
        let mut stmt = tx.prepare("SELECT id FROM students ORDER BY id")?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let mut summary = ReconcileSummary::default();
    for student_id in &student_ids {
        summary.students_checked += 1;
        let derived = derived_subjects_for_student(&tx, student_id)?;
        for subject_id in &derived {
            summary.enrollments_added += tx.execute(
                "INSERT OR IGNORE INTO student_subjects(student_id, subject_id) VALUES(?, ?)",
                (student_id, subject_id),
            )?;
        }
        if prune {
            let current = enrolled_subject_ids(&tx, student_id)?;
            for subject_id in current.iter().filter(|s| !derived.contains(s)) {
                summary.enrollments_removed += tx.execute(
                    "DELETE FROM student_subjects WHERE student_id = ? AND subject_id = ?",
                    (student_id, subject_id),
                )?;
            }
        }
    }
    tx.commit()?;

    tracing::info!(
        students = summary.students_checked,
        added = summary.enrollments_added,
        removed = summary.enrollments_removed,
        prune,
        "enrollment reconciled"
    );
    Ok(summary)
}

pub fn enrolled_subject_ids(conn: &Connection, student_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT subject_id FROM student_subjects WHERE student_id = ? ORDER BY subject_id",
    )?;
    let ids = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Replaces a student's enrollment with exactly `subject_ids`.
pub fn set_student_subjects(
    conn: &Connection,
    student_id: &str,
    subject_ids: &[String],
) -> AppResult<()> {
    conn.execute(
        "DELETE FROM student_subjects WHERE student_id = ?",
        [student_id],
    )?;
    for subject_id in subject_ids {
        conn.execute(
            "INSERT OR IGNORE INTO student_subjects(student_id, subject_id) VALUES(?, ?)",
            (student_id, subject_id),
        )?;
    }
    Ok(())
}
