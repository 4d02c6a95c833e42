//! Subject offerings: who teaches which subject to which class in which
//! school year, and the bookkeeping that keeps enrollment in step.

use crate::config::SchoolConfig;
use crate::enrollment::{self, OfferingKey};
use crate::error::{AppError, AppResult, OfferingConflict};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferingRow {
    pub id: String,
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub semester: String,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub teacher_id: Option<String>,
    pub teacher_name: Option<String>,
    pub year: String,
    pub section: String,
    pub school_year: String,
}

const OFFERING_SELECT: &str = "SELECT o.id, o.subject_id, s.code, s.name, s.semester,
        s.course_id, c.name, o.teacher_id,
        CASE WHEN t.id IS NULL THEN NULL ELSE t.first_name || ' ' || t.last_name END,
        o.year, o.section, o.school_year
     FROM subject_offerings o
     JOIN subjects s ON s.id = o.subject_id
     LEFT JOIN courses c ON c.id = s.course_id
     LEFT JOIN teachers t ON t.id = o.teacher_id";

fn offering_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<OfferingRow> {
    Ok(OfferingRow {
        id: r.get(0)?,
        subject_id: r.get(1)?,
        subject_code: r.get(2)?,
        subject_name: r.get(3)?,
        semester: r.get(4)?,
        course_id: r.get(5)?,
        course_name: r.get(6)?,
        teacher_id: r.get(7)?,
        teacher_name: r.get(8)?,
        year: r.get(9)?,
        section: r.get(10)?,
        school_year: r.get(11)?,
    })
}

pub fn list_offerings(conn: &Connection) -> AppResult<Vec<OfferingRow>> {
    let sql = format!(
        "{} ORDER BY t.id IS NULL, t.last_name, t.first_name, o.year, o.section, o.school_year, s.code",
        OFFERING_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], offering_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn offerings_for_teacher(conn: &Connection, teacher_id: &str) -> AppResult<Vec<OfferingRow>> {
    let sql = format!(
        "{} WHERE o.teacher_id = ? ORDER BY o.school_year, o.year, o.section, s.code",
        OFFERING_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([teacher_id], offering_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_offering(conn: &Connection, offering_id: &str) -> AppResult<OfferingRow> {
    let sql = format!("{} WHERE o.id = ?", OFFERING_SELECT);
    conn.query_row(&sql, [offering_id], offering_from_row)
        .optional()?
        .ok_or(AppError::NotFound("offering"))
}

pub fn teacher_name(conn: &Connection, teacher_id: &str) -> AppResult<String> {
    conn.query_row(
        "SELECT first_name || ' ' || last_name FROM teachers WHERE id = ?",
        [teacher_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or(AppError::NotFound("teacher"))
}

#[derive(Debug, Clone)]
struct SubjectBrief {
    id: String,
    code: String,
    course_id: Option<String>,
    year_level: String,
}

fn subject_brief(conn: &Connection, subject_id: &str) -> AppResult<Option<SubjectBrief>> {
    let s = conn
        .query_row(
            "SELECT id, code, course_id, year_level FROM subjects WHERE id = ?",
            [subject_id],
            |r| {
                Ok(SubjectBrief {
                    id: r.get(0)?,
                    code: r.get(1)?,
                    course_id: r.get(2)?,
                    year_level: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(s)
}

/// One ticked (subject, section) box on the assignment grid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Selection {
    pub subject_id: String,
    pub section: String,
}

/// (teacher, year, school year) that a submission is about.
#[derive(Debug, Clone)]
pub struct AssignmentTarget {
    pub teacher_id: String,
    pub year: String,
    pub school_year: String,
}

fn check_target(conn: &Connection, cfg: &SchoolConfig, target: &AssignmentTarget) -> AppResult<String> {
    if target.teacher_id.trim().is_empty() {
        return Err(AppError::invalid(
            "teacherId",
            "Please select a valid teacher from the list.",
        ));
    }
    let name = teacher_name(conn, &target.teacher_id)?;
    if target.year.trim().is_empty() || target.school_year.trim().is_empty() {
        return Err(AppError::invalid(
            "schoolYear",
            "Year level and school year are required.",
        ));
    }
    if !cfg.is_year_level(&target.year) {
        return Err(AppError::invalid(
            "year",
            format!("unknown year level: {}", target.year),
        ));
    }
    Ok(name)
}

/// Validates every selection and returns them with subject codes for labels.
fn check_selections(
    conn: &Connection,
    cfg: &SchoolConfig,
    year: &str,
    selections: &[Selection],
) -> AppResult<(BTreeSet<Selection>, HashMap<String, SubjectBrief>)> {
    let mut wanted = BTreeSet::new();
    let mut subjects = HashMap::new();
    for sel in selections {
        if !cfg.is_section(&sel.section) {
            return Err(AppError::invalid(
                "selections",
                format!("unknown section: {}", sel.section),
            ));
        }
        if !subjects.contains_key(&sel.subject_id) {
            let brief = subject_brief(conn, &sel.subject_id)?.ok_or(AppError::NotFound("subject"))?;
            if brief.year_level != year {
                return Err(AppError::invalid(
                    "selections",
                    format!(
                        "subject {} belongs to year level {}, not {}",
                        brief.code, brief.year_level, year
                    ),
                ));
            }
            subjects.insert(sel.subject_id.clone(), brief);
        }
        wanted.insert(sel.clone());
    }
    Ok((wanted, subjects))
}

fn selection_label(code: &str, section: &str) -> String {
    format!("{} - Section {}", code, section.to_uppercase())
}

fn find_offering_by_key(
    conn: &Connection,
    subject_id: &str,
    year: &str,
    section: &str,
    school_year: &str,
) -> AppResult<Option<(String, Option<String>)>> {
    let found = conn
        .query_row(
            "SELECT id, teacher_id FROM subject_offerings
             WHERE subject_id = ? AND year = ? AND section = ? AND school_year = ?",
            (subject_id, year, section, school_year),
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?)),
        )
        .optional()?;
    Ok(found)
}

fn insert_offering(
    conn: &Connection,
    subject: &SubjectBrief,
    teacher_id: Option<&str>,
    year: &str,
    section: &str,
    school_year: &str,
) -> AppResult<OfferingKey> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subject_offerings(id, subject_id, teacher_id, year, section, school_year)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &subject.id, teacher_id, year, section, school_year),
    )?;
    Ok(OfferingKey {
        offering_id: id,
        subject_id: subject.id.clone(),
        course_id: subject.course_id.clone(),
        year: year.to_string(),
        section: section.to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignOutcome {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
    pub enrolled: usize,
    pub messages: Vec<String>,
}

/// Additive assignment: free keys become offerings for the teacher, keys
/// that already have an offering are skipped and reported.
pub fn assign(
    conn: &Connection,
    cfg: &SchoolConfig,
    target: &AssignmentTarget,
    selections: &[Selection],
) -> AppResult<AssignOutcome> {
    let name = check_target(conn, cfg, target)?;
    let (wanted, subjects) = check_selections(conn, cfg, &target.year, selections)?;

    let tx = conn.unchecked_transaction()?;
    let mut created = Vec::new();
    let mut skipped = Vec::new();
    let mut enrolled = 0;
    for sel in &wanted {
        let subject = &subjects[&sel.subject_id];
        let label = selection_label(&subject.code, &sel.section);
        if let Some((_, owner)) = find_offering_by_key(
            &tx,
            &sel.subject_id,
            &target.year,
            &sel.section,
            &target.school_year,
        )? {
            match owner {
                Some(owner_id) => {
                    let owner_name = teacher_name(&tx, &owner_id)?;
                    skipped.push(format!("{} (already assigned to {})", label, owner_name));
                }
                None => skipped.push(format!("{} (already assigned)", label)),
            }
            continue;
        }
        let key = insert_offering(
            &tx,
            subject,
            Some(&target.teacher_id),
            &target.year,
            &sel.section,
            &target.school_year,
        )?;
        enrolled += enrollment::enroll_for_offering(&tx, &key)?;
        created.push(label);
    }
    tx.commit()?;

    let mut messages = Vec::new();
    if !created.is_empty() {
        messages.push(format!(
            "Teacher {} assigned to: {} (Year {}, SY {}).",
            name,
            created.join(", "),
            target.year,
            target.school_year
        ));
    }
    if !skipped.is_empty() {
        messages.push(format!(
            "The following subjects were already assigned for this teacher, year, section, \
             and school year and were skipped: {}.",
            skipped.join(", ")
        ));
    }
    tracing::info!(
        teacher = %target.teacher_id,
        year = %target.year,
        school_year = %target.school_year,
        created = created.len(),
        skipped = skipped.len(),
        enrolled,
        "offerings assigned"
    );
    Ok(AssignOutcome {
        created,
        skipped,
        enrolled,
        messages,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub created: Vec<String>,
    pub removed: Vec<String>,
    pub kept: usize,
    pub enrolled: usize,
    pub unenrolled: usize,
    pub message: String,
}

fn find_conflicts(
    conn: &Connection,
    target: &AssignmentTarget,
    wanted: &BTreeSet<Selection>,
    subjects: &HashMap<String, SubjectBrief>,
) -> AppResult<Vec<OfferingConflict>> {
    let mut conflicts = Vec::new();
    for sel in wanted {
        let Some((_, Some(owner_id))) = find_offering_by_key(
            conn,
            &sel.subject_id,
            &target.year,
            &sel.section,
            &target.school_year,
        )?
        else {
            continue;
        };
        if owner_id == target.teacher_id {
            continue;
        }
        conflicts.push(OfferingConflict {
            subject_code: subjects[&sel.subject_id].code.clone(),
            year: target.year.clone(),
            section: sel.section.clone(),
            school_year: target.school_year.clone(),
            teacher_name: teacher_name(conn, &owner_id)?,
        });
    }
    Ok(conflicts)
}

fn current_offerings(conn: &Connection, target: &AssignmentTarget) -> AppResult<Vec<(OfferingKey, String)>> {
    let mut stmt = conn.prepare(
        "SELECT o.id, o.subject_id, s.course_id, o.year, o.section, s.code
         FROM subject_offerings o
         JOIN subjects s ON s.id = o.subject_id
         WHERE o.teacher_id = ? AND o.year = ? AND o.school_year = ?",
    )?;
    let rows = stmt
        .query_map(
            (&target.teacher_id, &target.year, &target.school_year),
            |r| {
                Ok((
                    OfferingKey {
                        offering_id: r.get(0)?,
                        subject_id: r.get(1)?,
                        course_id: r.get(2)?,
                        year: r.get(3)?,
                        section: r.get(4)?,
                    },
                    r.get::<_, String>(5)?,
                ))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Makes the teacher's offerings for (year, school year) equal `selections`.
///
/// Keys owned by another teacher abort the whole submission before anything
/// is written, including the key of the offering being edited. `editing`
/// names the offering whose edit page produced the submission; it is moved
/// to the target first so it takes part in the diff.
pub fn sync(
    conn: &Connection,
    cfg: &SchoolConfig,
    target: &AssignmentTarget,
    selections: &[Selection],
    editing: Option<&str>,
) -> AppResult<SyncOutcome> {
    let name = check_target(conn, cfg, target)?;
    let (wanted, subjects) = check_selections(conn, cfg, &target.year, selections)?;

    let tx = conn.unchecked_transaction()?;
    let base = match editing {
        Some(id) => Some(enrollment::offering_key(&tx, id)?.ok_or(AppError::NotFound("offering"))?),
        None => None,
    };

    let conflicts = find_conflicts(&tx, target, &wanted, &subjects)?;
    if !conflicts.is_empty() {
        tracing::info!(
            teacher = %target.teacher_id,
            conflicts = conflicts.len(),
            "offering sync rejected"
        );
        return Err(AppError::Conflict(conflicts));
    }

    let mut enrolled = 0;
    let mut unenrolled = 0;

    if let Some(base) = base {
        let occupant = find_offering_by_key(
            &tx,
            &base.subject_id,
            &target.year,
            &base.section,
            &target.school_year,
        )?
        .filter(|(id, _)| *id != base.offering_id);
        if occupant.is_some() {
            // The destination key already has an offering; it stands in for the edited one.
            unenrolled += enrollment::unenroll_for_offering(&tx, &base)?;
            tx.execute("DELETE FROM subject_offerings WHERE id = ?", [&base.offering_id])?;
        } else {
            let moves_class = base.year != target.year;
            if moves_class {
                unenrolled += enrollment::unenroll_for_offering(&tx, &base)?;
            }
            tx.execute(
                "UPDATE subject_offerings SET teacher_id = ?, year = ?, school_year = ? WHERE id = ?",
                (&target.teacher_id, &target.year, &target.school_year, &base.offering_id),
            )?;
            if moves_class {
                let moved = OfferingKey {
                    year: target.year.clone(),
                    ..base
                };
                enrolled += enrollment::enroll_for_offering(&tx, &moved)?;
            }
        }
    }

    let mut removed = Vec::new();
    let mut kept = 0;
    let mut have = BTreeSet::new();
    for (key, code) in current_offerings(&tx, target)? {
        let sel = Selection {
            subject_id: key.subject_id.clone(),
            section: key.section.clone(),
        };
        if wanted.contains(&sel) {
            kept += 1;
            have.insert(sel);
            continue;
        }
        unenrolled += enrollment::unenroll_for_offering(&tx, &key)?;
        tx.execute("DELETE FROM subject_offerings WHERE id = ?", [&key.offering_id])?;
        removed.push(selection_label(&code, &key.section));
    }

    let mut created = Vec::new();
    for sel in wanted.difference(&have) {
        let subject = &subjects[&sel.subject_id];
        let key = match find_offering_by_key(
            &tx,
            &sel.subject_id,
            &target.year,
            &sel.section,
            &target.school_year,
        )? {
            // Unassigned offering for this key: claim it.
            Some((offering_id, None)) => {
                tx.execute(
                    "UPDATE subject_offerings SET teacher_id = ? WHERE id = ?",
                    (&target.teacher_id, &offering_id),
                )?;
                OfferingKey {
                    offering_id,
                    subject_id: subject.id.clone(),
                    course_id: subject.course_id.clone(),
                    year: target.year.clone(),
                    section: sel.section.clone(),
                }
            }
            _ => insert_offering(
                &tx,
                subject,
                Some(&target.teacher_id),
                &target.year,
                &sel.section,
                &target.school_year,
            )?,
        };
        enrolled += enrollment::enroll_for_offering(&tx, &key)?;
        created.push(selection_label(&subject.code, &sel.section));
    }
    tx.commit()?;

    let message = if wanted.is_empty() {
        format!(
            "All subject assignments for {} for Year {}, SY {} have been cleared.",
            name, target.year, target.school_year
        )
    } else {
        format!(
            "Assignments updated for {} for Year {}, SY {}.",
            name, target.year, target.school_year
        )
    };
    tracing::info!(
        teacher = %target.teacher_id,
        year = %target.year,
        school_year = %target.school_year,
        created = created.len(),
        removed = removed.len(),
        kept,
        "offerings synced"
    );
    Ok(SyncOutcome {
        created,
        removed,
        kept,
        enrolled,
        unenrolled,
        message,
    })
}

/// Deletes an offering after unlinking the subject from its students.
pub fn delete_offering(conn: &Connection, offering_id: &str) -> AppResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let key = enrollment::offering_key(&tx, offering_id)?.ok_or(AppError::NotFound("offering"))?;
    let unenrolled = enrollment::unenroll_for_offering(&tx, &key)?;
    tx.execute("DELETE FROM subject_offerings WHERE id = ?", [offering_id])?;
    tx.commit()?;
    tracing::info!(offering = %offering_id, unenrolled, "offering deleted");
    Ok(unenrolled)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub section: String,
    pub label: String,
    pub is_taken: bool,
    pub is_selected: bool,
    pub assigned_teacher: Option<String>,
    pub school_year: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRow {
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub course_name: Option<String>,
    pub sections: Vec<GridCell>,
}

/// Subject × section grid for one year level. With `teacher_id`, cells the
/// teacher already owns are selected and only other owners count as taken.
pub fn assignment_grid(
    conn: &Connection,
    cfg: &SchoolConfig,
    year: &str,
    school_year: Option<&str>,
    teacher_id: Option<&str>,
) -> AppResult<Vec<GridRow>> {
    if !cfg.is_year_level(year) {
        return Err(AppError::invalid("year", format!("unknown year level: {}", year)));
    }
    let mut stmt = conn.prepare(
        "SELECT s.id, s.code, s.name, c.name
         FROM subjects s
         LEFT JOIN courses c ON c.id = s.course_id
         WHERE s.year_level = ?
         ORDER BY c.name, s.code",
    )?;
    let subjects = stmt
        .query_map([year], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_key: HashMap<(String, String), OfferingRow> = HashMap::new();
    let sql = format!(
        "{} WHERE o.year = ?1 AND (?2 IS NULL OR o.school_year = ?2) ORDER BY o.school_year",
        OFFERING_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let offerings = stmt
        .query_map((year, school_year), offering_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for o in offerings {
        by_key.insert((o.subject_id.clone(), o.section.clone()), o);
    }

    let rows = subjects
        .into_iter()
        .map(|(subject_id, code, name, course_name)| {
            let sections = cfg
                .sections
                .iter()
                .map(|section| {
                    let offering = by_key.get(&(subject_id.clone(), section.clone()));
                    let owned = offering
                        .map(|o| o.teacher_id.is_some() && o.teacher_id.as_deref() == teacher_id)
                        .unwrap_or(false);
                    GridCell {
                        section: section.clone(),
                        label: format!("Section {}", section.to_uppercase()),
                        is_taken: offering.is_some() && !owned,
                        is_selected: owned,
                        assigned_teacher: offering.and_then(|o| o.teacher_name.clone()),
                        school_year: offering.map(|o| o.school_year.clone()).unwrap_or_default(),
                    }
                })
                .collect();
            GridRow {
                subject_id,
                subject_code: code,
                subject_name: name,
                course_name,
                sections,
            }
        })
        .collect();
    Ok(rows)
}

fn teacher_ids_round_robin(conn: &Connection) -> AppResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name || ' ' || last_name FROM teachers ORDER BY last_name, first_name, id",
    )?;
    let teachers = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    if teachers.is_empty() {
        return Err(AppError::invalid(
            "teachers",
            "No teachers found in the database.",
        ));
    }
    Ok(teachers)
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoAssignSummary {
    pub newly_assigned: usize,
    pub updated: usize,
    pub lines: Vec<String>,
}

/// Spreads teachers over offerings round-robin.
pub fn auto_assign(
    conn: &Connection,
    school_year: Option<&str>,
    unassigned_only: bool,
) -> AppResult<AutoAssignSummary> {
    let teachers = teacher_ids_round_robin(conn)?;
    let tx = conn.unchecked_transaction()?;
    let sql = format!(
        "{} WHERE (?1 IS NULL OR o.school_year = ?1) AND (?2 = 0 OR o.teacher_id IS NULL)
         ORDER BY o.school_year, o.year, o.section, s.code",
        OFFERING_SELECT
    );
    let offerings = {
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt
            .query_map((school_year, unassigned_only), offering_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    if offerings.is_empty() {
        return Err(AppError::invalid(
            "offerings",
            "No subject offerings found to assign.",
        ));
    }

    let mut summary = AutoAssignSummary::default();
    for (i, offering) in offerings.iter().enumerate() {
        let (teacher_id, name) = &teachers[i % teachers.len()];
        tx.execute(
            "UPDATE subject_offerings SET teacher_id = ? WHERE id = ?",
            (teacher_id, &offering.id),
        )?;
        let class = format!("{}{}", offering.year, offering.section.to_uppercase());
        match &offering.teacher_name {
            Some(old) => {
                summary.updated += 1;
                summary.lines.push(format!(
                    "Updated: {} - {} (was: {}, now: {})",
                    offering.subject_code, class, old, name
                ));
            }
            None => {
                summary.newly_assigned += 1;
                summary.lines.push(format!(
                    "Assigned: {} - {} to {}",
                    offering.subject_code, class, name
                ));
            }
        }
    }
    tx.commit()?;
    tracing::info!(
        newly_assigned = summary.newly_assigned,
        updated = summary.updated,
        "teachers distributed over offerings"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSummary {
    pub created: usize,
    pub assigned_existing: usize,
    pub skipped: usize,
    pub subjects_without_course: usize,
    pub enrolled: usize,
    pub lines: Vec<String>,
}

/// Creates an offering of every subject for each class that exists among the
/// students (or for every section when the subject has no students yet),
/// handing out teachers round-robin and enrolling the classes.
pub fn generate(conn: &Connection, cfg: &SchoolConfig, school_year: &str) -> AppResult<GenerateSummary> {
    if school_year.trim().is_empty() {
        return Err(AppError::invalid("schoolYear", "school year is required"));
    }
    let teachers = teacher_ids_round_robin(conn)?;
    let tx = conn.unchecked_transaction()?;

    let subjects = {
        let mut stmt = tx.prepare(
            "SELECT id, code, course_id, year_level FROM subjects ORDER BY code, year_level",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(SubjectBrief {
                    id: r.get(0)?,
                    code: r.get(1)?,
                    course_id: r.get(2)?,
                    year_level: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    if subjects.is_empty() {
        return Err(AppError::invalid("subjects", "No subjects found in the database."));
    }

    let classes: BTreeSet<(String, String, String)> = {
        let mut stmt = tx.prepare(
            "SELECT DISTINCT course_id, year, section FROM students WHERE course_id IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<BTreeSet<_>, _>>()?;
        rows
    };

    let mut summary = GenerateSummary::default();
    let mut next_teacher = 0usize;
    for subject in &subjects {
        let Some(course_id) = subject.course_id.as_deref() else {
            summary.subjects_without_course += 1;
            summary
                .lines
                .push(format!("Skipping {} - no course assigned.", subject.code));
            continue;
        };
        let mut sections: Vec<String> = classes
            .iter()
            .filter(|(c, y, _)| c == course_id && *y == subject.year_level)
            .map(|(_, _, s)| s.clone())
            .collect();
        if sections.is_empty() {
            sections = cfg.sections.clone();
        }

        for section in sections {
            let class = format!("{}{}", subject.year_level, section.to_uppercase());
            match find_offering_by_key(&tx, &subject.id, &subject.year_level, &section, school_year)? {
                Some((_, Some(owner))) => {
                    summary.skipped += 1;
                    summary.lines.push(format!(
                        "Skipped: {} - {} (already assigned to {})",
                        subject.code,
                        class,
                        teacher_name(&tx, &owner)?
                    ));
                }
                Some((offering_id, None)) => {
                    let (teacher_id, name) = &teachers[next_teacher % teachers.len()];
                    next_teacher += 1;
                    tx.execute(
                        "UPDATE subject_offerings SET teacher_id = ? WHERE id = ?",
                        (teacher_id, &offering_id),
                    )?;
                    summary.assigned_existing += 1;
                    summary.lines.push(format!(
                        "Assigned teacher to existing: {} - {} to {}",
                        subject.code, class, name
                    ));
                }
                None => {
                    let (teacher_id, name) = &teachers[next_teacher % teachers.len()];
                    next_teacher += 1;
                    let key = insert_offering(
                        &tx,
                        subject,
                        Some(teacher_id),
                        &subject.year_level,
                        &section,
                        school_year,
                    )?;
                    let enrolled = enrollment::enroll_for_offering(&tx, &key)?;
                    summary.created += 1;
                    summary.enrolled += enrolled;
                    summary
                        .lines
                        .push(format!("Created: {} - {} to {}", subject.code, class, name));
                }
            }
        }
    }
    tx.commit()?;
    tracing::info!(
        school_year,
        created = summary.created,
        assigned_existing = summary.assigned_existing,
        skipped = summary.skipped,
        "offerings generated"
    );
    Ok(summary)
}
