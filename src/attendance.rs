use crate::config::SchoolConfig;
use crate::enrollment;
use crate::error::{AppError, AppResult};
use crate::model::{self, AttendanceStatus};
use crate::offerings::{self, OfferingRow};
use chrono::{NaiveDate, NaiveTime};
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Create-or-overwrite keyed by (student, offering, date).
pub fn upsert(
    conn: &Connection,
    student_id: &str,
    offering_id: &str,
    date: NaiveDate,
    time: NaiveTime,
    status: AttendanceStatus,
) -> AppResult<Upsert> {
    let date = model::date_key(date);
    let existed: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM attendance WHERE student_id = ? AND offering_id = ? AND date = ?",
            (student_id, offering_id, &date),
            |r| r.get(0),
        )
        .optional()?;
    conn.execute(
        "INSERT INTO attendance(id, student_id, offering_id, date, time, status)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, offering_id, date) DO UPDATE SET
           status = excluded.status,
           time = excluded.time",
        (
            Uuid::new_v4().to_string(),
            student_id,
            offering_id,
            &date,
            model::time_key(time),
            status.as_str(),
        ),
    )?;
    Ok(if existed.is_some() {
        Upsert::Updated
    } else {
        Upsert::Created
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetStudent {
    pub id: String,
    pub student_no: String,
    pub display_name: String,
    pub status: Option<AttendanceStatus>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub offering: OfferingRow,
    pub date: String,
    pub time: String,
    pub year: String,
    pub section: String,
    pub students: Vec<SheetStudent>,
}

/// Loads an offering, enforcing that it belongs to `teacher_id` when one is
/// given.
pub fn offering_for(conn: &Connection, offering_id: &str, teacher_id: Option<&str>) -> AppResult<OfferingRow> {
    let offering = offerings::get_offering(conn, offering_id)?;
    if let Some(teacher_id) = teacher_id {
        if offering.teacher_id.as_deref() != Some(teacher_id) {
            return Err(AppError::NotFound("offering"));
        }
    }
    Ok(offering)
}

/// Students of the offering's class with whatever is recorded for `date`.
/// `year`/`section` override the offering's own class when given.
pub fn sheet(
    conn: &Connection,
    offering: OfferingRow,
    date: NaiveDate,
    time: NaiveTime,
    year: Option<&str>,
    section: Option<&str>,
) -> AppResult<Sheet> {
    let year = year.unwrap_or(&offering.year).to_string();
    let section = section.unwrap_or(&offering.section).to_string();
    let date_key = model::date_key(date);

    let student_ids = enrollment::matching_students(conn, offering.course_id.as_deref(), &year, &section)?;

    let mut recorded: HashMap<String, (String, String)> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT student_id, status, time FROM attendance WHERE offering_id = ? AND date = ?",
        )?;
        let rows = stmt
            .query_map((&offering.id, &date_key), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (student_id, status, time) in rows {
            recorded.insert(student_id, (status, time));
        }
    }

    let mut stmt = conn.prepare(
        "SELECT student_no, first_name, last_name FROM students WHERE id = ?",
    )?;
    let mut students = Vec::with_capacity(student_ids.len());
    for id in student_ids {
        let (student_no, first, last) = stmt.query_row([&id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?;
        let rec = recorded.get(&id);
        students.push(SheetStudent {
            display_name: format!("{}, {}", last, first),
            student_no,
            status: rec.and_then(|(s, _)| AttendanceStatus::parse(s)),
            time: rec.map(|(_, t)| t.clone()),
            id,
        });
    }

    Ok(Sheet {
        offering,
        date: date_key,
        time: model::time_key(time),
        year,
        section,
        students,
    })
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSummary {
    pub created: usize,
    pub updated: usize,
    pub ignored: usize,
}

/// Writes one row per student that has a submitted status. Students outside
/// the class the sheet listed are ignored; students without a status are
/// left untouched. `year`/`section` override the offering's class as in
/// [`sheet`].
pub fn mark(
    conn: &Connection,
    offering: &OfferingRow,
    date: NaiveDate,
    time: NaiveTime,
    year: Option<&str>,
    section: Option<&str>,
    statuses: &[(String, Option<AttendanceStatus>)],
) -> AppResult<MarkSummary> {
    let class = enrollment::matching_students(
        conn,
        offering.course_id.as_deref(),
        year.unwrap_or(&offering.year),
        section.unwrap_or(&offering.section),
    )?;

    let tx = conn.unchecked_transaction()?;
    let mut summary = MarkSummary::default();
    for (student_id, status) in statuses {
        let Some(status) = status else {
            continue;
        };
        if !class.iter().any(|s| s == student_id) {
            summary.ignored += 1;
            continue;
        }
        match upsert(&tx, student_id, &offering.id, date, time, *status)? {
            Upsert::Created => summary.created += 1,
            Upsert::Updated => summary.updated += 1,
        }
    }
    tx.commit()?;
    tracing::info!(
        offering = %offering.id,
        date = %date,
        created = summary.created,
        updated = summary.updated,
        ignored = summary.ignored,
        "attendance recorded"
    );
    Ok(summary)
}

/// What the backfill writes for each generated row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMode {
    Fixed(AttendanceStatus),
    Random,
}

impl StatusMode {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("random") {
            return Some(StatusMode::Random);
        }
        AttendanceStatus::parse(raw).map(StatusMode::Fixed)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulateSummary {
    pub students: i64,
    pub offerings: i64,
    pub days: i64,
    pub created: usize,
    pub updated: usize,
}

/// Backfills one row per (offering, matching student, day in range).
pub fn populate<R: Rng>(
    conn: &Connection,
    cfg: &SchoolConfig,
    start: NaiveDate,
    end: NaiveDate,
    mode: StatusMode,
    rng: &mut R,
) -> AppResult<PopulateSummary> {
    if start > end {
        return Err(AppError::invalid(
            "startDate",
            "Start date must be before or equal to end date.",
        ));
    }
    let students: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    if students == 0 {
        return Err(AppError::invalid("students", "No students found in the database."));
    }
    let offerings = {
        let mut stmt = conn.prepare(
            "SELECT o.id, s.course_id, o.year, o.section
             FROM subject_offerings o
             JOIN subjects s ON s.id = o.subject_id
             ORDER BY o.id",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    if offerings.is_empty() {
        return Err(AppError::invalid(
            "offerings",
            "No subject offerings found in the database.",
        ));
    }

    let window = &cfg.attendance;
    let mut summary = PopulateSummary {
        students,
        offerings: offerings.len() as i64,
        days: (end - start).num_days() + 1,
        ..PopulateSummary::default()
    };

    let tx = conn.unchecked_transaction()?;
    let mut day = start;
    while day <= end {
        for (offering_id, course_id, year, section) in &offerings {
            for student_id in enrollment::matching_students(&tx, course_id.as_deref(), year, section)? {
                let status = match mode {
                    StatusMode::Fixed(s) => s,
                    StatusMode::Random => *AttendanceStatus::ALL
                        .choose(rng)
                        .unwrap_or(&AttendanceStatus::Present),
                };
                let hour = rng.gen_range(window.window_start_hour..=window.window_end_hour);
                let minute = rng.gen_range(0..=59);
                let time = NaiveTime::from_hms_opt(hour, minute, 0)
                    .ok_or_else(|| AppError::invalid("time", "generated time out of range"))?;
                match upsert(&tx, &student_id, offering_id, day, time, status)? {
                    Upsert::Created => summary.created += 1,
                    Upsert::Updated => summary.updated += 1,
                }
            }
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    tx.commit()?;
    tracing::info!(
        start = %start,
        end = %end,
        created = summary.created,
        updated = summary.updated,
        "attendance populated"
    );
    Ok(summary)
}
