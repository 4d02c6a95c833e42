//! Read-only aggregations over attendance, offerings and accounts. Every
//! report is recomputed from raw rows on each call.

use crate::accounts::{self, StudentFilter, StudentRow};
use crate::config::SchoolConfig;
use crate::error::{AppError, AppResult};
use crate::model::{self, AttendanceStatus};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub present: i64,
    pub absent: i64,
    pub late: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.present + self.absent + self.late
    }

    fn from_row(r: &rusqlite::Row<'_>, first: usize) -> rusqlite::Result<Self> {
        Ok(StatusCounts {
            present: r.get::<_, Option<i64>>(first)?.unwrap_or(0),
            absent: r.get::<_, Option<i64>>(first + 1)?.unwrap_or(0),
            late: r.get::<_, Option<i64>>(first + 2)?.unwrap_or(0),
        })
    }
}

const COUNT_COLUMNS: &str = "SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END),
        SUM(CASE WHEN a.status = 'absent' THEN 1 ELSE 0 END),
        SUM(CASE WHEN a.status = 'late' THEN 1 ELSE 0 END)";

/// Filters shared by the report methods. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub course_id: Option<String>,
    pub year: Option<String>,
    pub section: Option<String>,
    pub semester: Option<String>,
    pub subject_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub search: Option<String>,
}

impl ReportFilter {
    fn range_or_today(&self) -> (String, String) {
        let today = model::today();
        (
            model::date_key(self.start_date.unwrap_or(today)),
            model::date_key(self.end_date.unwrap_or(today)),
        )
    }

    fn range_keys(&self) -> (Option<String>, Option<String>) {
        (
            self.start_date.map(model::date_key),
            self.end_date.map(model::date_key),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecordRow {
    pub id: String,
    pub student_id: String,
    pub student_no: String,
    pub student_name: String,
    pub subject_code: String,
    pub subject_name: String,
    pub year: String,
    pub section: String,
    pub date: String,
    pub time: String,
    pub status: String,
}

const RECORD_SELECT: &str = "SELECT a.id, st.id, st.student_no, st.first_name || ' ' || st.last_name,
        s.code, s.name, o.year, o.section, a.date, a.time, a.status
     FROM attendance a
     JOIN students st ON st.id = a.student_id
     JOIN subject_offerings o ON o.id = a.offering_id
     JOIN subjects s ON s.id = o.subject_id";

fn record_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecordRow> {
    Ok(AttendanceRecordRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        student_no: r.get(2)?,
        student_name: r.get(3)?,
        subject_code: r.get(4)?,
        subject_name: r.get(5)?,
        year: r.get(6)?,
        section: r.get(7)?,
        date: r.get(8)?,
        time: r.get(9)?,
        status: r.get(10)?,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceSummary {
    pub student_id: String,
    pub student_no: String,
    pub full_name: String,
    pub course_name: Option<String>,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub present_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReport {
    pub summary: Vec<StudentAttendanceSummary>,
    pub records: Vec<AttendanceRecordRow>,
}

const ATTENDANCE_REPORT_WHERE: &str = "WHERE (?1 IS NULL OR st.course_id = ?1)
       AND (?2 IS NULL OR o.year = ?2)
       AND (?3 IS NULL OR s.semester = ?3)
       AND (?4 IS NULL OR s.id = ?4)
       AND (?5 IS NULL OR st.section = ?5)
       AND (?6 IS NULL OR a.date >= ?6)
       AND (?7 IS NULL OR a.date <= ?7)";

/// Admin attendance report: one summary line per student plus the raw rows
/// behind it.
pub fn attendance_report(conn: &Connection, filter: &ReportFilter) -> AppResult<AttendanceReport> {
    let (start, end) = filter.range_keys();
    let params = (
        &filter.course_id,
        &filter.year,
        &filter.semester,
        &filter.subject_id,
        &filter.section,
        &start,
        &end,
    );

    let sql = format!(
        "SELECT st.id, st.student_no, st.first_name, st.middle_name, st.last_name, c.name,
                {}
         FROM attendance a
         JOIN students st ON st.id = a.student_id
         LEFT JOIN courses c ON c.id = st.course_id
         JOIN subject_offerings o ON o.id = a.offering_id
         JOIN subjects s ON s.id = o.subject_id
         {}
         GROUP BY st.id
         ORDER BY st.last_name, st.first_name",
        COUNT_COLUMNS, ATTENDANCE_REPORT_WHERE
    );
    let mut stmt = conn.prepare(&sql)?;
    let summary = stmt
        .query_map(params, |r| {
            let first: String = r.get(2)?;
            let middle: Option<String> = r.get(3)?;
            let last: String = r.get(4)?;
            let counts = StatusCounts::from_row(r, 6)?;
            Ok(StudentAttendanceSummary {
                student_id: r.get(0)?,
                student_no: r.get(1)?,
                full_name: model::full_name_with_middle(&first, middle.as_deref(), &last),
                course_name: r.get(5)?,
                present: counts.present,
                absent: counts.absent,
                late: counts.late,
                total: counts.total(),
                present_percentage: model::percentage(counts.present, counts.total()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let sql = format!(
        "{} {} ORDER BY a.date DESC, a.time DESC, st.last_name",
        RECORD_SELECT, ATTENDANCE_REPORT_WHERE
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params, record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AttendanceReport { summary, records })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildBrief {
    pub student_id: String,
    pub student_no: String,
    pub full_name: String,
    pub course_name: Option<String>,
    pub year: String,
    pub section: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentChildren {
    pub parent_id: String,
    pub parent_name: String,
    pub email: String,
    pub contact_number: Option<String>,
    pub children: Vec<ChildBrief>,
}

/// Parents with at least one child in the filtered class, listing only those
/// children.
pub fn parent_students(conn: &Connection, filter: &ReportFilter) -> AppResult<Vec<ParentChildren>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.first_name || ' ' || p.last_name, u.email, p.contact_number,
                st.id, st.student_no, st.first_name || ' ' || st.last_name, c.name,
                st.year, st.section
         FROM parents p
         JOIN users u ON u.id = p.user_id
         JOIN student_guardians g ON g.parent_id = p.id
         JOIN students st ON st.id = g.student_id
         LEFT JOIN courses c ON c.id = st.course_id
         WHERE (?1 IS NULL OR st.course_id = ?1)
           AND (?2 IS NULL OR st.year = ?2)
           AND (?3 IS NULL OR st.section = ?3)
         ORDER BY p.last_name, p.first_name, p.id, st.last_name, st.first_name",
    )?;
    let rows = stmt
        .query_map((&filter.course_id, &filter.year, &filter.section), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
                ChildBrief {
                    student_id: r.get(4)?,
                    student_no: r.get(5)?,
                    full_name: r.get(6)?,
                    course_name: r.get(7)?,
                    year: r.get(8)?,
                    section: r.get(9)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out: Vec<ParentChildren> = Vec::new();
    for (parent_id, parent_name, email, contact_number, child) in rows {
        match out.last_mut() {
            Some(last) if last.parent_id == parent_id => last.children.push(child),
            _ => out.push(ParentChildren {
                parent_id,
                parent_name,
                email,
                contact_number,
                children: vec![child],
            }),
        }
    }
    Ok(out)
}

pub fn student_details(conn: &Connection, filter: &ReportFilter) -> AppResult<Vec<StudentRow>> {
    accounts::list_students(
        conn,
        &StudentFilter {
            course_id: filter.course_id.clone(),
            year: filter.year.clone(),
            section: filter.section.clone(),
        },
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCount {
    pub section: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSubjectInfo {
    pub offering_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub year: String,
    pub section: String,
    pub school_year: String,
    pub section_counts: Vec<SectionCount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDetails {
    pub teacher_id: String,
    pub teacher_name: String,
    pub subjects: Vec<TeacherSubjectInfo>,
}

/// Per teacher, each offering with the number of enrolled students of the
/// subject's course and the offering's year, broken down by section.
pub fn teacher_details(conn: &Connection, cfg: &SchoolConfig, filter: &ReportFilter) -> AppResult<Vec<TeacherDetails>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.first_name || ' ' || t.last_name,
                o.id, s.id, s.code, s.name, s.course_id, o.year, o.section, o.school_year
         FROM teachers t
         JOIN subject_offerings o ON o.teacher_id = t.id
         JOIN subjects s ON s.id = o.subject_id
         WHERE (?1 IS NULL OR s.course_id = ?1)
           AND (?2 IS NULL OR o.year = ?2)
         ORDER BY t.last_name, t.first_name, t.id, o.school_year, o.year, s.code, o.section",
    )?;
    let rows = stmt
        .query_map((&filter.course_id, &filter.year), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, Option<String>>(6)?,
                r.get::<_, String>(7)?,
                r.get::<_, String>(8)?,
                r.get::<_, String>(9)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut count_stmt = conn.prepare(
        "SELECT COUNT(*) FROM students st
         JOIN student_subjects ss ON ss.student_id = st.id
         WHERE ss.subject_id = ? AND st.course_id = ? AND st.year = ? AND st.section = ?",
    )?;
    let mut out: Vec<TeacherDetails> = Vec::new();
    for (teacher_id, teacher_name, offering_id, subject_id, code, name, course_id, year, section, school_year) in rows {
        let mut section_counts = Vec::with_capacity(cfg.sections.len());
        for sec in &cfg.sections {
            let count = match &course_id {
                Some(course_id) => {
                    count_stmt.query_row((&subject_id, course_id, &year, sec), |r| r.get(0))?
                }
                None => 0,
            };
            section_counts.push(SectionCount {
                section: sec.clone(),
                count,
            });
        }
        let info = TeacherSubjectInfo {
            offering_id,
            subject_code: code,
            subject_name: name,
            year,
            section,
            school_year,
            section_counts,
        };
        match out.last_mut() {
            Some(last) if last.teacher_id == teacher_id => last.subjects.push(info),
            _ => out.push(TeacherDetails {
                teacher_id,
                teacher_name,
                subjects: vec![info],
            }),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverviewRow {
    pub offering_id: String,
    pub subject: String,
    pub course: String,
    pub section_counts: Vec<SectionCount>,
    pub total_students: i64,
    pub semester: String,
    pub year: String,
    pub school_year: String,
}

/// Class sizes per section for each of the teacher's offerings. A section
/// filter zeroes the other sections.
pub fn class_overview(
    conn: &Connection,
    cfg: &SchoolConfig,
    teacher_id: &str,
    filter: &ReportFilter,
) -> AppResult<Vec<ClassOverviewRow>> {
    let mut stmt = conn.prepare(
        "SELECT o.id, s.name, c.name, s.course_id, s.semester, o.year, o.school_year
         FROM subject_offerings o
         JOIN subjects s ON s.id = o.subject_id
         LEFT JOIN courses c ON c.id = s.course_id
         WHERE o.teacher_id = ?1
           AND (?2 IS NULL OR s.semester = ?2)
           AND (?3 IS NULL OR o.year = ?3)
         ORDER BY o.school_year, o.year, s.name, o.section",
    )?;
    let offerings = stmt
        .query_map((teacher_id, &filter.semester, &filter.year), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut count_stmt = conn.prepare(
        "SELECT COUNT(*) FROM students WHERE course_id = ? AND year = ? AND section = ?",
    )?;
    let mut out = Vec::with_capacity(offerings.len());
    for (offering_id, subject, course, course_id, semester, year, school_year) in offerings {
        let mut section_counts = Vec::with_capacity(cfg.sections.len());
        let mut total_students = 0;
        for sec in &cfg.sections {
            let skip = filter.section.as_deref().is_some_and(|f| f != sec);
            let count = match (&course_id, skip) {
                (Some(course_id), false) => {
                    count_stmt.query_row((course_id, &year, sec), |r| r.get(0))?
                }
                _ => 0,
            };
            total_students += count;
            section_counts.push(SectionCount {
                section: sec.clone(),
                count,
            });
        }
        out.push(ClassOverviewRow {
            offering_id,
            subject,
            course: course.unwrap_or_else(|| "N/A".to_string()),
            section_counts,
            total_students,
            semester,
            year,
            school_year,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummaryRow {
    pub offering_id: String,
    pub subject: String,
    pub course: String,
    pub section: String,
    pub total_in_class: i64,
    pub present: i64,
    pub late: i64,
    pub absent: i64,
    pub avg_attendance: f64,
    pub semester: String,
    pub year: String,
    pub school_year: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub start_date: String,
    pub end_date: String,
    pub rows: Vec<AttendanceSummaryRow>,
}

/// Per offering of the teacher, status counts over the date range (today by
/// default) and the share of records that are present or late.
pub fn attendance_summary(conn: &Connection, teacher_id: &str, filter: &ReportFilter) -> AppResult<AttendanceSummary> {
    let (start, end) = filter.range_or_today();
    let mut stmt = conn.prepare(
        "SELECT o.id, s.name, c.name, s.course_id, s.semester, o.year, o.school_year
         FROM subject_offerings o
         JOIN subjects s ON s.id = o.subject_id
         LEFT JOIN courses c ON c.id = s.course_id
         WHERE o.teacher_id = ?1
           AND (?2 IS NULL OR s.semester = ?2)
           AND (?3 IS NULL OR s.id = ?3)
           AND (?4 IS NULL OR o.year = ?4)
         ORDER BY o.school_year, o.year, s.name, o.section",
    )?;
    let offerings = stmt
        .query_map(
            (teacher_id, &filter.semester, &filter.subject_id, &filter.year),
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                ))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut class_stmt = conn.prepare(
        "SELECT COUNT(*) FROM students
         WHERE course_id = ?1 AND year = ?2 AND (?3 IS NULL OR section = ?3)",
    )?;
    let counts_sql = format!(
        "SELECT {} FROM attendance a
         JOIN students st ON st.id = a.student_id
         WHERE a.offering_id = ?1 AND a.date >= ?2 AND a.date <= ?3
           AND (?4 IS NULL OR st.section = ?4)",
        COUNT_COLUMNS
    );
    let mut counts_stmt = conn.prepare(&counts_sql)?;

    let mut rows = Vec::with_capacity(offerings.len());
    for (offering_id, subject, course, course_id, semester, year, school_year) in offerings {
        let total_in_class: i64 = match &course_id {
            Some(course_id) => {
                class_stmt.query_row((course_id, &year, &filter.section), |r| r.get(0))?
            }
            None => 0,
        };
        let counts = counts_stmt.query_row((&offering_id, &start, &end, &filter.section), |r| {
            StatusCounts::from_row(r, 0)
        })?;
        rows.push(AttendanceSummaryRow {
            offering_id,
            subject,
            course: course.unwrap_or_else(|| "N/A".to_string()),
            section: filter.section.clone().unwrap_or_else(|| "All".to_string()),
            total_in_class,
            present: counts.present,
            late: counts.late,
            absent: counts.absent,
            avg_attendance: model::percentage(counts.present + counts.late, counts.total()),
            semester,
            year,
            school_year,
        });
    }
    Ok(AttendanceSummary {
        start_date: start,
        end_date: end,
        rows,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedAttendanceRow {
    pub student: String,
    pub subject: String,
    pub date: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedAttendance {
    pub start_date: String,
    pub end_date: String,
    pub search: String,
    pub rows: Vec<DetailedAttendanceRow>,
}

/// Raw attendance of the teacher's offerings, searchable by first or last
/// name (case-insensitive substring).
pub fn detailed_attendance(conn: &Connection, teacher_id: &str, filter: &ReportFilter) -> AppResult<DetailedAttendance> {
    let (start, end) = filter.range_or_today();
    let search = filter.search.as_deref().map(str::trim).unwrap_or("").to_string();
    let pattern = if search.is_empty() {
        None
    } else {
        Some(format!("%{}%", search.to_lowercase()))
    };
    let mut stmt = conn.prepare(
        "SELECT st.first_name || ' ' || st.last_name, s.name, a.date, a.status
         FROM attendance a
         JOIN students st ON st.id = a.student_id
         JOIN subject_offerings o ON o.id = a.offering_id
         JOIN subjects s ON s.id = o.subject_id
         WHERE o.teacher_id = ?1
           AND (?2 IS NULL OR s.id = ?2)
           AND (?3 IS NULL OR o.year = ?3)
           AND (?4 IS NULL OR st.section = ?4)
           AND a.date >= ?5 AND a.date <= ?6
           AND (?7 IS NULL OR lower(st.first_name) LIKE ?7 OR lower(st.last_name) LIKE ?7)
         ORDER BY a.date, st.last_name, st.first_name, s.name",
    )?;
    let rows = stmt
        .query_map(
            (
                teacher_id,
                &filter.subject_id,
                &filter.year,
                &filter.section,
                &start,
                &end,
                &pattern,
            ),
            |r| {
                let status: String = r.get(3)?;
                Ok(DetailedAttendanceRow {
                    student: r.get(0)?,
                    subject: r.get(1)?,
                    date: r.get(2)?,
                    status: AttendanceStatus::parse(&status)
                        .map(|s| s.label().to_string())
                        .unwrap_or(status),
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DetailedAttendance {
        start_date: start,
        end_date: end,
        search,
        rows,
    })
}

// -------------------------------------------------------------- dashboards

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectOption {
    pub id: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub students: i64,
    pub teachers: i64,
    pub parents: i64,
    pub subjects: i64,
    pub offerings: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
    pub years: Vec<String>,
    pub selected_year: String,
    pub subjects: Vec<SubjectOption>,
    pub selected_subject_id: Option<String>,
    pub attendance: StatusCounts,
    pub recent: Vec<AttendanceRecordRow>,
    pub totals: Totals,
}

const RECENT_LIMIT: i64 = 8;

fn count(conn: &Connection, table: &str) -> AppResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
}

/// Status counts for one year level and subject (the first offered subject
/// when none is chosen), the latest records, and headcounts.
pub fn admin_dashboard(
    conn: &Connection,
    cfg: &SchoolConfig,
    year: Option<&str>,
    subject_id: Option<&str>,
) -> AppResult<AdminDashboard> {
    let selected_year = year
        .map(str::to_string)
        .or_else(|| cfg.year_levels.first().cloned())
        .unwrap_or_default();

    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.id, s.code FROM subject_offerings o
         JOIN subjects s ON s.id = o.subject_id
         WHERE o.year = ?
         ORDER BY s.code",
    )?;
    let subjects = stmt
        .query_map([&selected_year], |r| {
            Ok(SubjectOption {
                id: r.get(0)?,
                code: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let selected_subject_id = subject_id
        .map(str::to_string)
        .or_else(|| subjects.first().map(|s| s.id.clone()));

    let sql = format!(
        "SELECT {} FROM attendance a
         JOIN students st ON st.id = a.student_id
         JOIN subject_offerings o ON o.id = a.offering_id
         WHERE st.year = ?1 AND o.subject_id = ?2",
        COUNT_COLUMNS
    );
    let attendance = match &selected_subject_id {
        Some(subject_id) => conn.query_row(&sql, (&selected_year, subject_id), |r| {
            StatusCounts::from_row(r, 0)
        })?,
        None => StatusCounts::default(),
    };

    let sql = format!("{} ORDER BY a.date DESC, a.time DESC LIMIT ?", RECORD_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let recent = stmt
        .query_map([RECENT_LIMIT], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let totals = Totals {
        students: count(conn, "students")?,
        teachers: count(conn, "teachers")?,
        parents: count(conn, "parents")?,
        subjects: count(conn, "subjects")?,
        offerings: count(conn, "subject_offerings")?,
    };

    Ok(AdminDashboard {
        years: cfg.year_levels.clone(),
        selected_year,
        subjects,
        selected_subject_id,
        attendance,
        recent,
        totals,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDashboard {
    pub total_students: i64,
    pub total_subjects: i64,
    pub total_attendance: i64,
}

pub fn teacher_dashboard(conn: &Connection, teacher_id: &str, today: NaiveDate) -> AppResult<TeacherDashboard> {
    let total_subjects: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subject_offerings WHERE teacher_id = ?",
        [teacher_id],
        |r| r.get(0),
    )?;
    let total_students: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT ss.student_id) FROM student_subjects ss
         WHERE ss.subject_id IN (SELECT subject_id FROM subject_offerings WHERE teacher_id = ?)",
        [teacher_id],
        |r| r.get(0),
    )?;
    let total_attendance: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance a
         JOIN subject_offerings o ON o.id = a.offering_id
         WHERE o.teacher_id = ? AND a.date = ?",
        (teacher_id, model::date_key(today)),
        |r| r.get(0),
    )?;
    Ok(TeacherDashboard {
        total_students,
        total_subjects,
        total_attendance,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAttendance {
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub present_percentage: f64,
}

/// Per-subject counts for one student over every subject they are enrolled
/// in or have records for.
pub fn student_attendance(conn: &Connection, student_id: &str) -> AppResult<Vec<SubjectAttendance>> {
    ensure_student(conn, student_id)?;
    let sql = format!(
        "SELECT s.id, s.code, s.name, {}
         FROM subjects s
         LEFT JOIN subject_offerings o ON o.subject_id = s.id
         LEFT JOIN attendance a ON a.offering_id = o.id AND a.student_id = ?1
         WHERE s.id IN (SELECT subject_id FROM student_subjects WHERE student_id = ?1)
            OR s.id IN (SELECT o2.subject_id FROM attendance a2
                        JOIN subject_offerings o2 ON o2.id = a2.offering_id
                        WHERE a2.student_id = ?1)
         GROUP BY s.id
         ORDER BY s.code",
        COUNT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([student_id], |r| {
            let counts = StatusCounts::from_row(r, 3)?;
            Ok(SubjectAttendance {
                subject_id: r.get(0)?,
                subject_code: r.get(1)?,
                subject_name: r.get(2)?,
                present: counts.present,
                absent: counts.absent,
                late: counts.late,
                total: counts.total(),
                present_percentage: model::percentage(counts.present, counts.total()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn ensure_student(conn: &Connection, student_id: &str) -> AppResult<()> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| r.get(0))
        .optional()?;
    found.map(|_| ()).ok_or(AppError::NotFound("student"))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDetailRow {
    pub date: String,
    pub time: String,
    pub status: String,
    pub teacher_name: Option<String>,
    pub school_year: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDetail {
    pub subject_code: String,
    pub subject_name: String,
    pub counts: StatusCounts,
    pub present_percentage: f64,
    pub records: Vec<AttendanceDetailRow>,
}

/// Every record of one student in one subject, newest first.
pub fn attendance_detail(conn: &Connection, student_id: &str, subject_id: &str) -> AppResult<AttendanceDetail> {
    ensure_student(conn, student_id)?;
    let (subject_code, subject_name): (String, String) = conn
        .query_row(
            "SELECT code, name FROM subjects WHERE id = ?",
            [subject_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?
        .ok_or(AppError::NotFound("subject"))?;

    let mut stmt = conn.prepare(
        "SELECT a.date, a.time, a.status,
                CASE WHEN t.id IS NULL THEN NULL ELSE t.first_name || ' ' || t.last_name END,
                o.school_year
         FROM attendance a
         JOIN subject_offerings o ON o.id = a.offering_id
         LEFT JOIN teachers t ON t.id = o.teacher_id
         WHERE a.student_id = ? AND o.subject_id = ?
         ORDER BY a.date DESC, a.time DESC",
    )?;
    let records = stmt
        .query_map((student_id, subject_id), |r| {
            Ok(AttendanceDetailRow {
                date: r.get(0)?,
                time: r.get(1)?,
                status: r.get(2)?,
                teacher_name: r.get(3)?,
                school_year: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut counts = StatusCounts::default();
    for rec in &records {
        match AttendanceStatus::parse(&rec.status) {
            Some(AttendanceStatus::Present) => counts.present += 1,
            Some(AttendanceStatus::Absent) => counts.absent += 1,
            Some(AttendanceStatus::Late) => counts.late += 1,
            None => {}
        }
    }
    Ok(AttendanceDetail {
        subject_code,
        subject_name,
        present_percentage: model::percentage(counts.present, counts.total()),
        counts,
        records,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDashboard {
    pub student: StudentRow,
    pub subjects: Vec<SubjectAttendance>,
    pub overall: StatusCounts,
    pub present_percentage: f64,
    pub today: Vec<AttendanceRecordRow>,
}

pub fn student_dashboard(conn: &Connection, student_id: &str, today: NaiveDate) -> AppResult<StudentDashboard> {
    let student = accounts::get_student(conn, student_id)?;
    let subjects = student_attendance(conn, student_id)?;
    let mut overall = StatusCounts::default();
    for s in &subjects {
        overall.present += s.present;
        overall.absent += s.absent;
        overall.late += s.late;
    }
    let sql = format!(
        "{} WHERE a.student_id = ? AND a.date = ? ORDER BY a.time",
        RECORD_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let today = stmt
        .query_map((student_id, model::date_key(today)), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StudentDashboard {
        student,
        subjects,
        present_percentage: model::percentage(overall.present, overall.total()),
        overall,
        today,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildOverview {
    pub student_id: String,
    pub full_name: String,
    pub course_name: Option<String>,
    pub year: String,
    pub section: String,
    pub counts: StatusCounts,
    pub present_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentDashboard {
    pub parent_name: String,
    pub children: Vec<ChildOverview>,
}

pub fn parent_dashboard(conn: &Connection, parent_id: &str) -> AppResult<ParentDashboard> {
    let parent_name: String = conn
        .query_row(
            "SELECT first_name || ' ' || last_name FROM parents WHERE id = ?",
            [parent_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or(AppError::NotFound("parent"))?;
    let sql = format!(
        "SELECT st.id, st.first_name || ' ' || st.last_name, c.name, st.year, st.section, {}
         FROM student_guardians g
         JOIN students st ON st.id = g.student_id
         LEFT JOIN courses c ON c.id = st.course_id
         LEFT JOIN attendance a ON a.student_id = st.id
         WHERE g.parent_id = ?
         GROUP BY st.id
         ORDER BY st.last_name, st.first_name",
        COUNT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let children = stmt
        .query_map([parent_id], |r| {
            let counts = StatusCounts::from_row(r, 5)?;
            Ok(ChildOverview {
                student_id: r.get(0)?,
                full_name: r.get(1)?,
                course_name: r.get(2)?,
                year: r.get(3)?,
                section: r.get(4)?,
                present_percentage: model::percentage(counts.present, counts.total()),
                counts,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParentDashboard {
        parent_name,
        children,
    })
}

/// Parents only see their own children.
pub fn ensure_guardian(conn: &Connection, parent_id: &str, student_id: &str) -> AppResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM student_guardians WHERE parent_id = ? AND student_id = ?",
            (parent_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    found.map(|_| ()).ok_or(AppError::NotFound("student"))
}
