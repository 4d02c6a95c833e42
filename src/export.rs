use crate::accounts;
use crate::workbook::{Sheet, Workbook};
use anyhow::Context;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const DEFAULT_EXPORT_FILE: &str = "school_accounts.xlsx";

const STUDENT_HEADER: [&str; 4] = ["First Name", "Last Name", "Email", "Password"];
const PARENT_HEADER: [&str; 5] = [
    "Parent First Name",
    "Parent Last Name",
    "Child Name",
    "Email",
    "Password",
];
const TEACHER_HEADER: [&str; 5] = ["First Name", "Last Name", "Subjects", "Email", "Password"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub path: String,
    pub sheets: Vec<String>,
    pub students: usize,
    pub parents: usize,
    pub teachers: usize,
}

fn class_key(year: &str, section: &str) -> String {
    format!("Y{}_S{}", year, section)
}

fn password_or_na(initial: Option<String>) -> String {
    initial.unwrap_or_else(|| "N/A".to_string())
}

fn sheet_for<'a>(
    wb: &'a mut Workbook,
    names: &mut HashMap<String, String>,
    key: String,
    header: &[&str],
) -> Option<&'a mut Sheet> {
    let actual = match names.get(&key) {
        Some(name) => name.clone(),
        None => {
            let name = wb.add_sheet(&key, header).name.clone();
            names.insert(key, name.clone());
            name
        }
    };
    wb.sheet_mut(&actual)
}

/// Student and parent sheets per (year, section) of the student, then one
/// teacher sheet. Parents appear once per child.
pub fn build_accounts_workbook(conn: &Connection) -> anyhow::Result<(Workbook, ExportSummary)> {
    let mut wb = Workbook::new();
    let mut summary = ExportSummary {
        path: String::new(),
        sheets: Vec::new(),
        students: 0,
        parents: 0,
        teachers: 0,
    };

    let mut names = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT st.year, st.section, st.first_name, st.last_name, u.email, u.initial_password
         FROM students st
         JOIN users u ON u.id = st.user_id
         ORDER BY st.year, st.section, st.last_name, st.first_name",
    )?;
    let students = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, Option<String>>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to load students")?;
    for (year, section, first, last, email, initial) in students {
        let key = format!("Students_{}", class_key(&year, &section));
        if let Some(sheet) = sheet_for(&mut wb, &mut names, key, &STUDENT_HEADER) {
            sheet.push_row([first, last, email, password_or_na(initial)]);
            summary.students += 1;
        }
    }

    let mut stmt = conn.prepare(
        "SELECT st.year, st.section, p.first_name, p.last_name,
                st.first_name || ' ' || st.last_name, u.email, u.initial_password
         FROM parents p
         JOIN users u ON u.id = p.user_id
         JOIN student_guardians g ON g.parent_id = p.id
         JOIN students st ON st.id = g.student_id
         ORDER BY st.year, st.section, p.last_name, p.first_name",
    )?;
    let parents = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, Option<String>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to load parents")?;
    for (year, section, first, last, child, email, initial) in parents {
        let key = format!("Parents_{}", class_key(&year, &section));
        if let Some(sheet) = sheet_for(&mut wb, &mut names, key, &PARENT_HEADER) {
            sheet.push_row([first, last, child, email, password_or_na(initial)]);
            summary.parents += 1;
        }
    }

    let mut stmt = conn.prepare(
        "SELECT t.id, t.first_name, t.last_name, u.email, u.initial_password
         FROM teachers t
         JOIN users u ON u.id = t.user_id
         ORDER BY t.last_name, t.first_name",
    )?;
    let teachers = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to load teachers")?;
    let sheet = wb.add_sheet("Teachers", &TEACHER_HEADER);
    for (id, first, last, email, initial) in teachers {
        let mut codes = accounts::teacher_subject_codes(conn, &id)?;
        let mut seen = HashSet::new();
        codes.retain(|c| seen.insert(c.clone()));
        sheet.push_row([first, last, codes.join(", "), email, password_or_na(initial)]);
        summary.teachers += 1;
    }

    summary.sheets = wb.sheets().iter().map(|s| s.name.clone()).collect();
    Ok((wb, summary))
}

pub fn export_accounts(conn: &Connection, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let (wb, mut summary) = build_accounts_workbook(conn)?;
    wb.write_to(out_path)?;
    summary.path = out_path.to_string_lossy().to_string();
    tracing::info!(
        path = %summary.path,
        sheets = summary.sheets.len(),
        students = summary.students,
        parents = summary.parents,
        teachers = summary.teachers,
        "accounts exported"
    );
    Ok(summary)
}
