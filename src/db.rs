use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "school.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL CHECK(role IN ('admin', 'teacher', 'student', 'parent')),
            password_hash TEXT NOT NULL,
            initial_password TEXT,
            first_login INTEGER NOT NULL DEFAULT 1,
            created_at TEXT
        )",
        [],
    )?;
    ensure_users_without_salt(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            course_id TEXT,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            semester TEXT NOT NULL CHECK(semester IN ('1st', '2nd')),
            year_level TEXT NOT NULL DEFAULT '1st',
            FOREIGN KEY(course_id) REFERENCES courses(id) ON DELETE SET NULL,
            UNIQUE(code, semester, year_level)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_course ON subjects(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS parents(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            contact_number TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            student_no TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            last_name TEXT NOT NULL,
            course_id TEXT,
            year TEXT NOT NULL,
            section TEXT NOT NULL,
            semester TEXT NOT NULL DEFAULT '1st',
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY(course_id) REFERENCES courses(id) ON DELETE SET NULL
        )",
        [],
    )?;
    // Workspaces created before regular/irregular tracking lack this column.
    ensure_students_is_regular(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(course_id, year, section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_subjects(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            PRIMARY KEY(student_id, subject_id),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY(subject_id) REFERENCES subjects(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_subjects_subject ON student_subjects(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_guardians(
            student_id TEXT NOT NULL,
            parent_id TEXT NOT NULL,
            PRIMARY KEY(student_id, parent_id),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY(parent_id) REFERENCES parents(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_guardians_parent ON student_guardians(parent_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_offerings(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            teacher_id TEXT,
            year TEXT NOT NULL,
            section TEXT NOT NULL,
            school_year TEXT NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id) ON DELETE CASCADE,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id) ON DELETE SET NULL,
            UNIQUE(subject_id, year, section, school_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_offerings_teacher ON subject_offerings(teacher_id, year, school_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            offering_id TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('present', 'absent', 'late')),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY(offering_id) REFERENCES subject_offerings(id) ON DELETE CASCADE,
            UNIQUE(student_id, offering_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_offering_date ON attendance(offering_id, date)",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_is_regular(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "is_regular")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE students ADD COLUMN is_regular TEXT NOT NULL DEFAULT 'regular'",
        [],
    )?;
    Ok(())
}

/// Password hashes carry their own salt; older workspaces still have the
/// separate column.
fn ensure_users_without_salt(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "users", "password_salt")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE users DROP COLUMN password_salt", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
