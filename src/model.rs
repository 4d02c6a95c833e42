use crate::error::{AppError, AppResult};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 3] = [
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Parent => "parent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            "parent" => Some(Role::Parent),
            _ => None,
        }
    }
}

pub const SEMESTERS: [&str; 2] = ["1st", "2nd"];

pub fn check_semester(field: &str, raw: &str) -> AppResult<String> {
    if SEMESTERS.contains(&raw) {
        Ok(raw.to_string())
    } else {
        Err(AppError::invalid(field, "semester must be one of: 1st, 2nd"))
    }
}

pub fn parse_date(field: &str, raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::invalid(field, "Invalid date format. Use YYYY-MM-DD format."))
}

/// Accepts `HH:MM` (form input) and `HH:MM:SS` (stored form).
pub fn parse_time(field: &str, raw: &str) -> AppResult<NaiveTime> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .map_err(|_| AppError::invalid(field, "Invalid time format. Use HH:MM."))
}

pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn time_key(t: NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn now_time() -> NaiveTime {
    let now = chrono::Local::now().time();
    NaiveTime::from_hms_opt(
        chrono::Timelike::hour(&now),
        chrono::Timelike::minute(&now),
        0,
    )
    .unwrap_or(now)
}

pub fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first, last)
}

/// `first middle last`, keeping the double space when there is no middle
/// name so report columns line up with the stored layout.
pub fn full_name_with_middle(first: &str, middle: Option<&str>, last: &str) -> String {
    format!("{} {} {}", first, middle.unwrap_or(""), last)
}

/// Percentage rounded to two decimals; zero when there is nothing to divide.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    ((part as f64) * 10000.0 / (total as f64)).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_of_zero_total_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(3, 3), 100.0);
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(AttendanceStatus::parse("Late"), Some(AttendanceStatus::Late));
        assert_eq!(AttendanceStatus::parse(" present "), Some(AttendanceStatus::Present));
        assert_eq!(AttendanceStatus::parse(""), None);
        assert_eq!(AttendanceStatus::parse("excused"), None);
    }

    #[test]
    fn time_accepts_form_and_stored_layouts() {
        assert_eq!(
            time_key(parse_time("time", "08:05").expect("hh:mm")),
            "08:05:00"
        );
        assert_eq!(
            time_key(parse_time("time", "17:59:30").expect("hh:mm:ss")),
            "17:59:30"
        );
        assert!(parse_time("time", "25:00").is_err());
    }
}
