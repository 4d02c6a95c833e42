use crate::accounts::Session;
use crate::error::{AppError, AppResult};
use crate::model::{self, Role};
use crate::offerings::Selection;
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

/// Non-empty string param; blank counts as missing.
pub fn required_str(params: &Value, key: &str) -> AppResult<String> {
    optional_str(params, key).ok_or_else(|| AppError::invalid(key, format!("missing {}", key)))
}

/// Trimmed string param; blank or absent is `None`, like an unselected
/// dropdown.
pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Raw string param (not trimmed); absent is an empty string.
pub fn raw_str(params: &Value, key: &str) -> String {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

pub fn optional_bool(params: &Value, key: &str, default: bool) -> AppResult<bool> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(AppError::invalid(key, format!("{} must be a boolean", key))),
    }
}

pub fn optional_u64(params: &Value, key: &str) -> AppResult<Option<u64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| AppError::invalid(key, format!("{} must be a non-negative integer", key))),
    }
}

pub fn optional_date(params: &Value, key: &str) -> AppResult<Option<NaiveDate>> {
    optional_str(params, key)
        .map(|raw| model::parse_date(key, &raw))
        .transpose()
}

pub fn optional_time(params: &Value, key: &str) -> AppResult<Option<NaiveTime>> {
    optional_str(params, key)
        .map(|raw| model::parse_time(key, &raw))
        .transpose()
}

/// Array of strings; `None` when the key is absent or null.
pub fn string_list(params: &Value, key: &str) -> AppResult<Option<Vec<String>>> {
    let Some(v) = params.get(key) else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    let Some(items) = v.as_array() else {
        return Err(AppError::invalid(key, format!("{} must be an array", key)));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(s) = item.as_str() else {
            return Err(AppError::invalid(key, format!("{} must contain strings", key)));
        };
        let s = s.trim();
        if !s.is_empty() {
            out.push(s.to_string());
        }
    }
    Ok(Some(out))
}

/// `selections` as `[{subjectId, section}]` objects or `"<subjectId>_<section>"`
/// checkbox values. Absent means the empty set.
pub fn selections(params: &Value) -> AppResult<Vec<Selection>> {
    let Some(v) = params.get("selections") else {
        return Ok(Vec::new());
    };
    if v.is_null() {
        return Ok(Vec::new());
    }
    let Some(items) = v.as_array() else {
        return Err(AppError::invalid("selections", "selections must be an array"));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let sel = match item {
            Value::String(raw) => {
                let Some((subject_id, section)) = raw.rsplit_once('_') else {
                    return Err(AppError::invalid(
                        "selections",
                        format!("invalid selection: {}", raw),
                    ));
                };
                Selection {
                    subject_id: subject_id.to_string(),
                    section: section.to_string(),
                }
            }
            Value::Object(_) => Selection {
                subject_id: required_str(item, "subjectId")
                    .map_err(|_| AppError::invalid("selections", "selection is missing subjectId"))?,
                section: required_str(item, "section")
                    .map_err(|_| AppError::invalid("selections", "selection is missing section"))?,
            },
            _ => {
                return Err(AppError::invalid(
                    "selections",
                    "selections must contain objects or strings",
                ))
            }
        };
        out.push(sel);
    }
    Ok(out)
}

fn session_profile(session: Option<&Session>, role: Role) -> Option<String> {
    session
        .filter(|s| s.role == role.as_str())
        .and_then(|s| s.profile_id.clone())
}

/// The teacher a teacher-scoped method acts for. A logged-in teacher can
/// only act for themselves; otherwise `teacherId` is required.
pub fn resolve_profile(
    params: &Value,
    session: Option<&Session>,
    role: Role,
    key: &str,
) -> AppResult<String> {
    let requested = optional_str(params, key);
    match (session_profile(session, role), requested) {
        (Some(own), None) => Ok(own),
        (Some(own), Some(asked)) if own == asked => Ok(own),
        (Some(_), Some(_)) => Err(AppError::NotFound(role_noun(role))),
        (None, Some(asked)) => Ok(asked),
        (None, None) => Err(AppError::invalid(key, format!("missing {}", key))),
    }
}

fn role_noun(role: Role) -> &'static str {
    match role {
        Role::Admin => "user",
        Role::Teacher => "teacher",
        Role::Student => "student",
        Role::Parent => "parent",
    }
}
