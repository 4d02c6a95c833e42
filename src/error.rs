use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// One offering that blocks an assignment because another teacher owns it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OfferingConflict {
    pub subject_code: String,
    pub year: String,
    pub section: String,
    pub school_year: String,
    pub teacher_name: String,
}

impl OfferingConflict {
    pub fn describe(&self) -> String {
        format!(
            "{} (Year {}, Section {}, SY {}) is already assigned to {}",
            self.subject_code,
            self.year,
            self.section.to_uppercase(),
            self.school_year,
            self.teacher_name
        )
    }
}

fn describe_conflicts(conflicts: &[OfferingConflict]) -> String {
    conflicts
        .iter()
        .map(OfferingConflict::describe)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("Cannot save changes because of conflicts: {}", describe_conflicts(.0))]
    Conflict(Vec<OfferingConflict>),

    #[error("Invalid credentials.")]
    InvalidCredentials,

    #[error("select a workspace first")]
    NoWorkspace,

    #[error("database error: {0}")]
    Db(rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "bad_params",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Conflict(_) => "conflict",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::NoWorkspace => "no_workspace",
            AppError::Db(_) | AppError::Other(_) => "internal",
        }
    }

    /// Message safe to show to the user. Internal failures are logged and
    /// replaced with a generic message.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Db(e) => {
                tracing::error!(error = %e, "database failure");
                "An unexpected error occurred.".to_string()
            }
            AppError::Other(e) => {
                tracing::error!(error = ?e, "unexpected failure");
                "An unexpected error occurred.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation { field, .. } => Some(json!({ "field": field })),
            AppError::Conflict(conflicts) => Some(json!({ "conflicts": conflicts })),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(f, _) = &e {
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return AppError::AlreadyExists("Record already exists.".to_string());
            }
        }
        AppError::Db(e)
    }
}
