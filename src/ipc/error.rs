use crate::error::{AppError, AppResult};
use serde::Serialize;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn app_err(id: &str, e: &AppError) -> serde_json::Value {
    err(id, e.code(), e.public_message(), e.details())
}

pub fn no_workspace(id: &str) -> serde_json::Value {
    app_err(id, &AppError::NoWorkspace)
}

/// Serializes a handler result into a response line.
pub fn respond<T: Serialize>(id: &str, result: AppResult<T>) -> serde_json::Value {
    let value = result.and_then(|v| {
        serde_json::to_value(v).map_err(|e| AppError::Other(anyhow::Error::new(e)))
    });
    match value {
        Ok(v) => ok(id, v),
        Err(e) => app_err(id, &e),
    }
}
