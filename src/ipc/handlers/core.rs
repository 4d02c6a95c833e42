use crate::config::SchoolConfig;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "session": state.session,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(path = %path.to_string_lossy(), error = ?e, "failed to open workspace");
            return err(&req.id, "db_open_failed", format!("{e:#}"), None);
        }
    };
    let config = match SchoolConfig::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => return err(&req.id, "bad_config", format!("{e:#}"), None),
    };

    tracing::info!(path = %path.to_string_lossy(), "workspace selected");
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    state.config = config;
    state.session = None;
    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "yearLevels": state.config.year_levels,
            "sections": state.config.sections,
            "defaultSchoolYear": state.config.default_school_year,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
