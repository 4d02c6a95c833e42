use std::path::PathBuf;

use crate::accounts::Session;
use crate::config::SchoolConfig;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: SchoolConfig,
    pub session: Option<Session>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            db: None,
            config: SchoolConfig::default(),
            session: None,
        }
    }
}
