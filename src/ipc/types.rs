use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One JSON line on stdin. `params` defaults to null for parameterless
/// methods like `health`.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Both fields stay `None` until `workspace.select` succeeds.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
