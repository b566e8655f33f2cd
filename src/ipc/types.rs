use std::path::PathBuf;

use serde::Deserialize;

use crate::db::SqliteService;
use crate::store::{MemoryStore, SessionStore};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub service: Option<SqliteService>,
    /// Single-record credential store. In-memory until a workspace is
    /// selected, then backed by the workspace session file.
    pub session: Box<dyn SessionStore>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            service: None,
            session: Box::new(MemoryStore::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new()
    }
}
