use std::path::PathBuf;

use crate::db::WorkspaceSubjects;
use crate::subjects::SubjectCache;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub subjects: Option<SubjectCache<WorkspaceSubjects>>,
}

