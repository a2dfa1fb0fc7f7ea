use crate::db::WorkspaceSubjects;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::Subject;
use crate::subjects::SubjectCache;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn query(e: anyhow::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn update(e: anyhow::Error) -> Self {
        Self::new("db_update_failed", e.to_string())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Collapses a handler body into the response envelope.
pub fn respond(
    req: &Request,
    result: Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match result {
        Ok(v) => crate::ipc::error::ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_bool(req: &Request, key: &str) -> Result<Option<bool>, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

/// Set ids the caller picked; absent or null means "no explicit selection".
pub fn optional_str_list(req: &Request, key: &str) -> Result<Option<Vec<String>>, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    HandlerErr::bad_params(format!("{} must be an array of strings", key))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(HandlerErr::bad_params(format!(
            "{} must be an array of strings",
            key
        ))),
    }
}

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn subject_cache<'a>(
    state: &'a AppState,
) -> Result<&'a SubjectCache<WorkspaceSubjects>, HandlerErr> {
    state
        .subjects
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Deserializes one record param, reporting the serde message on failure.
pub fn parse_param<T: serde::de::DeserializeOwned>(
    req: &Request,
    key: &str,
) -> Result<T, HandlerErr> {
    let Some(raw) = req.params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    serde_json::from_value(raw.clone()).map_err(|e| {
        HandlerErr::bad_params(format!("invalid {}", key))
            .with_details(json!({ "reason": e.to_string() }))
    })
}

/// Like `parse_param` for arrays; absent or null reads as empty.
pub fn parse_list_param<T: serde::de::DeserializeOwned>(
    req: &Request,
    key: &str,
) -> Result<Vec<T>, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(_) => parse_param(req, key),
    }
}

/// Inline subject dictionaries arrive either as an array of records or as an
/// object keyed by subject id.
pub fn parse_subjects_param(req: &Request, key: &str) -> Result<HashMap<String, Subject>, HandlerErr> {
    let list: Vec<Subject> = match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::Object(map)) => map
            .values()
            .map(|v| serde_json::from_value::<Subject>(v.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                HandlerErr::bad_params(format!("invalid {}", key))
                    .with_details(json!({ "reason": e.to_string() }))
            })?,
        Some(_) => parse_param(req, key)?,
    };
    Ok(list.into_iter().map(|s| (s.id.clone(), s)).collect())
}

/// Fills in a generated id when the record arrives without one.
pub fn with_generated_id(mut raw: serde_json::Value) -> serde_json::Value {
    if let Some(obj) = raw.as_object_mut() {
        let missing = obj
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().is_empty())
            .unwrap_or(true);
        if missing {
            obj.insert(
                "id".to_string(),
                serde_json::Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
    }
    raw
}

/// `parse_param` for records whose id may be left to the server.
pub fn parse_record_param<T: serde::de::DeserializeOwned>(
    req: &Request,
    key: &str,
) -> Result<T, HandlerErr> {
    let Some(raw) = req.params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    if !raw.is_object() {
        return Err(HandlerErr::bad_params(format!("{} must be an object", key)));
    }
    serde_json::from_value(with_generated_id(raw.clone())).map_err(|e| {
        HandlerErr::bad_params(format!("invalid {}", key))
            .with_details(json!({ "reason": e.to_string() }))
    })
}
