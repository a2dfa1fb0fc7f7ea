use crate::assign::ResolveOptions;
use crate::db;
use crate::ipc::helpers::{db_conn, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::transcript::UNKNOWN_SUBJECT;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
pub enum SetupSection {
    Registrar,
    Assignment,
    Transcript,
}

impl SetupSection {
    const ALL: [SetupSection; 3] = [
        SetupSection::Registrar,
        SetupSection::Assignment,
        SetupSection::Transcript,
    ];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "registrar" => Some(Self::Registrar),
            "assignment" => Some(Self::Assignment),
            "transcript" => Some(Self::Transcript),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Registrar => "registrar",
            Self::Assignment => "assignment",
            Self::Transcript => "transcript",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Registrar => "setup.registrar",
            Self::Assignment => "setup.assignment",
            Self::Transcript => "setup.transcript",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Registrar => json!({
            "schoolName": "",
            "schoolYear": "",
            "defaultTerm": ""
        }),
        SetupSection::Assignment => json!({
            "defaultToAssignedSet": true
        }),
        SetupSection::Transcript => json!({
            "unknownSubjectLabel": UNKNOWN_SUBJECT,
            "includeSummary": true
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Registrar => match k.as_str() {
                "schoolName" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                "schoolYear" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 16)?));
                }
                "defaultTerm" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 32)?));
                }
                _ => return Err(format!("unknown registrar field: {}", k)),
            },
            SetupSection::Assignment => match k.as_str() {
                "defaultToAssignedSet" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown assignment field: {}", k)),
            },
            SetupSection::Transcript => match k.as_str() {
                "unknownSubjectLabel" => {
                    let s = parse_string_max(v, k, 64)?;
                    if s.is_empty() {
                        return Err("unknownSubjectLabel must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "includeSummary" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown transcript field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let mut merged = current.clone();
            match merge_section_patch(section, &mut merged, saved_obj) {
                Ok(()) => current = merged,
                Err(e) => {
                    tracing::warn!(section = section.name(), error = %e, "ignoring saved settings")
                }
            }
        }
    }
    Ok(current)
}

/// Resolver options from the workspace, or defaults when none is open.
pub fn resolve_options(conn: Option<&Connection>) -> ResolveOptions {
    let mut options = ResolveOptions::default();
    if let Some(conn) = conn {
        if let Ok(section) = load_section(conn, SetupSection::Assignment) {
            if let Some(b) = section.get("defaultToAssignedSet").and_then(|v| v.as_bool()) {
                options.default_to_assigned_set = b;
            }
        }
    }
    options
}

pub struct TranscriptSettings {
    pub unknown_subject_label: String,
    pub include_summary: bool,
}

pub fn transcript_settings(conn: Option<&Connection>) -> TranscriptSettings {
    let section = conn
        .and_then(|c| load_section(c, SetupSection::Transcript).ok())
        .unwrap_or_else(|| default_section(SetupSection::Transcript));
    TranscriptSettings {
        unknown_subject_label: section
            .get("unknownSubjectLabel")
            .and_then(|v| v.as_str())
            .unwrap_or(UNKNOWN_SUBJECT)
            .to_string(),
        include_summary: section
            .get("includeSummary")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
    }
}

fn handle_setup_get(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut out = Map::new();
    for section in SetupSection::ALL {
        let v = load_section(conn, section).map_err(HandlerErr::query)?;
        out.insert(section.name().to_string(), v);
    }
    Ok(Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("missing section"));
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return Err(HandlerErr::bad_params("unknown section")
            .with_details(json!({ "section": section_raw })));
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut current = load_section(conn, section).map_err(HandlerErr::query)?;
    merge_section_patch(section, &mut current, patch_obj).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, section.key(), &current).map_err(HandlerErr::update)?;
    tracing::info!(section = section.name(), "setup section updated");
    Ok(json!({ "ok": true, "section": section.name(), "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(respond(req, handle_setup_get(state))),
        "setup.update" => Some(respond(req, handle_setup_update(state, req))),
        _ => None,
    }
}
