use crate::db;
use crate::ipc::helpers::{db_conn, parse_record_param, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Subject, SubjectSet};
use serde_json::{json, Value};

fn handle_subjects_list(state: &AppState) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "subjects": [] }));
    };
    let subjects = db::list_subjects(conn).map_err(HandlerErr::query)?;
    Ok(json!({ "subjects": subjects }))
}

fn handle_subjects_upsert(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut subject: Subject = parse_record_param(req, "subject")?;
    subject.code = subject.code.trim().to_string();
    subject.name = subject.name.trim().to_string();
    if subject.code.is_empty() || subject.name.is_empty() {
        return Err(HandlerErr::bad_params("subject code and name must not be empty"));
    }
    db::upsert_subject(conn, &subject).map_err(HandlerErr::update)?;
    if let Some(cache) = state.subjects.as_ref() {
        cache.invalidate(&subject.id);
    }
    tracing::info!(subject_id = %subject.id, code = %subject.code, "subject saved");
    Ok(json!({ "subjectId": subject.id }))
}

fn handle_subjects_delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let subject_id = required_str(req, "subjectId")?;
    let deleted = db::delete_subject(conn, &subject_id).map_err(HandlerErr::update)?;
    if let Some(cache) = state.subjects.as_ref() {
        cache.invalidate(&subject_id);
    }
    Ok(json!({ "deleted": deleted }))
}

fn handle_sets_list(state: &AppState) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "subjectSets": [] }));
    };
    let sets = db::list_subject_sets(conn).map_err(HandlerErr::query)?;
    Ok(json!({ "subjectSets": sets }))
}

fn handle_sets_upsert(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut set: SubjectSet = parse_record_param(req, "subjectSet")?;
    set.name = set.name.trim().to_string();
    if set.name.is_empty() {
        return Err(HandlerErr::bad_params("subject set name must not be empty"));
    }
    if set.course_selections.iter().any(|c| c.course_code.trim().is_empty()) {
        return Err(HandlerErr::bad_params(
            "courseSelections entries need a courseCode",
        ));
    }
    let mut seen = std::collections::HashSet::new();
    set.subjects.retain(|id| seen.insert(id.clone()));
    db::upsert_subject_set(conn, &set).map_err(HandlerErr::update)?;
    tracing::info!(subject_set_id = %set.id, subjects = set.subjects.len(), "subject set saved");
    Ok(json!({ "subjectSetId": set.id }))
}

fn handle_sets_delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let set_id = required_str(req, "subjectSetId")?;
    let deleted = db::delete_subject_set(conn, &set_id).map_err(HandlerErr::update)?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "subjects.list" => handle_subjects_list(state),
        "subjects.upsert" => handle_subjects_upsert(state, req),
        "subjects.delete" => handle_subjects_delete(state, req),
        "subjectSets.list" => handle_sets_list(state),
        "subjectSets.upsert" => handle_sets_upsert(state, req),
        "subjectSets.delete" => handle_sets_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
