use crate::db;
use crate::ipc::handlers::{enrollments, setup};
use crate::ipc::helpers::{
    db_conn, optional_bool, parse_subjects_param, required_str, respond, subject_cache,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Level;
use crate::transcript;
use serde_json::{json, Value};

fn handle_build_inline(req: &Request) -> Result<Value, HandlerErr> {
    let Some(raw) = req.params.get("entries") else {
        return Err(HandlerErr::bad_params("missing entries"));
    };
    let entries = transcript::entries_from_json(raw);
    let subjects_by_id = parse_subjects_param(req, "subjects")?;
    let is_college = optional_bool(req, "isCollege")?.unwrap_or(false);
    let include_summary = optional_bool(req, "includeSummary")?.unwrap_or(true);

    let rows = transcript::build_transcript(&entries, &subjects_by_id, is_college);
    let summary = include_summary.then(|| transcript::summarize(&rows, is_college));
    Ok(json!({
        "isCollege": is_college,
        "rows": rows,
        "summary": summary
    }))
}

fn handle_build_workspace(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let record = enrollments::load_enrollment(state, req)?;
    let term = required_str(req, "term")?;

    let descriptor = record.descriptor();
    let is_college = match descriptor.as_ref() {
        Some(d) => d.is_college(),
        None => Level::parse(&record.level) == Some(Level::College),
    };

    let entries = db::get_grade_entries(conn, &record.id, &term).map_err(HandlerErr::query)?;
    let subjects_by_id = subject_cache(state)?
        .snapshot(entries.iter().map(|e| e.subject_id.as_str()));

    let settings = setup::transcript_settings(Some(conn));
    let include_summary =
        optional_bool(req, "includeSummary")?.unwrap_or(settings.include_summary);
    let rows = transcript::build_transcript_with_label(
        &entries,
        &subjects_by_id,
        is_college,
        &settings.unknown_subject_label,
    );
    let summary = include_summary.then(|| transcript::summarize(&rows, is_college));

    let registrar =
        setup::load_section(conn, setup::SetupSection::Registrar).map_err(HandlerErr::query)?;
    let school_year = record
        .school_year
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            registrar
                .get("schoolYear")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

    tracing::debug!(
        enrollment_id = %record.id,
        term = %term,
        rows = rows.len(),
        "transcript built"
    );
    Ok(json!({
        "header": {
            "schoolName": registrar.get("schoolName").cloned().unwrap_or(Value::Null),
            "schoolYear": school_year,
            "studentName": record.student_name,
            "enrollmentId": record.id,
            "term": term,
            "descriptor": descriptor
        },
        "isCollege": is_college,
        "rows": rows,
        "summary": summary
    }))
}

fn handle_build(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    if req.params.get("enrollmentId").is_some() {
        handle_build_workspace(state, req)
    } else {
        handle_build_inline(req)
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "transcript.build" => Some(respond(req, handle_build(state, req))),
        _ => None,
    }
}
