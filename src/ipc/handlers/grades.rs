use crate::calc;
use crate::db;
use crate::ipc::handlers::enrollments;
use crate::ipc::helpers::{db_conn, optional_bool, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{coerce_period, GradeEntry};
use crate::transcript;
use serde_json::{json, Value};

fn handle_grades_get(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let record = enrollments::load_enrollment(state, req)?;
    let term = required_str(req, "term")?;
    let entries = db::get_grade_entries(conn, &record.id, &term).map_err(HandlerErr::query)?;
    Ok(json!({
        "enrollmentId": record.id,
        "term": term,
        "entries": entries
    }))
}

fn handle_grades_update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let record = enrollments::load_enrollment(state, req)?;
    let term = required_str(req, "term")?;
    let Some(raw) = req.params.get("entries") else {
        return Err(HandlerErr::bad_params("missing entries"));
    };
    if !raw.is_array() && !raw.is_object() {
        return Err(HandlerErr::bad_params(
            "entries must be an array or an object keyed by subject id",
        ));
    }
    let entries = transcript::entries_from_json(raw);
    db::replace_grade_entries(conn, &record.id, &term, &entries).map_err(HandlerErr::update)?;
    tracing::info!(
        enrollment_id = %record.id,
        term = %term,
        entries = entries.len(),
        "grade document saved"
    );
    Ok(json!({ "enrollmentId": record.id, "term": term, "count": entries.len() }))
}

fn handle_grades_terms(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let record = enrollments::load_enrollment(state, req)?;
    let terms = db::list_terms(conn, &record.id).map_err(HandlerErr::query)?;
    Ok(json!({ "enrollmentId": record.id, "terms": terms }))
}

fn handle_period_average(req: &Request) -> Result<Value, HandlerErr> {
    let Some(raw) = req.params.get("entry") else {
        return Err(HandlerErr::bad_params("missing entry"));
    };
    if !raw.is_object() {
        return Err(HandlerErr::bad_params("entry must be an object"));
    }
    // The subject id does not take part in averaging.
    let entry = GradeEntry::from_json(Some("-"), raw)
        .ok_or_else(|| HandlerErr::bad_params("entry must be an object"))?;
    let is_college = optional_bool(req, "isCollege")?.unwrap_or(false);

    let average = calc::period_average(&entry, is_college);
    let numeric_grade = if is_college {
        calc::numeric_grade(average)
    } else {
        None
    };
    Ok(json!({
        "average": average,
        "numericGrade": numeric_grade,
        "specialStatus": entry.special_status,
        "remarks": calc::remarks(entry.special_status, average)
    }))
}

fn handle_convert(req: &Request) -> Result<Value, HandlerErr> {
    let percentage = req.params.get("percentage").and_then(coerce_period);
    Ok(json!({
        "percentage": percentage,
        "numericGrade": calc::numeric_grade(percentage),
        "descriptiveLabel": calc::descriptive_label(percentage)
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "grades.get" => handle_grades_get(state, req),
        "grades.update" => handle_grades_update(state, req),
        "grades.terms" => handle_grades_terms(state, req),
        "calc.periodAverage" => handle_period_average(req),
        "calc.convert" => handle_convert(req),
        _ => return None,
    };
    Some(respond(req, result))
}
