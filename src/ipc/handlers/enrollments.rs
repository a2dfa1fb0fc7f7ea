use crate::db;
use crate::ipc::helpers::{db_conn, parse_record_param, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{EnrollmentRecord, Level};
use serde_json::{json, Value};

fn handle_enrollments_list(state: &AppState) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "enrollments": [] }));
    };
    let rows = db::list_enrollments(conn).map_err(HandlerErr::query)?;
    let enrollments: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "enrollment": r,
                "descriptor": r.descriptor(),
            })
        })
        .collect();
    Ok(json!({ "enrollments": enrollments }))
}

fn handle_enrollments_upsert(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let record: EnrollmentRecord = parse_record_param(req, "enrollment")?;
    if Level::parse(&record.level).is_none() {
        return Err(HandlerErr::bad_params("level must be high-school or college")
            .with_details(json!({ "level": record.level })));
    }
    db::upsert_enrollment(conn, &record).map_err(HandlerErr::update)?;
    let descriptor = record.descriptor();
    if descriptor.is_none() {
        tracing::info!(enrollment_id = %record.id, "enrollment saved without a usable descriptor");
    }
    Ok(json!({ "enrollmentId": record.id, "descriptor": descriptor }))
}

fn handle_enrollments_delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let enrollment_id = required_str(req, "enrollmentId")?;
    let deleted = db::delete_enrollment(conn, &enrollment_id).map_err(HandlerErr::update)?;
    Ok(json!({ "deleted": deleted }))
}

pub fn load_enrollment(state: &AppState, req: &Request) -> Result<EnrollmentRecord, HandlerErr> {
    let conn = db_conn(state)?;
    let enrollment_id = required_str(req, "enrollmentId")?;
    db::get_enrollment(conn, &enrollment_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "enrollment not found")
                .with_details(json!({ "enrollmentId": enrollment_id }))
        })
}

fn handle_enrollments_descriptor(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let record = load_enrollment(state, req)?;
    Ok(json!({ "enrollmentId": record.id, "descriptor": record.descriptor() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "enrollments.list" => handle_enrollments_list(state),
        "enrollments.upsert" => handle_enrollments_upsert(state, req),
        "enrollments.delete" => handle_enrollments_delete(state, req),
        "enrollments.descriptor" => handle_enrollments_descriptor(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
