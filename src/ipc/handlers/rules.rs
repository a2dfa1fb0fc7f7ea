use crate::db;
use crate::ipc::helpers::{db_conn, parse_record_param, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{AssignmentRule, Department, Level};
use serde_json::{json, Value};

/// Rejects rules that could never match any descriptor.
fn validate_rule(rule: &AssignmentRule) -> Result<(), HandlerErr> {
    if rule.subject_set_id.trim().is_empty() {
        return Err(HandlerErr::bad_params("rule needs a subjectSetId"));
    }
    match rule.level {
        Level::College => {
            if rule.course_code.is_none() || rule.year_level.is_none() || rule.semester.is_none()
            {
                return Err(HandlerErr::bad_params(
                    "college rules need courseCode, yearLevel and semester",
                )
                .with_details(json!({ "ruleId": rule.id })));
            }
        }
        Level::HighSchool => {
            if rule.grade_level.is_none() {
                return Err(HandlerErr::bad_params("high-school rules need gradeLevel")
                    .with_details(json!({ "ruleId": rule.id })));
            }
            if rule.department == Some(Department::Shs) && rule.semester.is_none() {
                return Err(HandlerErr::bad_params("SHS rules need a semester")
                    .with_details(json!({ "ruleId": rule.id })));
            }
        }
    }
    Ok(())
}

fn handle_rules_list(state: &AppState) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "rules": [] }));
    };
    let rules = db::list_rules(conn).map_err(HandlerErr::query)?;
    Ok(json!({ "rules": rules }))
}

fn handle_rules_upsert(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let rule: AssignmentRule = parse_record_param(req, "rule")?;
    validate_rule(&rule)?;
    db::upsert_rule(conn, &rule).map_err(HandlerErr::update)?;
    tracing::info!(
        rule_id = %rule.id,
        level = rule.level.as_str(),
        subject_set_id = %rule.subject_set_id,
        "assignment rule saved"
    );
    Ok(json!({ "ruleId": rule.id }))
}

fn handle_rules_delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let rule_id = required_str(req, "ruleId")?;
    let deleted = db::delete_rule(conn, &rule_id).map_err(HandlerErr::update)?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "rules.list" => handle_rules_list(state),
        "rules.upsert" => handle_rules_upsert(state, req),
        "rules.delete" => handle_rules_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
