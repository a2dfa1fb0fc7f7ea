use crate::assign::{self, ResolveOptions};
use crate::db;
use crate::ipc::handlers::{enrollments, setup};
use crate::ipc::helpers::{
    db_conn, optional_bool, optional_str_list, parse_list_param, parse_param, parse_subjects_param,
    respond, subject_cache, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{AssignmentRule, EnrollmentDescriptor, Subject, SubjectSet};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Records one resolution runs over. Inline requests carry them in params;
/// otherwise they come from the open workspace.
struct ResolveInputs {
    enrollment_id: Option<String>,
    descriptor: Option<EnrollmentDescriptor>,
    rules: Vec<AssignmentRule>,
    sets: Vec<SubjectSet>,
    subjects_by_id: Option<HashMap<String, Subject>>,
    options: ResolveOptions,
}

fn gather_inputs(state: &AppState, req: &Request) -> Result<ResolveInputs, HandlerErr> {
    let mut options = setup::resolve_options(state.db.as_ref());
    if let Some(b) = optional_bool(req, "defaultToAssignedSet")? {
        options.default_to_assigned_set = b;
    }

    if req.params.get("descriptor").is_some() {
        return Ok(ResolveInputs {
            enrollment_id: None,
            descriptor: Some(parse_param(req, "descriptor")?),
            rules: parse_list_param(req, "rules")?,
            sets: parse_list_param(req, "subjectSets")?,
            subjects_by_id: Some(parse_subjects_param(req, "subjects")?),
            options,
        });
    }

    let record = enrollments::load_enrollment(state, req)?;
    let conn = db_conn(state)?;
    Ok(ResolveInputs {
        enrollment_id: Some(record.id.clone()),
        descriptor: record.descriptor(),
        rules: db::list_rules(conn).map_err(HandlerErr::query)?,
        sets: db::list_subject_sets(conn).map_err(HandlerErr::query)?,
        subjects_by_id: None,
        options,
    })
}

fn handle_match(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let inputs = gather_inputs(state, req)?;
    let Some(descriptor) = inputs.descriptor.as_ref() else {
        return Ok(json!({
            "enrollmentId": inputs.enrollment_id,
            "descriptor": null,
            "rule": null,
            "subjectSet": null
        }));
    };
    let rule = assign::match_rule(&inputs.rules, descriptor);
    let set = assign::find_assigned_set(&inputs.sets, rule);
    Ok(json!({
        "enrollmentId": inputs.enrollment_id,
        "descriptor": descriptor,
        "rule": rule,
        "subjectSet": set
    }))
}

fn handle_resolve(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let inputs = gather_inputs(state, req)?;
    let selection = optional_str_list(req, "selectedSetIds")?;
    let Some(descriptor) = inputs.descriptor.as_ref() else {
        // Enrollment is missing level fields; nothing can be assigned yet.
        return Ok(json!({
            "enrollmentId": inputs.enrollment_id,
            "descriptor": null,
            "resolution": null
        }));
    };

    let subjects_by_id = match inputs.subjects_by_id {
        Some(map) => map,
        None => {
            // Only fetch metadata for subjects that can appear in the result.
            let rule = assign::match_rule(&inputs.rules, descriptor);
            let assigned = assign::find_assigned_set(&inputs.sets, rule);
            let ordered = assign::resolve_eligible_sets(&inputs.sets, descriptor, assigned);
            let cache = subject_cache(state)?;
            cache.snapshot(
                ordered
                    .iter()
                    .flat_map(|s| s.subjects.iter().map(String::as_str)),
            )
        }
    };

    let resolution = assign::resolve(
        descriptor,
        &inputs.rules,
        &inputs.sets,
        &subjects_by_id,
        selection.as_deref(),
        &inputs.options,
    );
    tracing::debug!(
        enrollment_id = ?inputs.enrollment_id,
        assigned_set_id = ?resolution.assigned_set_id,
        subjects = resolution.subject_ids.len(),
        missing = resolution.missing_subject_ids.len(),
        "assignment resolved"
    );
    Ok(json!({
        "enrollmentId": inputs.enrollment_id,
        "descriptor": descriptor,
        "resolution": resolution
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "assignment.match" => handle_match(state, req),
        "assignment.resolve" => handle_resolve(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
