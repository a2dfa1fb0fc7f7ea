use crate::model::{AssignmentRule, Department, EnrollmentDescriptor, Subject, SubjectSet};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Finds the rule that assigns a subject set to this descriptor.
///
/// Ties go to the first matching rule in table order.
pub fn match_rule<'a>(
    rules: &'a [AssignmentRule],
    descriptor: &EnrollmentDescriptor,
) -> Option<&'a AssignmentRule> {
    let level = descriptor.level();
    rules
        .iter()
        .filter(|r| r.level == level)
        .find(|r| rule_matches(r, descriptor))
}

fn rule_matches(rule: &AssignmentRule, descriptor: &EnrollmentDescriptor) -> bool {
    match descriptor {
        EnrollmentDescriptor::College {
            course_code,
            year_level,
            semester,
        } => {
            rule.course_code.as_deref() == Some(course_code.as_str())
                && rule.year_level == Some(*year_level)
                && rule.semester.as_deref() == Some(semester.as_str())
        }
        EnrollmentDescriptor::HighSchool {
            grade_level,
            department: Department::Jhs,
            ..
        } => rule.grade_level == Some(*grade_level),
        EnrollmentDescriptor::HighSchool {
            grade_level,
            department: Department::Shs,
            strand,
            semester,
        } => {
            rule.grade_level == Some(*grade_level)
                && rule.semester == *semester
                && rule.strand == *strand
        }
    }
}

/// The set a matched rule points at. A dangling `subjectSetId` yields `None`.
pub fn find_assigned_set<'a>(
    sets: &'a [SubjectSet],
    rule: Option<&AssignmentRule>,
) -> Option<&'a SubjectSet> {
    let rule = rule?;
    sets.iter().find(|s| s.id == rule.subject_set_id)
}

pub fn is_eligible(set: &SubjectSet, descriptor: &EnrollmentDescriptor) -> bool {
    match descriptor {
        EnrollmentDescriptor::HighSchool { grade_level, .. } => {
            set.grade_level == Some(*grade_level) || set.grade_levels.contains(grade_level)
        }
        EnrollmentDescriptor::College {
            course_code,
            year_level,
            semester,
        } => set.course_selections.iter().any(|sel| {
            sel.course_code == *course_code
                && sel.year_level.map(|y| y == *year_level).unwrap_or(true)
                && sel
                    .semester
                    .as_deref()
                    .map(|s| s == semester.as_str())
                    .unwrap_or(true)
        }),
    }
}

/// Eligible sets with the assigned one (if any) moved to the front. The
/// remaining sets keep their original relative order.
pub fn resolve_eligible_sets<'a>(
    sets: &'a [SubjectSet],
    descriptor: &EnrollmentDescriptor,
    assigned: Option<&'a SubjectSet>,
) -> Vec<&'a SubjectSet> {
    let mut out: Vec<&SubjectSet> = Vec::new();
    if let Some(a) = assigned {
        out.push(a);
    }
    out.extend(
        sets.iter()
            .filter(|s| assigned.map(|a| a.id != s.id).unwrap_or(true))
            .filter(|s| is_eligible(s, descriptor)),
    );
    out
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    /// With no explicit selection, offer the assigned set's subjects.
    pub default_to_assigned_set: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            default_to_assigned_set: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub assigned_rule_id: Option<String>,
    pub assigned_set_id: Option<String>,
    pub ordered_sets: Vec<SubjectSet>,
    pub selected_set_ids: Vec<String>,
    pub subject_ids: Vec<String>,
    pub subjects: Vec<Subject>,
    pub missing_subject_ids: Vec<String>,
    pub total_units: u64,
}

/// Resolves the subjects for one enrollment.
///
/// `selection` holds the set ids the caller has picked; ids that are not
/// among the ordered (eligible) sets are ignored. Subject ids with no record
/// in `subjects_by_id` stay in `subject_ids` but are left out of `subjects`.
pub fn resolve(
    descriptor: &EnrollmentDescriptor,
    rules: &[AssignmentRule],
    sets: &[SubjectSet],
    subjects_by_id: &HashMap<String, Subject>,
    selection: Option<&[String]>,
    options: &ResolveOptions,
) -> Resolution {
    let rule = match_rule(rules, descriptor);
    let assigned = find_assigned_set(sets, rule);
    let ordered = resolve_eligible_sets(sets, descriptor, assigned);

    let selected: Vec<&SubjectSet> = match selection {
        Some(ids) => ordered
            .iter()
            .copied()
            .filter(|s| ids.iter().any(|id| *id == s.id))
            .collect(),
        None if options.default_to_assigned_set => assigned.into_iter().collect(),
        None => Vec::new(),
    };

    let mut seen: HashSet<&str> = HashSet::new();
    let mut subject_ids: Vec<String> = Vec::new();
    for set in &selected {
        for id in &set.subjects {
            if seen.insert(id.as_str()) {
                subject_ids.push(id.clone());
            }
        }
    }

    let mut subjects: Vec<Subject> = Vec::new();
    let mut missing_subject_ids: Vec<String> = Vec::new();
    for id in &subject_ids {
        match subjects_by_id.get(id) {
            Some(s) => subjects.push(s.clone()),
            None => missing_subject_ids.push(id.clone()),
        }
    }
    let total_units = subjects
        .iter()
        .map(Subject::total_units)
        .fold(0, u64::saturating_add);

    Resolution {
        assigned_rule_id: rule.map(|r| r.id.clone()),
        assigned_set_id: assigned.map(|s| s.id.clone()),
        ordered_sets: ordered.into_iter().cloned().collect(),
        selected_set_ids: selected.iter().map(|s| s.id.clone()).collect(),
        subject_ids,
        subjects,
        missing_subject_ids,
        total_units,
    }
}
