use crate::calc;
use crate::model::{GradeEntry, Subject, TranscriptRow};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub const UNKNOWN_SUBJECT: &str = "Unknown Subject";

/// Reads a term's grade map from JSON. Accepts either an array of entries or
/// an object keyed by subject id; insertion order is kept. A repeated subject
/// id replaces the earlier entry in place. Entries without any subject id are
/// skipped.
pub fn entries_from_json(raw: &Value) -> Vec<GradeEntry> {
    let parsed: Vec<GradeEntry> = match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| GradeEntry::from_json(None, v))
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| GradeEntry::from_json(Some(k.as_str()), v))
            .collect(),
        _ => Vec::new(),
    };

    let mut out: Vec<GradeEntry> = Vec::with_capacity(parsed.len());
    let mut pos: HashMap<String, usize> = HashMap::new();
    for e in parsed {
        match pos.get(&e.subject_id) {
            Some(&i) => out[i] = e,
            None => {
                pos.insert(e.subject_id.clone(), out.len());
                out.push(e);
            }
        }
    }
    out
}

pub fn build_transcript(
    entries: &[GradeEntry],
    subjects_by_id: &HashMap<String, Subject>,
    is_college: bool,
) -> Vec<TranscriptRow> {
    build_transcript_with_label(entries, subjects_by_id, is_college, UNKNOWN_SUBJECT)
}

/// One row per entry, in entry order. Display metadata comes from the
/// subject record, then from the entry's own fallback fields.
pub fn build_transcript_with_label(
    entries: &[GradeEntry],
    subjects_by_id: &HashMap<String, Subject>,
    is_college: bool,
    unknown_label: &str,
) -> Vec<TranscriptRow> {
    entries
        .iter()
        .map(|e| {
            let subject = subjects_by_id.get(&e.subject_id);
            let subject_name = subject
                .map(|s| s.name.clone())
                .or_else(|| e.subject_name.clone())
                .unwrap_or_else(|| unknown_label.to_string());
            let subject_code = subject
                .map(|s| s.code.clone())
                .or_else(|| e.subject_code.clone())
                .unwrap_or_default();

            let average = calc::period_average(e, is_college);
            let numeric_grade = if is_college {
                calc::numeric_grade(average)
            } else {
                None
            };

            TranscriptRow {
                subject_id: e.subject_id.clone(),
                subject_name,
                subject_code,
                period1: e.period1,
                period2: e.period2,
                period3: e.period3,
                period4: if is_college { None } else { e.period4 },
                average,
                numeric_grade,
                remarks: calc::remarks(e.special_status, average).to_string(),
                special_status: e.special_status,
                units: subject.map(Subject::total_units),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermSummary {
    pub general_average: Option<f64>,
    pub grade_point_average: Option<f64>,
    pub total_units: u64,
    pub graded_count: usize,
    pub special_status_count: usize,
}

pub fn summarize(rows: &[TranscriptRow], is_college: bool) -> TermSummary {
    let averages: Vec<f64> = rows.iter().filter_map(|r| r.average).collect();
    let general_average = if averages.is_empty() {
        None
    } else {
        let sum: f64 = averages.iter().sum();
        Some(calc::round_off_2_decimal(sum / averages.len() as f64))
    };

    let grade_point_average = if is_college {
        let mut weighted = 0.0_f64;
        let mut units = 0_u64;
        for r in rows {
            if let (Some(g), Some(u)) = (r.numeric_grade, r.units) {
                if u > 0 {
                    weighted += g * u as f64;
                    units = units.saturating_add(u);
                }
            }
        }
        (units > 0).then(|| calc::round_off_2_decimal(weighted / units as f64))
    } else {
        None
    };

    TermSummary {
        general_average,
        grade_point_average,
        total_units: rows
            .iter()
            .filter_map(|r| r.units)
            .fold(0, u64::saturating_add),
        graded_count: averages.len(),
        special_status_count: rows.iter().filter(|r| r.special_status.is_some()).count(),
    }
}
