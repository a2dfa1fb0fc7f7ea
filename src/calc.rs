use crate::model::{GradeEntry, SpecialStatus};

/// Tertiary grade-point bands, highest first. Lower bounds are inclusive.
pub const NUMERIC_GRADE_BANDS: [(f64, f64); 9] = [
    (98.0, 1.00),
    (95.0, 1.25),
    (92.0, 1.50),
    (89.0, 1.75),
    (86.0, 2.00),
    (83.0, 2.25),
    (80.0, 2.50),
    (77.0, 2.75),
    (75.0, 3.00),
];
pub const NUMERIC_GRADE_FAILING: f64 = 5.00;

/// Descriptive remark bands, highest first. Lower bounds are inclusive.
pub const DESCRIPTIVE_BANDS: [(f64, &str); 6] = [
    (98.0, "Excellent"),
    (92.0, "Superior"),
    (86.0, "Very Good"),
    (83.0, "Good"),
    (80.0, "Fair"),
    (75.0, "Passed"),
];
pub const DESCRIPTIVE_FAILING: &str = "Failed";
pub const NO_GRADE_LABEL: &str = "Incomplete";

/// Two-decimal round-half-up on the scaled value:
/// `floor(100*x + 0.5) / 100`
pub fn round_off_2_decimal(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Period-based average for one subject's entry.
///
/// `None` means either a special status suppressed the average or no period
/// has a grade yet; callers tell the two apart through `special_status`.
pub fn period_average(entry: &GradeEntry, is_college: bool) -> Option<f64> {
    if entry.special_status.is_some() {
        return None;
    }
    let values = entry.counted_periods(is_college);
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(round_off_2_decimal(sum / values.len() as f64))
}

fn lookup_band<T: Copy>(bands: &[(f64, T)], percentage: f64, floor: T) -> T {
    bands
        .iter()
        .find(|(threshold, _)| percentage >= *threshold)
        .map(|(_, value)| *value)
        .unwrap_or(floor)
}

/// `None` and `0` both mean "no percentage yet".
fn graded(percentage: Option<f64>) -> Option<f64> {
    percentage.filter(|p| *p != 0.0)
}

/// Tertiary 1.00-5.00 grade point for a percentage average.
pub fn numeric_grade(percentage: Option<f64>) -> Option<f64> {
    let p = graded(percentage)?;
    Some(lookup_band(&NUMERIC_GRADE_BANDS, p, NUMERIC_GRADE_FAILING))
}

pub fn descriptive_label(percentage: Option<f64>) -> &'static str {
    match graded(percentage) {
        None => NO_GRADE_LABEL,
        Some(p) => lookup_band(&DESCRIPTIVE_BANDS, p, DESCRIPTIVE_FAILING),
    }
}

/// Remarks column: a special status replaces the percentage-derived label.
pub fn remarks(special_status: Option<SpecialStatus>, average: Option<f64>) -> &'static str {
    match special_status {
        Some(status) => status.expansion(),
        None => descriptive_label(average),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(periods: [Option<f64>; 4], status: Option<SpecialStatus>) -> GradeEntry {
        let mut e = GradeEntry::new("subj");
        e.period1 = periods[0];
        e.period2 = periods[1];
        e.period3 = periods[2];
        e.period4 = periods[3];
        e.special_status = status;
        e
    }

    #[test]
    fn round_off_is_half_up_on_scaled_value() {
        assert_eq!(round_off_2_decimal(0.0), 0.0);
        assert_eq!(round_off_2_decimal(85.333333), 85.33);
        assert_eq!(round_off_2_decimal(85.666666), 85.67);
        assert_eq!(round_off_2_decimal(80.125), 80.13);
        assert_eq!(round_off_2_decimal(90.0), 90.0);
    }

    #[test]
    fn college_average_uses_first_three_periods() {
        let e = entry([Some(95.0), Some(85.0), Some(90.0), Some(10.0)], None);
        let avg = period_average(&e, true);
        assert_eq!(avg, Some(90.0));
        assert_eq!(numeric_grade(avg), Some(1.75));
        assert_eq!(descriptive_label(avg), "Very Good");
    }

    #[test]
    fn secondary_average_skips_missing_periods() {
        let e = entry([Some(80.0), None, Some(75.0), Some(85.0)], None);
        let avg = period_average(&e, false);
        assert_eq!(avg, Some(80.0));
        assert_eq!(descriptive_label(avg), "Fair");
    }

    #[test]
    fn special_status_suppresses_average_and_overrides_label() {
        for status in [
            SpecialStatus::Incomplete,
            SpecialStatus::FailedAbsent,
            SpecialStatus::FailedWithdrawn,
            SpecialStatus::Withdrawn,
        ] {
            let e = entry([Some(99.0), Some(99.0), Some(99.0), Some(99.0)], Some(status));
            assert_eq!(period_average(&e, true), None);
            assert_eq!(period_average(&e, false), None);
            assert_eq!(remarks(e.special_status, Some(99.0)), status.expansion());
        }
        assert_eq!(remarks(Some(SpecialStatus::FailedAbsent), None), "Failed (Absent)");
    }

    #[test]
    fn no_grades_yet_is_none_without_status() {
        let e = entry([None, None, None, Some(90.0)], None);
        assert_eq!(period_average(&e, true), None);
        assert_eq!(period_average(&e, false), Some(90.0));
        assert_eq!(remarks(None, None), "Incomplete");
    }

    #[test]
    fn numeric_grade_band_boundaries_are_inclusive() {
        let cases = [
            (98.0, 1.00),
            (97.99, 1.25),
            (95.0, 1.25),
            (92.0, 1.50),
            (91.99, 1.75),
            (89.0, 1.75),
            (86.0, 2.00),
            (83.0, 2.25),
            (80.0, 2.50),
            (77.0, 2.75),
            (75.0, 3.00),
            (74.99, 5.00),
            (12.0, 5.00),
            (100.0, 1.00),
        ];
        for (p, expected) in cases {
            assert_eq!(numeric_grade(Some(p)), Some(expected), "percentage {}", p);
        }
        assert_eq!(numeric_grade(None), None);
        assert_eq!(numeric_grade(Some(0.0)), None);
    }

    #[test]
    fn descriptive_label_band_boundaries_are_inclusive() {
        let cases = [
            (98.0, "Excellent"),
            (97.99, "Superior"),
            (92.0, "Superior"),
            (86.0, "Very Good"),
            (85.99, "Good"),
            (83.0, "Good"),
            (80.0, "Fair"),
            (75.0, "Passed"),
            (74.99, "Failed"),
        ];
        for (p, expected) in cases {
            assert_eq!(descriptive_label(Some(p)), expected, "percentage {}", p);
        }
        assert_eq!(descriptive_label(None), "Incomplete");
        assert_eq!(descriptive_label(Some(0.0)), "Incomplete");
    }

    #[test]
    fn numeric_grade_never_worsens_as_percentage_rises() {
        let mut prev = f64::INFINITY;
        let mut p = 0.01;
        while p <= 100.0 {
            let g = numeric_grade(Some(p)).expect("grade for positive percentage");
            assert!(g <= prev, "grade rose from {} to {} at {}", prev, g, p);
            prev = g;
            p += 0.25;
        }
    }
}
