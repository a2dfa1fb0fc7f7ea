use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    #[serde(rename = "high-school")]
    HighSchool,
    #[serde(rename = "college")]
    College,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::HighSchool => "high-school",
            Level::College => "college",
        }
    }

    /// Accepts the spellings found in enrollment forms, not just the canonical tag.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high-school" | "highschool" | "high school" | "high_school" | "hs" => {
                Some(Level::HighSchool)
            }
            "college" | "tertiary" => Some(Level::College),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Department {
    #[serde(rename = "JHS")]
    Jhs,
    #[serde(rename = "SHS")]
    Shs,
}

impl Department {
    pub fn as_str(self) -> &'static str {
        match self {
            Department::Jhs => "JHS",
            Department::Shs => "SHS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "JHS" => Some(Department::Jhs),
            "SHS" => Some(Department::Shs),
            _ => None,
        }
    }

    /// Grades 7-10 are junior high, 11-12 senior high.
    pub fn for_grade(grade_level: i64) -> Option<Self> {
        match grade_level {
            7..=10 => Some(Department::Jhs),
            11 | 12 => Some(Department::Shs),
            _ => None,
        }
    }
}

/// Resolution key for one enrolled student. The variant carries exactly the
/// attribute group its level uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level")]
pub enum EnrollmentDescriptor {
    #[serde(rename = "high-school", rename_all = "camelCase")]
    HighSchool {
        grade_level: i64,
        department: Department,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strand: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        semester: Option<String>,
    },
    #[serde(rename = "college", rename_all = "camelCase")]
    College {
        course_code: String,
        year_level: i64,
        semester: String,
    },
}

impl EnrollmentDescriptor {
    pub fn level(&self) -> Level {
        match self {
            EnrollmentDescriptor::HighSchool { .. } => Level::HighSchool,
            EnrollmentDescriptor::College { .. } => Level::College,
        }
    }

    pub fn is_college(&self) -> bool {
        self.level() == Level::College
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRule {
    pub id: String,
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semester: Option<String>,
    pub subject_set_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSelection {
    pub course_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semester: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSet {
    pub id: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub grade_level: Option<i64>,
    #[serde(default)]
    pub grade_levels: Vec<i64>,
    #[serde(default)]
    pub course_selections: Vec<CourseSelection>,
    #[serde(default)]
    pub color: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub lecture_units: u32,
    #[serde(default)]
    pub lab_units: u32,
    #[serde(default)]
    pub color: String,
}

impl Subject {
    /// Widened so any pair of stored unit counts adds without overflow.
    pub fn total_units(&self) -> u64 {
        u64::from(self.lecture_units) + u64::from(self.lab_units)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialStatus {
    #[serde(rename = "INC")]
    Incomplete,
    #[serde(rename = "FA")]
    FailedAbsent,
    #[serde(rename = "FW")]
    FailedWithdrawn,
    #[serde(rename = "W")]
    Withdrawn,
}

impl SpecialStatus {
    /// Only the four exact codes are recognized. Anything else, including
    /// lowercase or padded spellings, yields `None`, the same as no status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INC" => Some(SpecialStatus::Incomplete),
            "FA" => Some(SpecialStatus::FailedAbsent),
            "FW" => Some(SpecialStatus::FailedWithdrawn),
            "W" => Some(SpecialStatus::Withdrawn),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            SpecialStatus::Incomplete => "INC",
            SpecialStatus::FailedAbsent => "FA",
            SpecialStatus::FailedWithdrawn => "FW",
            SpecialStatus::Withdrawn => "W",
        }
    }

    pub fn expansion(self) -> &'static str {
        match self {
            SpecialStatus::Incomplete => "Incomplete",
            SpecialStatus::FailedAbsent => "Failed (Absent)",
            SpecialStatus::FailedWithdrawn => "Failed (Withdrawn)",
            SpecialStatus::Withdrawn => "Withdrawn",
        }
    }
}

/// One subject's grades for one term.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_code: Option<String>,
    pub period1: Option<f64>,
    pub period2: Option<f64>,
    pub period3: Option<f64>,
    pub period4: Option<f64>,
    pub special_status: Option<SpecialStatus>,
}

impl GradeEntry {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            subject_name: None,
            subject_code: None,
            period1: None,
            period2: None,
            period3: None,
            period4: None,
            special_status: None,
        }
    }

    /// Builds an entry from an untrusted JSON record. Period values that are
    /// not finite numbers (or numeric strings) become `None`, unknown status
    /// codes become `None`. Returns `None` only when no subject id is known.
    pub fn from_json(subject_id_hint: Option<&str>, raw: &Value) -> Option<Self> {
        let obj = raw.as_object();
        let field = |key: &str| obj.and_then(|o| o.get(key));

        let subject_id = field("subjectId")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(subject_id_hint)?
            .to_string();

        let mut entry = Self::new(subject_id);
        entry.subject_name = field("subjectName").and_then(non_empty_str);
        entry.subject_code = field("subjectCode").and_then(non_empty_str);
        entry.period1 = field("period1").and_then(coerce_period);
        entry.period2 = field("period2").and_then(coerce_period);
        entry.period3 = field("period3").and_then(coerce_period);
        entry.period4 = field("period4").and_then(coerce_period);
        entry.special_status = field("specialStatus")
            .and_then(|v| v.as_str())
            .and_then(SpecialStatus::parse);
        Some(entry)
    }

    /// Non-null periods that count for the term type. College terms have
    /// three periods; `period4` only exists for secondary terms.
    pub fn counted_periods(&self, is_college: bool) -> Vec<f64> {
        let mut periods = vec![self.period1, self.period2, self.period3];
        if !is_college {
            periods.push(self.period4);
        }
        periods.into_iter().flatten().collect()
    }
}

/// Grade period value parsing: parse failure means "absent", never zero.
pub fn coerce_period(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return None;
            }
            t.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn non_empty_str(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRow {
    pub subject_id: String,
    pub subject_name: String,
    pub subject_code: String,
    pub period1: Option<f64>,
    pub period2: Option<f64>,
    pub period3: Option<f64>,
    pub period4: Option<f64>,
    pub average: Option<f64>,
    pub numeric_grade: Option<f64>,
    pub remarks: String,
    pub special_status: Option<SpecialStatus>,
    pub units: Option<u64>,
}

/// Persisted enrollment as entered on the registrar forms. Level-specific
/// fields are kept as loose text; `descriptor()` interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRecord {
    pub id: String,
    #[serde(default)]
    pub student_name: String,
    pub level: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub grade_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub strand: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub course_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub year_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub semester: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub school_year: Option<String>,
}

impl EnrollmentRecord {
    pub fn descriptor(&self) -> Option<EnrollmentDescriptor> {
        match Level::parse(&self.level)? {
            Level::HighSchool => {
                let grade_level = self.grade_level.as_deref().and_then(first_int)?;
                let department = self
                    .department
                    .as_deref()
                    .and_then(Department::parse)
                    .or_else(|| Department::for_grade(grade_level))?;
                let (strand, semester) = match department {
                    Department::Jhs => (None, None),
                    Department::Shs => (clean(&self.strand), clean(&self.semester)),
                };
                Some(EnrollmentDescriptor::HighSchool {
                    grade_level,
                    department,
                    strand,
                    semester,
                })
            }
            Level::College => Some(EnrollmentDescriptor::College {
                course_code: clean(&self.course_code)?,
                year_level: self.year_level.as_deref().and_then(first_int)?,
                semester: clean(&self.semester)?,
            }),
        }
    }
}

fn clean(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First run of ASCII digits: "Grade 8" -> 8, "2nd Year" -> 2.
pub fn first_int(s: &str) -> Option<i64> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn lenient_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}
