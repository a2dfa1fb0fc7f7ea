use crate::model::{
    coerce_period, AssignmentRule, CourseSelection, Department, EnrollmentRecord, GradeEntry,
    Level, SpecialStatus, Subject, SubjectSet,
};
use crate::subjects::SubjectSource;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const DB_FILENAME: &str = "registrar.sqlite3";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILENAME)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(db_path(workspace))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            lecture_units INTEGER NOT NULL DEFAULT 0,
            lab_units INTEGER NOT NULL DEFAULT 0,
            color TEXT NOT NULL DEFAULT '',
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_sets(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            color TEXT NOT NULL DEFAULT '',
            grade_level INTEGER,
            grade_levels_json TEXT NOT NULL DEFAULT '[]',
            course_selections_json TEXT NOT NULL DEFAULT '[]',
            subjects_json TEXT NOT NULL DEFAULT '[]',
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_rules(
            id TEXT PRIMARY KEY,
            level TEXT NOT NULL,
            grade_level INTEGER,
            department TEXT,
            strand TEXT,
            course_code TEXT,
            year_level INTEGER,
            semester TEXT,
            subject_set_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignment_rules_sort ON assignment_rules(sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_name TEXT NOT NULL DEFAULT '',
            level TEXT NOT NULL,
            grade_level TEXT,
            department TEXT,
            strand TEXT,
            course_code TEXT,
            year_level TEXT,
            semester TEXT,
            school_year TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    // period columns are declared without a type so legacy text values survive
    // the import and get coerced on read.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_entries(
            enrollment_id TEXT NOT NULL,
            term TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            subject_name TEXT,
            subject_code TEXT,
            period1,
            period2,
            period3,
            period4,
            special_status TEXT,
            PRIMARY KEY(enrollment_id, term, subject_id),
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_entries_doc ON grade_entries(enrollment_id, term, sort_order)",
        [],
    )?;

    Ok(conn)
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn next_sort_order(conn: &Connection, table: &str) -> anyhow::Result<i64> {
    let sql = format!("SELECT COALESCE(MAX(sort_order) + 1, 0) FROM {}", table);
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
}

fn json_list<T: serde::de::DeserializeOwned>(raw: &str) -> Vec<T> {
    serde_json::from_str(raw).unwrap_or_default()
}

// ---- settings ----

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

// ---- subjects ----

/// Negative counts read as 0; counts past `u32::MAX` are clamped.
fn unit_count(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        code: r.get(1)?,
        name: r.get(2)?,
        lecture_units: unit_count(r.get(3)?),
        lab_units: unit_count(r.get(4)?),
        color: r.get(5)?,
    })
}

pub fn list_subjects(conn: &Connection) -> anyhow::Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT id, code, name, lecture_units, lab_units, color
         FROM subjects
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([], subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_subject(conn: &Connection, subject_id: &str) -> anyhow::Result<Option<Subject>> {
    Ok(conn
        .query_row(
            "SELECT id, code, name, lecture_units, lab_units, color
             FROM subjects
             WHERE id = ?",
            [subject_id],
            subject_from_row,
        )
        .optional()?)
}

pub fn upsert_subject(conn: &Connection, s: &Subject) -> anyhow::Result<()> {
    let sort_order = next_sort_order(conn, "subjects")?;
    conn.execute(
        "INSERT INTO subjects(id, code, name, lecture_units, lab_units, color, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           code = excluded.code,
           name = excluded.name,
           lecture_units = excluded.lecture_units,
           lab_units = excluded.lab_units,
           color = excluded.color,
           updated_at = excluded.updated_at",
        (
            &s.id,
            &s.code,
            &s.name,
            s.lecture_units as i64,
            s.lab_units as i64,
            &s.color,
            sort_order,
            now_stamp(),
        ),
    )?;
    Ok(())
}

pub fn delete_subject(conn: &Connection, subject_id: &str) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM subjects WHERE id = ?", [subject_id])? > 0)
}

/// Reads subject records straight from a workspace database file through a
/// connection of its own, opened on first fetch and reused afterwards.
pub struct WorkspaceSubjects {
    db_path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl WorkspaceSubjects {
    pub fn new(workspace: &Path) -> Self {
        Self {
            db_path: db_path(workspace),
            conn: Mutex::new(None),
        }
    }
}

impl SubjectSource for WorkspaceSubjects {
    fn fetch(&self, subject_id: &str) -> anyhow::Result<Option<Subject>> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let conn = match guard.take() {
            Some(c) => c,
            None => Connection::open(&self.db_path)?,
        };
        let result = get_subject(&conn, subject_id);
        *guard = Some(conn);
        result
    }
}

// ---- subject sets ----

fn subject_set_from_row(r: &Row<'_>) -> rusqlite::Result<SubjectSet> {
    let grade_levels: String = r.get(5)?;
    let course_selections: String = r.get(6)?;
    let subjects: String = r.get(7)?;
    Ok(SubjectSet {
        id: r.get(0)?,
        name: r.get(1)?,
        description: r.get(2)?,
        color: r.get(3)?,
        grade_level: r.get(4)?,
        grade_levels: json_list::<i64>(&grade_levels),
        course_selections: json_list::<CourseSelection>(&course_selections),
        subjects: json_list::<String>(&subjects),
    })
}

pub fn list_subject_sets(conn: &Connection) -> anyhow::Result<Vec<SubjectSet>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, color, grade_level, grade_levels_json,
                course_selections_json, subjects_json
         FROM subject_sets
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([], subject_set_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn upsert_subject_set(conn: &Connection, s: &SubjectSet) -> anyhow::Result<()> {
    let sort_order = next_sort_order(conn, "subject_sets")?;
    conn.execute(
        "INSERT INTO subject_sets(id, name, description, color, grade_level, grade_levels_json,
                                  course_selections_json, subjects_json, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           description = excluded.description,
           color = excluded.color,
           grade_level = excluded.grade_level,
           grade_levels_json = excluded.grade_levels_json,
           course_selections_json = excluded.course_selections_json,
           subjects_json = excluded.subjects_json,
           updated_at = excluded.updated_at",
        (
            &s.id,
            &s.name,
            &s.description,
            &s.color,
            s.grade_level,
            serde_json::to_string(&s.grade_levels)?,
            serde_json::to_string(&s.course_selections)?,
            serde_json::to_string(&s.subjects)?,
            sort_order,
            now_stamp(),
        ),
    )?;
    Ok(())
}

pub fn delete_subject_set(conn: &Connection, set_id: &str) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM subject_sets WHERE id = ?", [set_id])? > 0)
}

// ---- assignment rules ----

/// Table order is the tie-break order for rule matching, so rows come back
/// by `sort_order` and updates never move a rule.
pub fn list_rules(conn: &Connection) -> anyhow::Result<Vec<AssignmentRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, level, grade_level, department, strand, course_code, year_level, semester,
                subject_set_id
         FROM assignment_rules
         ORDER BY sort_order",
    )?;
    let raw = stmt
        .query_map([], |r| {
            let level: String = r.get(1)?;
            let department: Option<String> = r.get(3)?;
            Ok((
                level,
                department,
                AssignmentRule {
                    id: r.get(0)?,
                    level: Level::HighSchool,
                    grade_level: r.get(2)?,
                    department: None,
                    strand: r.get(4)?,
                    course_code: r.get(5)?,
                    year_level: r.get(6)?,
                    semester: r.get(7)?,
                    subject_set_id: r.get(8)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rules = Vec::with_capacity(raw.len());
    for (level, department, mut rule) in raw {
        let Some(level) = Level::parse(&level) else {
            tracing::warn!(rule_id = %rule.id, level = %level, "skipping rule with unknown level");
            continue;
        };
        rule.level = level;
        rule.department = department.as_deref().and_then(Department::parse);
        rules.push(rule);
    }
    Ok(rules)
}

pub fn upsert_rule(conn: &Connection, rule: &AssignmentRule) -> anyhow::Result<()> {
    let sort_order = next_sort_order(conn, "assignment_rules")?;
    conn.execute(
        "INSERT INTO assignment_rules(id, level, grade_level, department, strand, course_code,
                                      year_level, semester, subject_set_id, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           level = excluded.level,
           grade_level = excluded.grade_level,
           department = excluded.department,
           strand = excluded.strand,
           course_code = excluded.course_code,
           year_level = excluded.year_level,
           semester = excluded.semester,
           subject_set_id = excluded.subject_set_id,
           updated_at = excluded.updated_at",
        (
            &rule.id,
            rule.level.as_str(),
            rule.grade_level,
            rule.department.map(Department::as_str),
            &rule.strand,
            &rule.course_code,
            rule.year_level,
            &rule.semester,
            &rule.subject_set_id,
            sort_order,
            now_stamp(),
        ),
    )?;
    Ok(())
}

pub fn delete_rule(conn: &Connection, rule_id: &str) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM assignment_rules WHERE id = ?", [rule_id])? > 0)
}

// ---- enrollments ----

fn enrollment_from_row(r: &Row<'_>) -> rusqlite::Result<EnrollmentRecord> {
    Ok(EnrollmentRecord {
        id: r.get(0)?,
        student_name: r.get(1)?,
        level: r.get(2)?,
        grade_level: r.get(3)?,
        department: r.get(4)?,
        strand: r.get(5)?,
        course_code: r.get(6)?,
        year_level: r.get(7)?,
        semester: r.get(8)?,
        school_year: r.get(9)?,
    })
}

pub fn list_enrollments(conn: &Connection) -> anyhow::Result<Vec<EnrollmentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_name, level, grade_level, department, strand, course_code,
                year_level, semester, school_year
         FROM enrollments
         ORDER BY student_name, id",
    )?;
    let rows = stmt
        .query_map([], enrollment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_enrollment(
    conn: &Connection,
    enrollment_id: &str,
) -> anyhow::Result<Option<EnrollmentRecord>> {
    Ok(conn
        .query_row(
            "SELECT id, student_name, level, grade_level, department, strand, course_code,
                    year_level, semester, school_year
             FROM enrollments
             WHERE id = ?",
            [enrollment_id],
            enrollment_from_row,
        )
        .optional()?)
}

pub fn upsert_enrollment(conn: &Connection, e: &EnrollmentRecord) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO enrollments(id, student_name, level, grade_level, department, strand,
                                 course_code, year_level, semester, school_year, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           student_name = excluded.student_name,
           level = excluded.level,
           grade_level = excluded.grade_level,
           department = excluded.department,
           strand = excluded.strand,
           course_code = excluded.course_code,
           year_level = excluded.year_level,
           semester = excluded.semester,
           school_year = excluded.school_year,
           updated_at = excluded.updated_at",
        (
            &e.id,
            &e.student_name,
            &e.level,
            &e.grade_level,
            &e.department,
            &e.strand,
            &e.course_code,
            &e.year_level,
            &e.semester,
            &e.school_year,
            now_stamp(),
        ),
    )?;
    Ok(())
}

pub fn delete_enrollment(conn: &Connection, enrollment_id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM grade_entries WHERE enrollment_id = ?",
        [enrollment_id],
    )?;
    let n = tx.execute("DELETE FROM enrollments WHERE id = ?", [enrollment_id])?;
    tx.commit()?;
    Ok(n > 0)
}

// ---- grade entries ----

fn period_from_value(v: Value) -> Option<f64> {
    match v {
        Value::Integer(n) => Some(n as f64),
        Value::Real(f) => f.is_finite().then_some(f),
        Value::Text(s) => coerce_period(&serde_json::Value::String(s)),
        Value::Null | Value::Blob(_) => None,
    }
}

/// Entries of one term's grade document, in the order they were written.
pub fn get_grade_entries(
    conn: &Connection,
    enrollment_id: &str,
    term: &str,
) -> anyhow::Result<Vec<GradeEntry>> {
    let mut stmt = conn.prepare(
        "SELECT subject_id, subject_name, subject_code, period1, period2, period3, period4,
                special_status
         FROM grade_entries
         WHERE enrollment_id = ? AND term = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map((enrollment_id, term), |r| {
            let status: Option<String> = r.get(7)?;
            Ok(GradeEntry {
                subject_id: r.get(0)?,
                subject_name: r.get(1)?,
                subject_code: r.get(2)?,
                period1: period_from_value(r.get(3)?),
                period2: period_from_value(r.get(4)?),
                period3: period_from_value(r.get(5)?),
                period4: period_from_value(r.get(6)?),
                special_status: status.as_deref().and_then(SpecialStatus::parse),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Replaces a term's grade document with `entries`, keeping their order.
pub fn replace_grade_entries(
    conn: &Connection,
    enrollment_id: &str,
    term: &str,
    entries: &[GradeEntry],
) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM grade_entries WHERE enrollment_id = ? AND term = ?",
        (enrollment_id, term),
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO grade_entries(enrollment_id, term, subject_id, sort_order, subject_name,
                                       subject_code, period1, period2, period3, period4,
                                       special_status)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for (i, e) in entries.iter().enumerate() {
            stmt.execute((
                enrollment_id,
                term,
                &e.subject_id,
                i as i64,
                &e.subject_name,
                &e.subject_code,
                e.period1,
                e.period2,
                e.period3,
                e.period4,
                e.special_status.map(SpecialStatus::code),
            ))?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn list_terms(conn: &Connection, enrollment_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT term FROM grade_entries WHERE enrollment_id = ? ORDER BY term",
    )?;
    let rows = stmt
        .query_map([enrollment_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
