use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}


fn row<'a>(rows: &'a serde_json::Value, subject_id: &str) -> &'a serde_json::Value {
    rows.as_array()
        .expect("rows")
        .iter()
        .find(|r| r.get("subjectId").and_then(|v| v.as_str()) == Some(subject_id))
        .expect("row for subject")
}

#[test]
fn inline_transcript_labels_and_summary() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let built = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "transcript.build",
        json!({
            "isCollege": true,
            "entries": {
                "prog2": { "period1": 95, "period2": 85, "period3": 90 },
                "pe": { "period1": 99, "specialStatus": "W" },
                "ghost": { "period1": "abc", "subjectName": "Legacy Elective" },
                "nstp": { "period1": 70, "period2": "72", "period3": 71, "period4": 100 }
            },
            "subjects": [
                { "id": "prog2", "code": "IT102", "name": "Programming 2", "lectureUnits": 2, "labUnits": 1 },
                { "id": "pe", "code": "PE2", "name": "Physical Education 2", "lectureUnits": 2 },
                { "id": "nstp", "code": "NSTP1", "name": "NSTP 1", "lectureUnits": 3 }
            ]
        }),
    );
    let rows = built.get("rows").expect("rows");
    let order: Vec<&str> = rows
        .as_array()
        .expect("rows")
        .iter()
        .filter_map(|r| r.get("subjectId").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(order, vec!["prog2", "pe", "ghost", "nstp"]);

    let prog2 = row(rows, "prog2");
    assert_eq!(prog2.get("average").and_then(|v| v.as_f64()), Some(90.0));
    assert_eq!(prog2.get("numericGrade").and_then(|v| v.as_f64()), Some(1.75));
    assert_eq!(prog2.get("remarks").and_then(|v| v.as_str()), Some("Very Good"));
    assert_eq!(prog2.get("subjectCode").and_then(|v| v.as_str()), Some("IT102"));
    assert_eq!(prog2.get("units").and_then(|v| v.as_u64()), Some(3));

    let pe = row(rows, "pe");
    assert!(pe.get("average").is_some_and(|v| v.is_null()));
    assert_eq!(pe.get("specialStatus").and_then(|v| v.as_str()), Some("W"));
    assert_eq!(pe.get("remarks").and_then(|v| v.as_str()), Some("Withdrawn"));

    let ghost = row(rows, "ghost");
    assert_eq!(
        ghost.get("subjectName").and_then(|v| v.as_str()),
        Some("Legacy Elective")
    );
    assert_eq!(ghost.get("subjectCode").and_then(|v| v.as_str()), Some(""));
    assert!(ghost.get("average").is_some_and(|v| v.is_null()));
    assert!(ghost.get("specialStatus").is_some_and(|v| v.is_null()));
    assert_eq!(ghost.get("remarks").and_then(|v| v.as_str()), Some("Incomplete"));

    // period4 does not count for college terms.
    let nstp = row(rows, "nstp");
    assert_eq!(nstp.get("average").and_then(|v| v.as_f64()), Some(71.0));
    assert!(nstp.get("period4").is_some_and(|v| v.is_null()));
    assert_eq!(nstp.get("numericGrade").and_then(|v| v.as_f64()), Some(5.0));
    assert_eq!(nstp.get("remarks").and_then(|v| v.as_str()), Some("Failed"));

    let summary = built.get("summary").expect("summary");
    assert_eq!(
        summary.get("generalAverage").and_then(|v| v.as_f64()),
        Some(80.5)
    );
    // (1.75*3 + 5.00*3) / 6
    assert_eq!(
        summary.get("gradePointAverage").and_then(|v| v.as_f64()),
        Some(3.38)
    );
    assert_eq!(summary.get("totalUnits").and_then(|v| v.as_u64()), Some(8));
    assert_eq!(
        summary.get("specialStatusCount").and_then(|v| v.as_u64()),
        Some(1)
    );

    let secondary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "transcript.build",
        json!({
            "entries": [
                { "subjectId": "eng", "period1": 80, "period2": null, "period3": 75, "period4": 85 }
            ],
            "includeSummary": false
        }),
    );
    let eng = row(secondary.get("rows").expect("rows"), "eng");
    assert_eq!(eng.get("average").and_then(|v| v.as_f64()), Some(80.0));
    assert_eq!(eng.get("remarks").and_then(|v| v.as_str()), Some("Fair"));
    assert!(eng.get("numericGrade").is_some_and(|v| v.is_null()));
    assert_eq!(
        eng.get("subjectName").and_then(|v| v.as_str()),
        Some("Unknown Subject")
    );
    assert!(secondary.get("summary").is_some_and(|v| v.is_null()));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workspace_transcript_uses_stored_grades_and_registrar_header() {
    let workspace = temp_dir("registrar-transcript-ws");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "registrar", "patch": { "schoolName": "San Isidro Academy", "schoolYear": "2025-2026" } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "transcript", "patch": { "unknownSubjectLabel": "(removed subject)" } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.upsert",
        json!({ "subject": { "id": "fil8", "code": "FIL8", "name": "Filipino 8", "lectureUnits": 1 } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "enrollments.upsert",
        json!({ "enrollment": {
            "id": "e-jhs",
            "studentName": "Santos, Maria",
            "level": "high-school",
            "gradeLevel": 8
        } }),
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grades.update",
        json!({
            "enrollmentId": "e-jhs",
            "term": "Q2",
            "entries": {
                "fil8": { "period1": 88, "period2": 92, "period3": 90, "period4": 86 },
                "dropped": { "period1": 91 },
                "math8": { "period1": 78, "specialStatus": "INC" }
            }
        }),
    );
    assert_eq!(saved.get("count").and_then(|v| v.as_u64()), Some(3));

    let built = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "transcript.build",
        json!({ "enrollmentId": "e-jhs", "term": "Q2" }),
    );
    assert_eq!(
        built.pointer("/header/schoolName").and_then(|v| v.as_str()),
        Some("San Isidro Academy")
    );
    assert_eq!(
        built.pointer("/header/schoolYear").and_then(|v| v.as_str()),
        Some("2025-2026")
    );
    assert_eq!(
        built.pointer("/header/studentName").and_then(|v| v.as_str()),
        Some("Santos, Maria")
    );
    assert_eq!(
        built
            .pointer("/header/descriptor/department")
            .and_then(|v| v.as_str()),
        Some("JHS")
    );
    assert_eq!(built.get("isCollege").and_then(|v| v.as_bool()), Some(false));

    let rows = built.get("rows").and_then(|v| v.as_array()).expect("rows");
    let ids: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.get("subjectId").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(ids, vec!["fil8", "dropped", "math8"]);
    assert_eq!(rows[0].get("average").and_then(|v| v.as_f64()), Some(89.0));
    assert_eq!(rows[0].get("remarks").and_then(|v| v.as_str()), Some("Very Good"));
    assert_eq!(
        rows[1].get("subjectName").and_then(|v| v.as_str()),
        Some("(removed subject)")
    );
    assert_eq!(rows[2].get("remarks").and_then(|v| v.as_str()), Some("Incomplete"));
    assert_eq!(rows[2].get("specialStatus").and_then(|v| v.as_str()), Some("INC"));
    assert_eq!(
        built.pointer("/summary/generalAverage").and_then(|v| v.as_f64()),
        Some(90.0)
    );

    let empty_term = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "transcript.build",
        json!({ "enrollmentId": "e-jhs", "term": "Q4" }),
    );
    assert_eq!(
        empty_term.get("rows").and_then(|v| v.as_array()).map(Vec::len),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
