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

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value.pointer("/error/code").and_then(|v| v.as_str())
}

#[test]
fn setup_defaults_roundtrip_and_validation() {
    let workspace = temp_dir("registrar-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let before = request(&mut stdin, &mut reader, "0", "setup.get", json!({}));
    assert_eq!(error_code(&before), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let initial = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(
        initial.pointer("/registrar/schoolName").and_then(|v| v.as_str()),
        Some("")
    );
    assert_eq!(
        initial
            .pointer("/assignment/defaultToAssignedSet")
            .and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(
        initial
            .pointer("/transcript/unknownSubjectLabel")
            .and_then(|v| v.as_str()),
        Some("Unknown Subject")
    );
    assert_eq!(
        initial
            .pointer("/transcript/includeSummary")
            .and_then(|v| v.as_bool()),
        Some(true)
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({
            "section": "registrar",
            "patch": { "schoolName": "  Holy Cross College  ", "defaultTerm": "first-sem" }
        }),
    );
    assert_eq!(
        updated.pointer("/value/schoolName").and_then(|v| v.as_str()),
        Some("Holy Cross College")
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "transcript", "patch": { "includeSummary": false } }),
    );

    let after = request_ok(&mut stdin, &mut reader, "5", "setup.get", json!({}));
    assert_eq!(
        after.pointer("/registrar/defaultTerm").and_then(|v| v.as_str()),
        Some("first-sem")
    );
    assert_eq!(
        after.pointer("/registrar/schoolYear").and_then(|v| v.as_str()),
        Some("")
    );
    assert_eq!(
        after
            .pointer("/transcript/includeSummary")
            .and_then(|v| v.as_bool()),
        Some(false)
    );

    let built = request_ok(
        &mut stdin,
        &mut reader,
        "5b",
        "transcript.build",
        json!({ "entries": [{ "subjectId": "x", "period1": 90 }] }),
    );
    // Inline builds do not read workspace settings.
    assert!(built.get("summary").is_some_and(|v| v.is_object()));

    for (i, (section, patch)) in [
        ("registrar", json!({ "schoolName": "x".repeat(121) })),
        ("registrar", json!({ "motto": "Veritas" })),
        ("assignment", json!({ "defaultToAssignedSet": "yes" })),
        ("transcript", json!({ "unknownSubjectLabel": "   " })),
        ("grading", json!({})),
    ]
    .into_iter()
    .enumerate()
    {
        let rejected = request(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "setup.update",
            json!({ "section": section, "patch": patch }),
        );
        assert_eq!(error_code(&rejected), Some("bad_params"), "{} {}", section, patch);
    }

    let unchanged = request_ok(&mut stdin, &mut reader, "6", "setup.get", json!({}));
    assert_eq!(
        unchanged
            .pointer("/registrar/schoolName")
            .and_then(|v| v.as_str()),
        Some("Holy Cross College")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn setup_survives_reopening_the_workspace() {
    let workspace = temp_dir("registrar-setup-reopen");
    {
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
            json!({ "section": "assignment", "patch": { "defaultToAssignedSet": false } }),
        );
        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(
        setup
            .pointer("/assignment/defaultToAssignedSet")
            .and_then(|v| v.as_bool()),
        Some(false)
    );

    // A hand-edited settings row that no longer validates falls back to defaults.
    {
        let conn =
            rusqlite::Connection::open(workspace.join("registrar.sqlite3")).expect("open db");
        conn.execute(
            "UPDATE settings SET value_json = ? WHERE key = 'setup.assignment'",
            ["{\"defaultToAssignedSet\":\"sometimes\"}"],
        )
        .expect("corrupt setting");
    }
    let fallback = request_ok(&mut stdin, &mut reader, "3", "setup.get", json!({}));
    assert_eq!(
        fallback
            .pointer("/assignment/defaultToAssignedSet")
            .and_then(|v| v.as_bool()),
        Some(true)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
