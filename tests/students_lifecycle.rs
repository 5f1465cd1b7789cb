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
    let exe = env!("CARGO_BIN_EXE_writequestd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn writequestd");
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

const CODE_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[test]
fn new_student_starts_with_a_code_and_an_empty_ledger() {
    let workspace = temp_dir("writequest-student-create");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "Writing 3-2" }),
    );
    let class_id = class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "classId": class_id, "name": "지민" }),
    );
    assert_eq!(created.get("name").and_then(|v| v.as_str()), Some("지민"));
    assert_eq!(created.get("totalPoints").and_then(|v| v.as_i64()), Some(0));

    let login_code = created
        .get("loginCode")
        .and_then(|v| v.as_str())
        .expect("loginCode");
    assert_eq!(login_code.len(), 8);
    assert!(login_code.chars().all(|c| CODE_ALPHABET.contains(c)));

    let student_id = created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let history = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "points.history",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        history
            .get("entries")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
}

#[test]
fn create_rejects_blank_name_and_unknown_class() {
    let workspace = temp_dir("writequest-student-create-invalid");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "Writing 3-2" }),
    );
    let class_id = class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();

    let resp = request(
        &mut stdin,
        &mut reader,
        "blank",
        "students.create",
        json!({ "classId": class_id, "name": "   " }),
    );
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "no-class",
        "students.create",
        json!({ "classId": "missing", "name": "지민" }),
    );
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_found")
    );
}

#[test]
fn roster_lists_students_by_name() {
    let workspace = temp_dir("writequest-student-roster");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "Writing 3-2" }),
    );
    let class_id = class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();

    for (i, name) in ["나윤", "가온", "다은"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({ "classId": class_id, "name": name }),
        );
    }

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "students.list",
        json!({ "classId": class_id }),
    );
    let names: Vec<&str> = roster
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students")
        .iter()
        .map(|s| s.get("name").and_then(|v| v.as_str()).expect("name"))
        .collect();
    assert_eq!(names, vec!["가온", "나윤", "다은"]);
}

#[test]
fn deleting_a_student_removes_the_whole_ledger() {
    let workspace = temp_dir("writequest-student-delete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "Writing 3-2" }),
    );
    let class_id = class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "classId": class_id, "name": "지민" }),
    );
    let student_id = created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "give",
        "points.adjust",
        json!({ "studentIds": [student_id], "amount": 15, "reason": "참여 우수" }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "delete",
        "students.delete",
        json!({ "studentId": student_id }),
    );

    // History resolves through the student, so it is gone with them.
    let resp = request(
        &mut stdin,
        &mut reader,
        "history-after",
        "points.history",
        json!({ "studentId": student_id }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_found")
    );

    // No orphan rows left behind: the class audit sees nothing to check.
    let audit = request_ok(
        &mut stdin,
        &mut reader,
        "audit",
        "points.audit",
        json!({ "classId": class_id }),
    );
    assert_eq!(audit.get("checked").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(
        audit
            .get("drift")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "delete-again",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_found")
    );
}
