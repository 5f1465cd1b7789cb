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

#[test]
fn adjustment_sequence_keeps_balance_equal_to_ledger_sum() {
    let workspace = temp_dir("writequest-ledger-invariant");
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

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "give",
        "points.adjust",
        json!({ "studentIds": [student_id], "amount": 15, "reason": "참여 우수" }),
    );
    assert_eq!(
        first.get("results").and_then(|v| v.as_array()).unwrap()[0]
            .get("newBalance")
            .and_then(|v| v.as_i64()),
        Some(15)
    );

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "take",
        "points.adjust",
        json!({ "studentIds": [student_id], "amount": -5, "reason": "지각" }),
    );
    assert_eq!(
        second.get("results").and_then(|v| v.as_array()).unwrap()[0]
            .get("newBalance")
            .and_then(|v| v.as_i64()),
        Some(10)
    );

    let balance = request_ok(
        &mut stdin,
        &mut reader,
        "balance",
        "points.balance",
        json!({ "studentId": student_id }),
    );
    assert_eq!(balance.get("balance").and_then(|v| v.as_i64()), Some(10));
    assert_eq!(balance.get("ledgerTotal").and_then(|v| v.as_i64()), Some(10));

    // History is newest first: the deduction precedes the award.
    let history = request_ok(
        &mut stdin,
        &mut reader,
        "history",
        "points.history",
        json!({ "studentId": student_id }),
    );
    let entries = history
        .get("entries")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].get("amount").and_then(|v| v.as_i64()), Some(-5));
    assert_eq!(
        entries[0].get("reason").and_then(|v| v.as_str()),
        Some("지각")
    );
    assert_eq!(entries[1].get("amount").and_then(|v| v.as_i64()), Some(15));
    assert_eq!(
        entries[1].get("reason").and_then(|v| v.as_str()),
        Some("참여 우수")
    );
    for entry in &entries {
        assert!(entry.get("createdAt").and_then(|v| v.as_str()).is_some());
        assert!(entry.get("id").and_then(|v| v.as_str()).is_some());
    }

    // The class-wide audit agrees: stored balances match ledger sums.
    let audit = request_ok(
        &mut stdin,
        &mut reader,
        "audit",
        "points.audit",
        json!({ "classId": class_id }),
    );
    assert_eq!(audit.get("checked").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        audit
            .get("drift")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
}

#[test]
fn reads_are_repeatable_without_intervening_writes() {
    let workspace = temp_dir("writequest-ledger-reads");
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
        json!({ "studentIds": [student_id], "amount": 7, "reason": "글똥누기" }),
    );

    let balance_a = request_ok(
        &mut stdin,
        &mut reader,
        "balance-a",
        "points.balance",
        json!({ "studentId": student_id }),
    );
    let balance_b = request_ok(
        &mut stdin,
        &mut reader,
        "balance-b",
        "points.balance",
        json!({ "studentId": student_id }),
    );
    assert_eq!(balance_a, balance_b);

    let history_a = request_ok(
        &mut stdin,
        &mut reader,
        "history-a",
        "points.history",
        json!({ "studentId": student_id }),
    );
    let history_b = request_ok(
        &mut stdin,
        &mut reader,
        "history-b",
        "points.history",
        json!({ "studentId": student_id }),
    );
    assert_eq!(history_a, history_b);
}

#[test]
fn balance_and_history_of_unknown_student_are_not_found() {
    let workspace = temp_dir("writequest-ledger-unknown");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for (id, method) in [("b", "points.balance"), ("h", "points.history")] {
        let resp = request(
            &mut stdin,
            &mut reader,
            id,
            method,
            json!({ "studentId": "missing" }),
        );
        assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
        assert_eq!(
            resp.get("error")
                .and_then(|e| e.get("code"))
                .and_then(|v| v.as_str()),
            Some("not_found")
        );
    }
}
