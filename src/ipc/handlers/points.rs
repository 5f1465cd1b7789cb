use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_points_adjust(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(ids_arr) = req.params.get("studentIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing studentIds[]", None);
    };
    let mut targets: Vec<String> = Vec::with_capacity(ids_arr.len());
    for (i, v) in ids_arr.iter().enumerate() {
        match v.as_str() {
            Some(s) => targets.push(s.to_string()),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("studentIds[{}] must be a string", i),
                    None,
                )
            }
        }
    }

    let amount = match req.params.get("amount").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid amount", None),
    };
    let reason = match req.params.get("reason").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing reason", None),
    };

    let outcomes = match ledger::adjust_many(conn, &targets, amount, &reason) {
        Ok(v) => v,
        // Validation failures reject the whole batch with no store writes.
        Err(e) => return err(&req.id, e.code(), e.message(), None),
    };

    let mut updated: usize = 0;
    let mut results: Vec<serde_json::Value> = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome.result {
            Ok(applied) => {
                updated += 1;
                results.push(json!({
                    "studentId": outcome.student_id,
                    "ok": true,
                    "newBalance": applied.new_balance,
                    "logId": applied.log_id
                }));
            }
            Err(e) => results.push(json!({
                "studentId": outcome.student_id,
                "ok": false,
                "code": e.code(),
                "message": e.message()
            })),
        }
    }

    let rejected = results.len() - updated;
    ok(
        &req.id,
        json!({
            "updated": updated,
            "rejected": rejected,
            "results": results
        }),
    )
}

fn handle_points_balance(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    let balance = match ledger::stored_balance(conn, &student_id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // Ledger total rides along so callers can reconcile against the log
    // instead of trusting a possibly stale local copy.
    let ledger_total = match ledger::ledger_total(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "balance": balance,
            "ledgerTotal": ledger_total
        }),
    )
}

fn handle_points_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    // Newest first; rowid breaks ties for entries within the same second.
    let mut stmt = match conn.prepare(
        "SELECT id, amount, reason, created_at
         FROM point_logs
         WHERE student_id = ?
         ORDER BY created_at DESC, rowid DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&student_id], |row| {
            let id: String = row.get(0)?;
            let amount: i64 = row.get(1)?;
            let reason: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(json!({
                "id": id,
                "amount": amount,
                "reason": reason,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_points_audit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let (checked, drift) = match ledger::audit_class(conn, &class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let drift_rows: Vec<serde_json::Value> = drift
        .iter()
        .map(|d| {
            json!({
                "studentId": d.student_id,
                "name": d.name,
                "balance": d.balance,
                "ledgerTotal": d.ledger_total
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "checked": checked,
            "drift": drift_rows
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "points.adjust" => Some(handle_points_adjust(state, req)),
        "points.balance" => Some(handle_points_balance(state, req)),
        "points.history" => Some(handle_points_history(state, req)),
        "points.audit" => Some(handle_points_audit(state, req)),
        _ => None,
    }
}
