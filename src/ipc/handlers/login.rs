use crate::codes;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_login_by_code(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let raw = match req.params.get("code").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing code", None),
    };
    // Codes are issued uppercase; accept however the student typed it.
    let code = raw.to_uppercase();
    if code.chars().count() != codes::LOGIN_CODE_LEN {
        return err(
            &req.id,
            "bad_params",
            format!("code must be {} characters", codes::LOGIN_CODE_LEN),
            None,
        );
    }

    // Lookup is global: the code alone identifies the student.
    let row = conn
        .query_row(
            "SELECT s.id, s.name, s.total_points, s.login_code, c.id, c.name
             FROM students s
             JOIN classes c ON c.id = s.class_id
             WHERE s.login_code = ?",
            [&code],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                ))
            },
        )
        .optional();

    match row {
        Ok(Some((student_id, name, total_points, login_code, class_id, class_name))) => ok(
            &req.id,
            json!({
                "studentId": student_id,
                "name": name,
                "totalPoints": total_points,
                "loginCode": login_code,
                "classId": class_id,
                "className": class_name
            }),
        ),
        Ok(None) => err(&req.id, "not_found", "no student with that code", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "login.byCode" => Some(handle_login_by_code(state, req)),
        _ => None,
    }
}
