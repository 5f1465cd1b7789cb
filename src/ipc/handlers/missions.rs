use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

// Form defaults carried over from the teacher-facing mission editor.
const DEFAULT_MIN_CHARS: i64 = 100;
const DEFAULT_MIN_PARAGRAPHS: i64 = 2;
const DEFAULT_BASE_REWARD: i64 = 100;
const DEFAULT_BONUS_THRESHOLD: i64 = 100;
const DEFAULT_BONUS_REWARD: i64 = 10;

fn non_negative_param(
    req: &Request,
    key: &str,
    default: i64,
) -> Result<i64, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(default),
        Some(v) => match v.as_i64() {
            Some(n) if n >= 0 => Ok(n),
            _ => Err(err(
                &req.id,
                "bad_params",
                format!("{} must be a non-negative integer", key),
                None,
            )),
        },
    }
}

fn handle_missions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, title, guide, genre, min_chars, min_paragraphs,
                base_reward, bonus_threshold, bonus_reward, created_at
         FROM writing_missions
         WHERE class_id = ?
         ORDER BY created_at DESC, rowid DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let guide: String = row.get(2)?;
            let genre: String = row.get(3)?;
            let min_chars: i64 = row.get(4)?;
            let min_paragraphs: i64 = row.get(5)?;
            let base_reward: i64 = row.get(6)?;
            let bonus_threshold: i64 = row.get(7)?;
            let bonus_reward: i64 = row.get(8)?;
            let created_at: String = row.get(9)?;
            Ok(json!({
                "id": id,
                "title": title,
                "guide": guide,
                "genre": genre,
                "minChars": min_chars,
                "minParagraphs": min_paragraphs,
                "baseReward": base_reward,
                "bonusThreshold": bonus_threshold,
                "bonusReward": bonus_reward,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(missions) => ok(&req.id, json!({ "missions": missions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_missions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let title = match req.params.get("title").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing title", None),
    };
    let guide = match req.params.get("guide").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing guide", None),
    };
    if title.is_empty() || guide.is_empty() {
        return err(&req.id, "bad_params", "title/guide must not be empty", None);
    }
    let genre = match req.params.get("genre").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing genre", None),
    };

    let min_chars = match non_negative_param(req, "minChars", DEFAULT_MIN_CHARS) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let min_paragraphs = match non_negative_param(req, "minParagraphs", DEFAULT_MIN_PARAGRAPHS) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let base_reward = match non_negative_param(req, "baseReward", DEFAULT_BASE_REWARD) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let bonus_threshold = match non_negative_param(req, "bonusThreshold", DEFAULT_BONUS_THRESHOLD) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let bonus_reward = match non_negative_param(req, "bonusReward", DEFAULT_BONUS_REWARD) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let class_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if class_exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let mission_id = Uuid::new_v4().to_string();
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO writing_missions(
           id, class_id, title, guide, genre,
           min_chars, min_paragraphs, base_reward, bonus_threshold, bonus_reward,
           created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &mission_id,
            &class_id,
            &title,
            &guide,
            &genre,
            min_chars,
            min_paragraphs,
            base_reward,
            bonus_threshold,
            bonus_reward,
            &now,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "writing_missions" })),
        );
    }

    ok(
        &req.id,
        json!({
            "missionId": mission_id,
            "classId": class_id,
            "title": title,
            "genre": genre
        }),
    )
}

fn handle_missions_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mission_id = match req.params.get("missionId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing missionId", None),
    };

    let deleted = match conn.execute("DELETE FROM writing_missions WHERE id = ?", [&mission_id]) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "writing_missions" })),
            )
        }
    };
    if deleted == 0 {
        return err(&req.id, "not_found", "mission not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "missions.list" => Some(handle_missions_list(state, req)),
        "missions.create" => Some(handle_missions_create(state, req)),
        "missions.delete" => Some(handle_missions_delete(state, req)),
        _ => None,
    }
}
