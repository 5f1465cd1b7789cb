mod backup;
mod codes;
mod db;
mod ipc;
mod ledger;

use std::io::{self, BufRead, Write};

fn main() {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        // Parse to a Value first so a malformed request can still be answered
        // under its id when one is present.
        let parsed: Result<serde_json::Value, _> = serde_json::from_str(&line);
        let resp = match parsed {
            Ok(value) => {
                let id = value
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                match serde_json::from_value::<ipc::Request>(value) {
                    Ok(req) => ipc::handle_request(&mut state, req),
                    Err(e) => serde_json::json!({
                        "id": id,
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    }),
                }
            }
            Err(e) => serde_json::json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() }
            }),
        };

        let _ = writeln!(
            out,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = out.flush();
    }
}
