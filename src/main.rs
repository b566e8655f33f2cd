mod data;
mod db;
mod gate;
mod ipc;
mod store;

use std::io::{self, BufRead, Write};

use serde_json::json;

fn main() {
    let mut state = ipc::AppState::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // The request id is unknown here, so the envelope carries none.
            Err(e) => json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() }
            }),
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
