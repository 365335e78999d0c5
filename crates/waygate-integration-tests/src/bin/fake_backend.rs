//! A minimal MCP backend used by the integration tests.
//!
//! Speaks newline-delimited JSON-RPC on stdio: answers `initialize`,
//! `tools/list` (one tool, `log`), `tools/call`, and `resources/list`.
//! Anything else gets a method-not-found error. A line of plain text
//! is printed at startup to exercise the gateway's non-JSON handling.

use std::io::{BufRead, Write};

use serde_json::{Value, json};

fn respond(out: &mut impl Write, id: &Value, result: Value) {
    let response = json!({"jsonrpc": "2.0", "id": id, "result": result});
    let _ = writeln!(out, "{response}");
    let _ = out.flush();
}

fn respond_error(out: &mut impl Write, id: &Value, code: i64, message: &str) {
    let response = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message}
    });
    let _ = writeln!(out, "{response}");
    let _ = out.flush();
}

fn main() {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    // Deliberately non-JSON: the gateway must discard this at debug.
    let _ = writeln!(out, "fake-backend starting up");
    let _ = out.flush();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            continue;
        };
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        if id.is_null() {
            // Notifications (notifications/initialized) need no reply.
            continue;
        }

        match method {
            "initialize" => respond(
                &mut out,
                &id,
                json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake-backend", "version": "0.1.0"}
                }),
            ),
            "tools/list" => respond(
                &mut out,
                &id,
                json!({
                    "tools": [{
                        "name": "log",
                        "description": "Echo the arguments back",
                        "inputSchema": {
                            "type": "object",
                            "properties": {"message": {"type": "string"}}
                        }
                    }]
                }),
            ),
            "tools/call" => {
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                let name = params.get("name").and_then(Value::as_str).unwrap_or("?");
                if name == "log" {
                    respond(
                        &mut out,
                        &id,
                        json!({
                            "content": [{
                                "type": "text",
                                "text": format!("logged: {}", params.get("arguments").cloned().unwrap_or(Value::Null))
                            }],
                            "isError": false
                        }),
                    );
                } else {
                    respond_error(&mut out, &id, -32602, "unknown tool");
                }
            },
            "resources/list" => respond(&mut out, &id, json!({"resources": []})),
            _ => respond_error(&mut out, &id, -32601, "method not found"),
        }
    }
}
