//! 示例外部工具进程：按行读写 JSON-RPC 2.0（stdio）
//!
//! 提供两个工具：
//! - `get_local_time`：无参数，返回本地时间
//! - `echo`：原样返回 `text`
//!
//! 在配置中以 `[[hub.providers]] name = "local_time", command = "gensee-local-time"` 接入。

use chrono::Local;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn tool_list() -> Value {
    json!({
        "tools": [
            {
                "name": "get_local_time",
                "description": "Get the current local date and time.",
                "inputSchema": {"type": "object", "properties": {}}
            },
            {
                "name": "echo",
                "description": "Echo the given text back.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "text": {"type": "string", "description": "Text to echo."}
                    },
                    "required": ["text"]
                }
            }
        ]
    })
}

fn text_result(text: impl Into<String>, is_error: bool) -> Value {
    json!({
        "content": [{"type": "text", "text": text.into()}],
        "isError": is_error,
    })
}

fn call_tool(params: &Value) -> Value {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    match name {
        "get_local_time" => text_result(Local::now().format("%Y-%m-%d %H:%M:%S").to_string(), false),
        "echo" => match args.get("text").and_then(Value::as_str) {
            Some(text) => text_result(text, false),
            None => text_result("missing required argument 'text'", true),
        },
        other => text_result(format!("unknown tool '{}'", other), true),
    }
}

/// 通知（无 id）返回 None
fn handle(message: &Value) -> Option<Value> {
    let id = message.get("id")?.clone();
    let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = message.get("params").cloned().unwrap_or(Value::Null);
    let reply = match method {
        "initialize" => json!({
            "protocolVersion": params.get("protocolVersion").cloned().unwrap_or(json!("2025-06-18")),
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "gensee-local-time", "version": env!("CARGO_PKG_VERSION")}
        }),
        "ping" => json!({}),
        "tools/list" => tool_list(),
        "tools/call" => call_tool(&params),
        other => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("method '{}' not found", other)}
            }))
        }
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": reply}))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        let Ok(message) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };
        if let Some(reply) = handle(&message) {
            stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
