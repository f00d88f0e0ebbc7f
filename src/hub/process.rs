//! 单个 stdio 工具进程：JSON-RPC 2.0，换行分隔
//!
//! 连接流程：spawn -> initialize -> notifications/initialized -> tools/list。
//! 读循环只持有 Weak 引用，句柄全部释放后子进程随 kill_on_drop 一并结束；
//! 显式 shutdown 则先 kill 再 wait，并让所有未完成请求失败返回。

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, warn};

use super::{HubError, ProviderSpec};

const PROTOCOL_VERSION: &str = "2025-06-18";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// tools/list 中的一项
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

type Responder = oneshot::Sender<Result<Value, HubError>>;

#[derive(Clone)]
pub struct ProviderProcess {
    inner: Arc<ProcessInner>,
}

struct ProcessInner {
    spec: ProviderSpec,
    child: AsyncMutex<Option<Child>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: AsyncMutex<HashMap<String, Responder>>,
    id_counter: AtomicU64,
    tools: AsyncMutex<Vec<RemoteToolInfo>>,
}

impl ProviderProcess {
    /// 启动进程并完成握手与工具列表拉取
    pub async fn spawn(spec: ProviderSpec) -> Result<Self, HubError> {
        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| HubError::Spawn {
            provider: spec.name.clone(),
            source,
        })?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        let inner = Arc::new(ProcessInner {
            spec,
            child: AsyncMutex::new(Some(child)),
            writer: AsyncMutex::new(None),
            pending: AsyncMutex::new(HashMap::new()),
            id_counter: AtomicU64::new(1),
            tools: AsyncMutex::new(Vec::new()),
        });

        let (stdin, stdout) = match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                inner.reset().await;
                return Err(inner.transport_error("failed to capture provider stdio"));
            }
        };
        *inner.writer.lock().await = Some(BufWriter::new(stdin));

        let weak = Arc::downgrade(&inner);
        let provider = inner.spec.name.clone();
        tokio::spawn(reader_loop(weak, stdout, provider));

        if let Err(err) = inner.initialize_sequence().await {
            inner.reset().await;
            return Err(err);
        }
        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn spec(&self) -> &ProviderSpec {
        &self.inner.spec
    }

    pub async fn tools(&self) -> Vec<RemoteToolInfo> {
        self.inner.tools.lock().await.clone()
    }

    /// tools/call，返回 JSON-RPC result 部分
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, HubError> {
        if self.inner.writer.lock().await.is_none() {
            return Err(HubError::Terminated {
                provider: self.inner.spec.name.clone(),
            });
        }
        let params = json!({
            "name": tool,
            "arguments": Value::Object(arguments),
        });
        self.inner.send_request("tools/call", params).await
    }

    pub async fn shutdown(&self) {
        debug!(provider = %self.inner.spec.name, "shutting down tool provider");
        self.inner.reset().await;
    }
}

async fn reader_loop(weak: Weak<ProcessInner>, stdout: ChildStdout, provider: String) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(raw)) = lines.next_line().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                if let Err(err) = inner.process_inbound_message(value).await {
                    warn!(provider = %provider, %err, "failed to process message from provider");
                }
            }
            Err(source) => {
                warn!(provider = %provider, line = trimmed, %source, "received invalid JSON from provider");
            }
        }
    }

    debug!(provider = %provider, "provider stdout closed");
    if let Some(inner) = weak.upgrade() {
        inner.reset().await;
    }
}

impl ProcessInner {
    async fn initialize_sequence(&self) -> Result<(), HubError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        self.send_request("initialize", params).await?;
        self.send_notification("notifications/initialized", json!({}))
            .await?;

        let listed = self.send_request("tools/list", json!({})).await?;
        let tools = parse_tool_list(&listed);
        tracing::info!(
            provider = %self.spec.name,
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "connected to tool provider"
        );
        *self.tools.lock().await = tools;
        Ok(())
    }

    async fn process_inbound_message(&self, value: Value) -> Result<(), HubError> {
        match (value.get("id").cloned(), value.get("method").is_some()) {
            (Some(id), true) => self.handle_server_request(id, &value).await,
            (Some(id), false) => {
                self.handle_response(id, value).await;
                Ok(())
            }
            (None, true) => {
                let method = value
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                debug!(
                    provider = %self.spec.name,
                    method,
                    "received notification from provider"
                );
                Ok(())
            }
            (None, false) => Ok(()),
        }
    }

    async fn handle_response(&self, id: Value, value: Value) {
        let Some(key) = response_key(&id) else {
            return;
        };
        let Some(sender) = self.pending.lock().await.remove(&key) else {
            debug!(provider = %self.spec.name, response_id = key, "received response for unknown request");
            return;
        };

        let outcome = match value.get("error") {
            Some(error) => Err(HubError::Rpc {
                provider: self.spec.name.clone(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = sender.send(outcome);
    }

    async fn handle_server_request(&self, id: Value, value: &Value) -> Result<(), HubError> {
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if method == "ping" {
            return self
                .write_message(&json!({ "jsonrpc": "2.0", "id": id, "result": {} }))
                .await;
        }
        warn!(provider = %self.spec.name, method, "provider sent unsupported request");
        self.write_message(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": -32601,
                "message": format!("client does not implement method '{method}'"),
            }
        }))
        .await
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, HubError> {
        let id = format!("req-{}", self.id_counter.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        if let Err(err) = self.write_message(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(HubError::Cancelled {
                provider: self.spec.name.clone(),
            }),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(HubError::Timeout {
                    provider: self.spec.name.clone(),
                    method: method.to_string(),
                })
            }
        }
    }

    async fn send_notification(&self, method: &str, params: Value) -> Result<(), HubError> {
        self.write_message(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        }))
        .await
    }

    async fn write_message(&self, message: &Value) -> Result<(), HubError> {
        let encoded = serde_json::to_string(message).map_err(|source| HubError::InvalidJson {
            provider: self.spec.name.clone(),
            source,
        })?;

        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| HubError::Terminated {
                provider: self.spec.name.clone(),
            })?;
        let io = async {
            stream.write_all(encoded.as_bytes()).await?;
            stream.write_all(b"\n").await?;
            stream.flush().await
        };
        io.await
            .map_err(|source| self.transport_error(source.to_string()))
    }

    async fn reset(&self) {
        self.writer.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                debug!(provider = %self.spec.name, %err, "failed to kill provider process (may have already exited)");
            }
            let _ = child.wait().await;
        }

        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(HubError::Terminated {
                provider: self.spec.name.clone(),
            }));
        }
    }

    fn transport_error(&self, message: impl Into<String>) -> HubError {
        HubError::Transport {
            provider: self.spec.name.clone(),
            message: message.into(),
        }
    }
}

fn parse_tool_list(result: &Value) -> Vec<RemoteToolInfo> {
    result
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| {
                    let name = tool.get("name").and_then(Value::as_str)?;
                    Some(RemoteToolInfo {
                        name: name.to_string(),
                        description: tool
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        input_schema: tool.get("inputSchema").cloned(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn response_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}
