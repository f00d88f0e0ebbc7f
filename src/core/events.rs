//! 任务事件流：status / assistant / error，供 SSE 等前端增量渲染

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// 进度 / 标题更新
    Status,
    /// 最终（或中间）回复
    Assistant,
    /// 终止性错误，每个失败任务恰好一条
    Error,
}

/// 单条事件，带会话 id 与时间戳
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub session_id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
}

impl StreamEvent {
    fn new(kind: EventKind, session_id: &str, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            kind,
            message: message.into(),
        }
    }

    pub fn status(session_id: &str, message: impl Into<String>) -> Self {
        Self::new(EventKind::Status, session_id, message)
    }

    pub fn assistant(session_id: &str, message: impl Into<String>) -> Self {
        Self::new(EventKind::Assistant, session_id, message)
    }

    pub fn error(session_id: &str, message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, session_id, message)
    }

    /// 渲染为一条 SSE 记录：`data: {json}\n\n`
    pub fn to_sse(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {}\n\n", json)
    }

    pub fn from_sse(line: &str) -> Result<Self, String> {
        let json = line
            .strip_prefix("data: ")
            .ok_or_else(|| "Invalid streaming output format.".to_string())?;
        serde_json::from_str(json.trim()).map_err(|e| e.to_string())
    }
}
