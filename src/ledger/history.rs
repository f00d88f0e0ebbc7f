//! 会话账本：按执行顺序追加的类型化条目
//!
//! 条目只追加不修改。写入 prompt_transcript 时同步镜像到 SessionStore（若配置），
//! 配置 dump_path 时每次追加后把完整历史写成 JSON 文件，便于排查。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{SessionStore, Transcript};
use crate::core::AgentError;
use crate::llm::Completion;
use crate::protocol::ToolInvocation;

/// 空账本时 title_of_latest 的占位
pub const NO_HISTORY: &str = "[No History]";

/// 条目类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    PromptTranscript,
    ModelResponse,
    ToolInvocation,
    ToolResult,
}

/// 条目内容；类型由内容决定，避免 kind 与 payload 不一致
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EntryPayload {
    Transcript(Transcript),
    Responses(Vec<Completion>),
    Invocation(ToolInvocation),
    ToolResult(String),
}

impl EntryPayload {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryPayload::Transcript(_) => EntryKind::PromptTranscript,
            EntryPayload::Responses(_) => EntryKind::ModelResponse,
            EntryPayload::Invocation(_) => EntryKind::ToolInvocation,
            EntryPayload::ToolResult(_) => EntryKind::ToolResult,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub kind: EntryKind,
    pub title: String,
    pub payload: EntryPayload,
}

/// 单个会话的账本
pub struct Ledger {
    session_id: String,
    entries: Vec<LedgerEntry>,
    store: Option<Arc<dyn SessionStore>>,
    dump_path: Option<PathBuf>,
}

impl Ledger {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: Vec::new(),
            store: None,
            dump_path: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 完整历史 dump：文件名追加创建时刻的时间戳，避免覆盖
    pub fn with_dump_path(mut self, path: impl AsRef<Path>) -> Self {
        self.dump_path = Some(timestamped_path(path.as_ref()));
        self
    }

    /// 从存储恢复：有快照则以其作为第一条 prompt_transcript（不再回写）
    pub async fn resume(mut self) -> Result<Self, AgentError> {
        let Some(store) = self.store.clone() else {
            return Ok(self);
        };
        if let Some(transcript) = store.load(&self.session_id).await? {
            tracing::info!(session = %self.session_id, turns = transcript.len(), "resumed session snapshot");
            self.entries.push(LedgerEntry {
                kind: EntryKind::PromptTranscript,
                title: "Resumed session".to_string(),
                payload: EntryPayload::Transcript(transcript),
            });
        }
        Ok(self)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dump_path(&self) -> Option<&Path> {
        self.dump_path.as_deref()
    }

    /// 追加条目；存储失败直接返回错误，调用方视为该步未完成
    pub async fn append(
        &mut self,
        title: impl Into<String>,
        payload: EntryPayload,
    ) -> Result<(), AgentError> {
        if let (Some(store), EntryPayload::Transcript(transcript)) = (&self.store, &payload) {
            store.save(&self.session_id, transcript).await?;
        }
        let entry = LedgerEntry {
            kind: payload.kind(),
            title: title.into(),
            payload,
        };
        tracing::debug!(session = %self.session_id, kind = ?entry.kind, title = %entry.title, "ledger append");
        self.entries.push(entry);
        self.dump().await
    }

    /// 只写存储、不入账本的快照（任务正常结束时带上最终回复）
    pub async fn mirror(&self, transcript: &Transcript) -> Result<(), AgentError> {
        match &self.store {
            Some(store) => store.save(&self.session_id, transcript).await,
            None => Ok(()),
        }
    }

    pub fn latest(&self, kind: EntryKind) -> Option<&LedgerEntry> {
        self.entries.iter().rev().find(|e| e.kind == kind)
    }

    pub fn latest_transcript(&self) -> Option<&Transcript> {
        match self.latest(EntryKind::PromptTranscript).map(|e| &e.payload) {
            Some(EntryPayload::Transcript(t)) => Some(t),
            _ => None,
        }
    }

    pub fn latest_responses(&self) -> Option<&[Completion]> {
        match self.latest(EntryKind::ModelResponse).map(|e| &e.payload) {
            Some(EntryPayload::Responses(r)) => Some(r),
            _ => None,
        }
    }

    pub fn latest_invocation(&self) -> Option<&ToolInvocation> {
        match self.latest(EntryKind::ToolInvocation).map(|e| &e.payload) {
            Some(EntryPayload::Invocation(inv)) => Some(inv),
            _ => None,
        }
    }

    pub fn latest_tool_result(&self) -> Option<&str> {
        match self.latest(EntryKind::ToolResult).map(|e| &e.payload) {
            Some(EntryPayload::ToolResult(r)) => Some(r),
            _ => None,
        }
    }

    pub fn title_of_latest(&self) -> &str {
        self.entries
            .last()
            .map(|e| e.title.as_str())
            .unwrap_or(NO_HISTORY)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn kinds(&self) -> Vec<EntryKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    async fn dump(&self) -> Result<(), AgentError> {
        let Some(path) = &self.dump_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// history.json -> history_20250101-120000.json
fn timestamped_path(path: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "history".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, stamp),
    };
    path.with_file_name(name)
}
