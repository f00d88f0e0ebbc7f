//! 会话快照存储：按 session id 保存最新 Transcript
//!
//! 每个会话只保存一条记录（最新的模型输入快照），持久化体积与轮数无关。
//! 多实例共享时为 last-writer-wins，不提供跨实例锁。

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::RwLock;

use super::Transcript;
use crate::core::AgentError;

/// 会话存储接口；load 返回 None 表示没有历史，不是错误
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<Transcript>, AgentError>;

    async fn save(&self, session_id: &str, transcript: &Transcript) -> Result<(), AgentError>;
}

/// 内存存储（测试与单进程使用）
#[derive(Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Transcript>, AgentError> {
        let records = self.records.read().await;
        match records.get(session_id) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session_id: &str, transcript: &Transcript) -> Result<(), AgentError> {
        // 与持久化实现一致：存序列化后的扁平结构，而非共享引用
        let raw = serde_json::to_string(transcript)?;
        self.records
            .write()
            .await
            .insert(session_id.to_string(), raw);
        Ok(())
    }
}

/// SQLite 存储：一张表，每会话一行，INSERT OR REPLACE
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, AgentError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AgentError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_snapshots (
                session_id TEXT PRIMARY KEY,
                transcript TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 在 blocking 线程池中执行同步 SQLite 操作
    async fn with_conn<T, F>(&self, f: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AgentError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AgentError::Storage("sqlite connection poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| AgentError::Storage(format!("sqlite task failed: {}", e)))?
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Transcript>, AgentError> {
        let id = session_id.to_string();
        let raw: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT transcript FROM session_snapshots WHERE session_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session_id: &str, transcript: &Transcript) -> Result<(), AgentError> {
        let id = session_id.to_string();
        let raw = serde_json::to_string(transcript)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO session_snapshots (session_id, transcript, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![id, raw, now],
            )?;
            Ok(())
        })
        .await
    }
}
