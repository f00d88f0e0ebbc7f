//! 会话运行时：按 session id 组装账本与任务，并保证同一会话同一时刻只跑一个任务
//!
//! 会话锁在事件流存续期间一直持有；调用方丢弃事件流即放弃任务并释放锁。
//! 锁表只保留有任务在跑或在排队的会话。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::error::AgentError;
use super::events::StreamEvent;
use super::task::{AgentServices, TaskManager, TaskOptions};
use crate::ledger::{Ledger, SessionStore};

pub struct AgentRuntime {
    services: AgentServices,
    store: Option<Arc<dyn SessionStore>>,
    dump_path: Option<PathBuf>,
    sessions: SessionTable,
}

type SessionTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// 持有会话锁；释放时若没有其它提交在等待，则从锁表中移除该会话
struct SessionLease {
    session_id: String,
    sessions: SessionTable,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let Ok(mut sessions) = self.sessions.lock() else {
            return;
        };
        // 锁表一份 + 本 guard 一份；更多说明还有提交在等待
        let idle = sessions
            .get(&self.session_id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2);
        if idle {
            sessions.remove(&self.session_id);
        }
    }
}

impl AgentRuntime {
    pub fn new(services: AgentServices) -> Self {
        Self {
            services,
            store: None,
            dump_path: None,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_dump_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_path = Some(path.into());
        self
    }

    pub fn services(&self) -> &AgentServices {
        &self.services
    }

    /// 当前有任务在跑或在排队的会话数
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or_default()
    }

    async fn lease(&self, session_id: &str) -> Result<SessionLease, AgentError> {
        let guard = self.session_lock(session_id)?.lock_owned().await;
        Ok(SessionLease {
            session_id: session_id.to_string(),
            sessions: Arc::clone(&self.sessions),
            _guard: guard,
        })
    }

    fn session_lock(&self, session_id: &str) -> Result<Arc<AsyncMutex<()>>, AgentError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| AgentError::InvalidState("session table poisoned".to_string()))?;
        Ok(sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    /// 提交一个任务，返回其事件流；未给出 session id 时新建一个
    pub async fn submit(
        &self,
        session_id: Option<String>,
        title: &str,
        prompt: &str,
        options: TaskOptions,
    ) -> Result<BoxStream<'static, StreamEvent>, AgentError> {
        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let lease = self.lease(&session_id).await?;

        let mut ledger = Ledger::new(session_id.clone());
        if let Some(store) = &self.store {
            ledger = ledger.with_store(store.clone());
        }
        if let Some(path) = &self.dump_path {
            ledger = ledger.with_dump_path(path);
        }
        let ledger = ledger.resume().await?;

        let mut task = TaskManager::new(ledger, self.services.clone());
        task.create_task(title, prompt, options).await?;
        tracing::info!(session = %session_id, "task submitted");

        let events = task.into_stream().map(move |event| {
            let _held = &lease;
            event
        });
        Ok(events.boxed())
    }

    /// 运行到结束并收集全部事件
    pub async fn run(
        &self,
        session_id: Option<String>,
        title: &str,
        prompt: &str,
        options: TaskOptions,
    ) -> Result<Vec<StreamEvent>, AgentError> {
        let stream = self.submit(session_id, title, prompt, options).await?;
        Ok(stream.collect().await)
    }
}
