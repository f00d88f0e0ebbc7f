//! Mock / Scripted LLM 客户端（用于测试与本地演示，无需 API）

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Completion, LlmClient};
use crate::ledger::{Message, Role};

/// Mock 客户端：把最后一条 User 消息原样作为最终回复（不调用工具）
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<Vec<Completion>, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(vec![Completion::text(format!("Echo from Mock: {}", last_user))])
    }
}

/// 按顺序返回预设回复；记录每次收到的消息，便于断言模型输入
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(Into::into).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的模型输入（每次调用一份）
    pub async fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<Vec<Completion>, String> {
        self.seen.lock().await.push(messages.to_vec());
        let next = self
            .script
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| "scripted model has no more responses".to_string())?;
        Ok(vec![Completion::text(next)])
    }
}
