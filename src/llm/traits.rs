//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / Scripted）实现 LlmClient：输入按角色标注的消息序列，
//! 返回一个或多个候选回复（title, content, finish_reason, partial）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ledger::Message;

/// 单个候选回复；title 缺失时由 ModelRouter 从 content 中扫描 `<title>` 补齐
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub title: Option<String>,
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    /// 输出被截断（如 length）时为 true
    #[serde(default)]
    pub partial: bool,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(content.into()),
            finish_reason: Some("stop".to_string()),
            partial: false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<Vec<Completion>, String>;
}
