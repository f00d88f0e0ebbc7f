//! 多模型路由器
//!
//! 显式注册的命名客户端 + 一个默认客户端；Transcript 上的 model 覆盖用于选择客户端，
//! 未注册的名称直接报错（不回退到默认模型）。

use std::collections::HashMap;
use std::sync::Arc;

use super::{Completion, LlmClient};
use crate::core::AgentError;
use crate::ledger::Transcript;
use crate::protocol::extract_title;

pub struct ModelRouter {
    clients: HashMap<String, Arc<dyn LlmClient>>,
    default_model: String,
}

impl ModelRouter {
    pub fn new(default_model: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        let default_model = default_model.into();
        let mut clients = HashMap::new();
        clients.insert(default_model.clone(), client);
        Self {
            clients,
            default_model,
        }
    }

    /// 注册命名客户端；同名覆盖
    pub fn with_client(mut self, name: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        self.clients.insert(name.into(), client);
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn select(&self, model: Option<&str>) -> Result<Arc<dyn LlmClient>, AgentError> {
        let name = model.unwrap_or(&self.default_model);
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::Model(format!("unknown model '{}'", name)))
    }

    pub async fn complete(&self, transcript: &Transcript) -> Result<Vec<Completion>, AgentError> {
        let model = transcript.model().unwrap_or(&self.default_model);
        let client = self.select(Some(model))?;
        tracing::info!(model = %model, turns = transcript.len(), "model call");

        let mut completions = client
            .complete(transcript.turns())
            .await
            .map_err(AgentError::Model)?;
        if completions.is_empty() {
            return Err(AgentError::Model(format!(
                "model '{}' returned no completions",
                model
            )));
        }
        for c in completions.iter_mut().filter(|c| c.title.is_none()) {
            c.title = Some(extract_title(c.content.as_deref().unwrap_or_default()));
        }
        Ok(completions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ScriptedLlmClient};
    use crate::protocol::UNTITLED;

    #[tokio::test]
    async fn fills_titles_from_content() {
        let client = Arc::new(ScriptedLlmClient::new(["<title>Count</title>3", "plain"]));
        let router = ModelRouter::new("scripted", client);
        let t = Transcript::new(None).with_user("q");
        let first = router.complete(&t).await.unwrap();
        assert_eq!(first[0].title.as_deref(), Some("Count"));
        let second = router.complete(&t).await.unwrap();
        assert_eq!(second[0].title.as_deref(), Some(UNTITLED));
    }

    #[tokio::test]
    async fn transcript_override_selects_client() {
        let router = ModelRouter::new("scripted", Arc::new(ScriptedLlmClient::new(["x"])))
            .with_client("mock", Arc::new(MockLlmClient));
        let t = Transcript::new(Some("mock".into())).with_user("ping");
        let out = router.complete(&t).await.unwrap();
        assert_eq!(out[0].content.as_deref(), Some("Echo from Mock: ping"));

        let unknown = Transcript::new(Some("gpt-x".into())).with_user("ping");
        assert!(matches!(
            router.complete(&unknown).await,
            Err(AgentError::Model(_))
        ));
    }
}
