//! Agent 构建器：由 AppConfig 统一组装模型路由、工具目录、prompt 与会话存储
//!
//! 所有接入方式（命令行、测试、嵌入调用）共享同一套组装逻辑；没有全局注册表。

use std::sync::Arc;

use crate::config::{AppConfig, ModelEntry};
use crate::core::{AgentError, AgentRuntime, AgentServices};
use crate::hub::ToolHub;
use crate::ledger::{MemorySessionStore, SessionStore, SqliteSessionStore};
use crate::llm::{LlmClient, MockLlmClient, ModelRouter, OpenAiClient};
use crate::prompt::{PromptRenderer, TemplatePrompt};
use crate::tools::{
    ApiClient, AskCallback, LetterCounterTool, ScrapeTool, SearchTool, ToolCatalog,
    UserInteractionTool,
};

/// 未配置任何模型时使用的内置模型名
pub const FALLBACK_MODEL: &str = "mock";

/// Agent 构建器
pub struct AgentBuilder {
    config: AppConfig,
    ask: Option<AskCallback>,
    store: Option<Arc<dyn SessionStore>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            ask: None,
            store: None,
        }
    }

    /// 交互回调；不设置时 user_interaction 工具以暂停任务代替提问
    pub fn with_ask_callback(mut self, ask: AskCallback) -> Self {
        self.ask = Some(ask);
        self
    }

    /// 直接指定会话存储，覆盖 [history] 配置
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn build_client(entry: &ModelEntry) -> Arc<dyn LlmClient> {
        match entry.provider.as_str() {
            "mock" => Arc::new(MockLlmClient),
            _ => Arc::new(OpenAiClient::new(
                entry.base_url.as_deref(),
                entry.model.as_deref().unwrap_or(&entry.name),
                entry.api_key.as_deref(),
            )),
        }
    }

    /// 具名模型路由；默认模型为 default_model，否则取第一项
    pub fn build_models(&self) -> Result<ModelRouter, AgentError> {
        let llm = &self.config.llm;
        let Some(first) = llm.models.first() else {
            return Ok(ModelRouter::new(FALLBACK_MODEL, Arc::new(MockLlmClient)));
        };
        let default_name = llm.default_model.clone().unwrap_or_else(|| first.name.clone());
        let default_entry = llm
            .models
            .iter()
            .find(|m| m.name == default_name)
            .ok_or_else(|| {
                AgentError::Config(format!("default model '{}' is not configured", default_name))
            })?;

        let mut router = ModelRouter::new(default_name.clone(), Self::build_client(default_entry));
        for entry in llm.models.iter().filter(|m| m.name != default_name) {
            router = router.with_client(entry.name.clone(), Self::build_client(entry));
        }
        tracing::info!(default = %default_name, models = ?router.model_names(), "model router ready");
        Ok(router)
    }

    /// 内置工具 + 交互工具 + hub 中已连接 provider 的远程工具
    pub async fn build_catalog(&self, hub: &mut ToolHub) -> Result<ToolCatalog, AgentError> {
        let tools_cfg = &self.config.tools;
        let mut catalog = ToolCatalog::new(tools_cfg.timeout_secs);
        // search 与 scrape 共用一个 HTTP 客户端
        let api = || {
            let api_key = tools_cfg
                .search
                .api_key
                .clone()
                .or_else(|| std::env::var("GENSEE_SEARCH_API_KEY").ok())
                .unwrap_or_default();
            ApiClient::new(api_key, tools_cfg.timeout_secs, tools_cfg.search.max_retries)
        };
        let mut shared: Option<ApiClient> = None;

        for name in &tools_cfg.available {
            match name.as_str() {
                "letter_counter" => catalog.register(Arc::new(LetterCounterTool::new()))?,
                "search" => {
                    let client = shared.get_or_insert_with(api).clone();
                    catalog.register(Arc::new(SearchTool::with_client(
                        tools_cfg.search.endpoint.clone(),
                        client,
                    )))?
                }
                "scrape" => {
                    let client = shared.get_or_insert_with(api).clone();
                    catalog.register(Arc::new(ScrapeTool::new(
                        tools_cfg.scrape.endpoint.clone(),
                        client,
                    )))?
                }
                other => {
                    return Err(AgentError::Config(format!(
                        "unknown built-in tool '{}', available: letter_counter, search, scrape",
                        other
                    )))
                }
            }
        }

        if self.config.agent.allow_interaction {
            catalog.register(Arc::new(UserInteractionTool::new(self.ask.clone())))?;
        }

        for spec in &self.config.hub.providers {
            hub.connect(spec.clone()).await?;
        }
        hub.register_into(&mut catalog).await?;

        tracing::info!(tools = ?catalog.tool_names(), "tool catalog ready");
        Ok(catalog)
    }

    pub fn build_prompt(&self) -> Result<Arc<dyn PromptRenderer>, AgentError> {
        let prompt = match &self.config.prompt.template_file {
            Some(path) => TemplatePrompt::from_file(path)?,
            None => TemplatePrompt::default(),
        };
        Ok(Arc::new(prompt))
    }

    pub fn build_store(&self) -> Result<Arc<dyn SessionStore>, AgentError> {
        if let Some(store) = &self.store {
            return Ok(store.clone());
        }
        let history = &self.config.history;
        match history.store.as_str() {
            "memory" => Ok(Arc::new(MemorySessionStore::new())),
            "sqlite" => Ok(Arc::new(SqliteSessionStore::open(&history.sqlite_path)?)),
            other => Err(AgentError::Config(format!("unknown history store '{}'", other))),
        }
    }

    /// 组装运行时；hub 由调用方持有，以便在任何退出路径上 shutdown
    pub async fn build(self, hub: &mut ToolHub) -> Result<AgentRuntime, AgentError> {
        self.config.validate()?;
        let services = AgentServices {
            models: Arc::new(self.build_models()?),
            tools: Arc::new(self.build_catalog(hub).await?),
            prompt: self.build_prompt()?,
            agent_name: self.config.agent.name.clone(),
            allow_interaction: self.config.agent.allow_interaction,
            max_steps: self.config.agent.max_steps,
        };
        let mut runtime = AgentRuntime::new(services).with_store(self.build_store()?);
        if let Some(path) = &self.config.history.dump_path {
            runtime = runtime.with_dump_path(path.clone());
        }
        Ok(runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;

    fn entry(name: &str) -> ModelEntry {
        ModelEntry {
            name: name.to_string(),
            provider: "mock".to_string(),
            model: None,
            base_url: None,
            api_key: None,
        }
    }

    #[test]
    fn falls_back_to_mock_without_models() {
        let router = AgentBuilder::new(AppConfig::default()).build_models().unwrap();
        assert_eq!(router.default_model(), FALLBACK_MODEL);
    }

    #[test]
    fn default_model_selects_among_entries() {
        let mut cfg = AppConfig::default();
        cfg.llm.models = vec![entry("fast"), entry("smart")];
        cfg.llm.default_model = Some("smart".to_string());
        let router = AgentBuilder::new(cfg).build_models().unwrap();
        assert_eq!(router.default_model(), "smart");
        assert!(router.select(Some("fast")).is_ok());
        assert!(router.select(Some("other")).is_err());
    }

    #[tokio::test]
    async fn unknown_builtin_tool_is_a_config_error() {
        let mut cfg = AppConfig::default();
        cfg.tools.available.push("teleport".to_string());
        let mut hub = ToolHub::new();
        let err = AgentBuilder::new(cfg).build_catalog(&mut hub).await.err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[tokio::test]
    async fn interaction_tool_follows_agent_flag() {
        let mut cfg = AppConfig::default();
        cfg.agent.allow_interaction = true;
        let mut hub = ToolHub::new();
        let catalog = AgentBuilder::new(cfg).build_catalog(&mut hub).await.unwrap();
        assert!(catalog.get("system.user_interaction").is_some());
        assert!(catalog.get("letter_counter").is_some());
    }

    #[tokio::test]
    async fn hosted_tools_share_one_client() {
        let mut cfg = AppConfig::default();
        cfg.tools.available = vec!["search".to_string(), "scrape".to_string()];
        let mut hub = ToolHub::new();
        let catalog = AgentBuilder::new(cfg).build_catalog(&mut hub).await.unwrap();
        assert!(catalog.get("search").is_some());
        let scrape = catalog.get("gensee.scrape").unwrap();
        let urls = scrape.functions()[0].get_param("urls").unwrap();
        assert_eq!(urls.param_type, crate::tools::ParamType::Any);
        assert!(catalog.describe_all().contains("## gensee.scrape.scrape"));
    }
}
