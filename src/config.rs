//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GENSEE__*` 覆盖（双下划线表示嵌套，如 `GENSEE__AGENT__MAX_STEPS=20`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;
use crate::hub::ProviderSpec;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub hub: HubSection,
    pub history: HistorySection,
    pub prompt: PromptSection,
}

/// [agent] 段：名称、是否允许向用户提问、单任务最大步数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub name: String,
    pub allow_interaction: bool,
    pub max_steps: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "Gensee".to_string(),
            allow_interaction: false,
            max_steps: crate::core::DEFAULT_MAX_STEPS,
        }
    }
}

/// [llm] 段：默认模型与具名模型列表
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmSection {
    /// 未设置时取 models 中第一项；models 为空时使用内置 mock
    pub default_model: Option<String>,
    pub models: Vec<ModelEntry>,
}

/// [[llm.models]]：name 是 transcript 中可引用的名字
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    /// openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 实际请求的模型名，缺省同 name
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

/// [tools] 段：启用的内置工具与调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub available: Vec<String>,
    /// 单次工具调用超时（秒）
    pub timeout_secs: u64,
    pub search: SearchSection,
    pub scrape: ScrapeSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            available: vec!["letter_counter".to_string()],
            timeout_secs: crate::tools::registry::DEFAULT_TIMEOUT_SECS,
            search: SearchSection::default(),
            scrape: ScrapeSection::default(),
        }
    }
}

/// [tools.search] 段；api_key 与 max_retries 同样用于 scrape
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: String,
    /// 未设置时读取 GENSEE_SEARCH_API_KEY
    pub api_key: Option<String>,
    pub max_retries: u32,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: crate::tools::search::DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            max_retries: 3,
        }
    }
}

/// [tools.scrape] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeSection {
    pub endpoint: String,
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            endpoint: crate::tools::scrape::DEFAULT_SCRAPE_ENDPOINT.to_string(),
        }
    }
}

/// [hub] 段：`[[hub.providers]]` 外部工具进程
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct HubSection {
    pub providers: Vec<ProviderSpec>,
}

/// [history] 段：会话快照存储与完整历史 dump
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// memory / sqlite
    pub store: String,
    pub sqlite_path: PathBuf,
    pub dump_path: Option<PathBuf>,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            store: "memory".to_string(),
            sqlite_path: PathBuf::from("gensee_sessions.db"),
            dump_path: None,
        }
    }
}

/// [prompt] 段：自定义 system prompt 模板文件
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PromptSection {
    pub template_file: Option<PathBuf>,
}

impl AppConfig {
    /// 启动前的静态校验；运行时才能发现的问题（如 provider 启动失败）不在此列
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agent.max_steps == 0 {
            return Err(AgentError::Config("agent.max_steps must be positive".to_string()));
        }
        if self.tools.timeout_secs == 0 {
            return Err(AgentError::Config("tools.timeout_secs must be positive".to_string()));
        }
        if !matches!(self.history.store.as_str(), "memory" | "sqlite") {
            return Err(AgentError::Config(format!(
                "history.store must be 'memory' or 'sqlite', got '{}'",
                self.history.store
            )));
        }
        for entry in &self.llm.models {
            if !matches!(entry.provider.as_str(), "openai" | "mock") {
                return Err(AgentError::Config(format!(
                    "model '{}' has unknown provider '{}'",
                    entry.name, entry.provider
                )));
            }
        }
        if let Some(default) = &self.llm.default_model {
            if !self.llm.models.is_empty() && !self.llm.models.iter().any(|m| &m.name == default) {
                return Err(AgentError::Config(format!(
                    "llm.default_model '{}' is not among the configured models",
                    default
                )));
            }
        }
        for spec in &self.hub.providers {
            spec.validate().map_err(AgentError::from)?;
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 GENSEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（必须存在，可覆盖前面的键）
/// 3. 最后叠加环境变量 GENSEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GENSEE")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| AgentError::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.agent.max_steps, 50);
        assert_eq!(cfg.tools.available, vec!["letter_counter"]);
        assert_eq!(cfg.history.store, "memory");
    }

    #[test]
    fn loads_sections_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gensee.toml");
        std::fs::write(
            &path,
            r#"
[agent]
name = "Counter"
allow_interaction = true

[llm]
default_model = "fast"

[[llm.models]]
name = "fast"
provider = "mock"

[tools]
available = ["letter_counter", "search"]

[[hub.providers]]
name = "local_time"
command = "gensee-local-time"

[history]
store = "sqlite"
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.name, "Counter");
        assert!(cfg.agent.allow_interaction);
        assert_eq!(cfg.agent.max_steps, 50);
        assert_eq!(cfg.llm.models[0].provider, "mock");
        assert_eq!(cfg.hub.providers[0].transport, "stdio");
        assert_eq!(cfg.history.store, "sqlite");
    }

    #[test]
    fn rejects_unknown_store_and_provider() {
        let mut cfg = AppConfig::default();
        cfg.history.store = "redis".to_string();
        assert!(matches!(cfg.validate(), Err(AgentError::Config(_))));

        let mut cfg = AppConfig::default();
        cfg.hub.providers.push(ProviderSpec {
            transport: "sse".to_string(),
            ..ProviderSpec::stdio("remote", "x", Vec::new())
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_config(Some(PathBuf::from("/nonexistent/gensee.toml"))).is_err());
    }
}
