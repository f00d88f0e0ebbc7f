//! System prompt 渲染
//!
//! 模板由若干段落占位符组成：`{{agent_role}}`、`{{rules}}`、`{{tool_use}}`、`{{objective}}`、`{{context}}`。
//! 自定义模板文件在加载时校验占位符，出现未知段落即报配置错误。

mod sections;

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::AgentError;

/// 模板允许出现的段落
pub const SECTIONS: &[&str] = &["agent_role", "rules", "tool_use", "objective", "context"];

pub const DEFAULT_TEMPLATE: &str = "{{agent_role}}\n{{tool_use}}\n{{rules}}\n{{objective}}\n{{context}}";

/// 渲染 system prompt 所需的全部输入
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub agent_name: String,
    pub objective: String,
    pub tool_descriptions: String,
    pub allow_interaction: bool,
    pub use_tool: bool,
    pub extra_context: Option<String>,
}

pub trait PromptRenderer: Send + Sync {
    fn render(&self, ctx: &PromptContext) -> Result<String, AgentError>;
}

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap())
}

/// 基于占位符替换的默认实现
#[derive(Debug, Clone)]
pub struct TemplatePrompt {
    template: String,
}

impl Default for TemplatePrompt {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl TemplatePrompt {
    pub fn new(template: impl Into<String>) -> Result<Self, AgentError> {
        let template = template.into();
        let unknown: Vec<String> = placeholder_re()
            .captures_iter(&template)
            .map(|c| c[1].to_string())
            .filter(|name| !SECTIONS.contains(&name.as_str()))
            .collect();
        if !unknown.is_empty() {
            return Err(AgentError::Config(format!(
                "template placeholders {:?} are not among the available sections {:?}",
                unknown, SECTIONS
            )));
        }
        Ok(Self { template })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let template = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("cannot read template {}: {}", path.display(), e))
        })?;
        Self::new(template)
    }

    fn section(&self, name: &str, ctx: &PromptContext) -> String {
        match name {
            "agent_role" => sections::agent_role(&ctx.agent_name),
            "rules" => sections::rules(ctx.allow_interaction),
            "tool_use" if ctx.use_tool => {
                sections::tool_use(&ctx.tool_descriptions, ctx.allow_interaction)
            }
            "objective" => sections::objective(&ctx.objective),
            "context" => sections::context(ctx.extra_context.as_deref()),
            _ => String::new(),
        }
    }
}

impl PromptRenderer for TemplatePrompt {
    fn render(&self, ctx: &PromptContext) -> Result<String, AgentError> {
        let rendered = placeholder_re().replace_all(&self.template, |caps: &regex::Captures| {
            self.section(&caps[1], ctx)
        });
        Ok(rendered.trim().to_string())
    }
}
