//! 外部工具中心：管理 stdio 工具进程的生命周期，并把它们的工具并入 ToolCatalog
//!
//! 每个 provider 一个子进程；工具以 `mcp.<provider>` 为名注册。
//! 进程随 ToolHub 的 shutdown 显式结束，其它退出路径依赖 kill_on_drop。

pub mod error;
pub mod process;
pub mod remote;
pub mod schema;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use error::HubError;
pub use process::{ProviderProcess, RemoteToolInfo};
pub use remote::{interpret_call_result, namespaced, RemoteTool};

use crate::core::AgentError;
use crate::tools::{FunctionDescriptor, Tool, ToolCatalog};

/// provider 描述（配置中的 `[[hub.providers]]`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    /// 目前只支持 stdio；sse / streaming 在校验时拒绝
    #[serde(default = "default_transport")]
    pub transport: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub description: String,
}

fn default_transport() -> String {
    "stdio".to_string()
}

impl ProviderSpec {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: default_transport(),
            command: command.into(),
            args,
            env: HashMap::new(),
            description: String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), HubError> {
        let invalid = |message: String| HubError::Config {
            provider: self.name.clone(),
            message,
        };
        if self.name.trim().is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(invalid("name must be a non-empty identifier".to_string()));
        }
        match self.transport.as_str() {
            "stdio" => {}
            "sse" | "streaming" => {
                return Err(invalid(format!(
                    "transport '{}' is not supported yet, only 'stdio' is",
                    self.transport
                )))
            }
            other => {
                return Err(invalid(format!(
                    "unknown transport '{}', must be one of: stdio, sse, streaming",
                    other
                )))
            }
        }
        if self.command.trim().is_empty() {
            return Err(invalid("command must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ToolHub {
    providers: Vec<ProviderProcess>,
}

impl ToolHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动 provider 并完成握手；同名 provider 只允许一个
    pub async fn connect(&mut self, spec: ProviderSpec) -> Result<ProviderProcess, HubError> {
        spec.validate()?;
        if self.providers.iter().any(|p| p.name() == spec.name) {
            return Err(HubError::Config {
                provider: spec.name.clone(),
                message: "provider is already connected".to_string(),
            });
        }
        let process = ProviderProcess::spawn(spec).await?;
        self.providers.push(process.clone());
        Ok(process)
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// (工具名, 函数描述)，与本地工具同一形态
    pub async fn list_tools(&self) -> Vec<(String, Vec<FunctionDescriptor>)> {
        let mut out = Vec::with_capacity(self.providers.len());
        for process in &self.providers {
            let functions = process
                .tools()
                .await
                .iter()
                .map(remote::describe_remote)
                .collect();
            out.push((namespaced(process.name()), functions));
        }
        out
    }

    pub async fn register_into(&self, catalog: &mut ToolCatalog) -> Result<(), AgentError> {
        for process in &self.providers {
            let tool = RemoteTool::new(process.clone()).await;
            if tool.functions().is_empty() {
                tracing::warn!(provider = %process.name(), "provider lists no tools, skipping");
                continue;
            }
            catalog.register(Arc::new(tool))?;
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        for process in self.providers.drain(..) {
            process.shutdown().await;
        }
    }
}
