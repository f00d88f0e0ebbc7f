//! 工具目录与调度
//!
//! 所有工具实现 Tool trait（name / functions / invoke），由 ToolCatalog 按名注册与查找。
//! execute 负责：查找函数、校验并转换参数、按调用方式执行（blocking 函数进 blocking 线程池）、
//! 施加超时，并为每次调用输出结构化审计日志（JSON）。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use super::args::{coerce, ToolArgs};
use super::descriptor::{CallStyle, CallTimeout, FunctionDescriptor};
use super::ToolError;
use crate::core::AgentError;
use crate::protocol::ToolInvocation;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// 工具返回值；结构化结果（数字、列表、对象）序列化为 JSON 文本后回填给模型
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Structured(Value),
}

impl ToolOutput {
    pub fn into_text(self) -> String {
        match self {
            ToolOutput::Text(s) => s,
            ToolOutput::Structured(Value::String(s)) => s,
            ToolOutput::Structured(v) => v.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        ToolOutput::Text(s)
    }
}

/// 工具 trait：一个工具暴露一组函数，描述在构造时建立
///
/// 函数声明为 Inline 时走 `invoke`，声明为 Blocking 时走 `invoke_blocking`；
/// 两者都有默认实现（返回 Implementation 错误），工具只需实现自己声明的那一种，
/// 并通过 `supports` 告知目录，注册时即可发现声明与实现不符。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名（qualified name 中最后一个 `.` 之前的部分）
    fn name(&self) -> &str;

    fn functions(&self) -> &[FunctionDescriptor];

    /// 已实现的调用方式；默认只有 Inline
    fn supports(&self, style: CallStyle) -> bool {
        style == CallStyle::Inline
    }

    async fn invoke(&self, function: &str, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let _ = args;
        Err(ToolError::Implementation(format!(
            "tool '{}' has no async implementation for '{}'",
            self.name(),
            function
        )))
    }

    fn invoke_blocking(&self, function: &str, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let _ = args;
        Err(ToolError::Implementation(format!(
            "tool '{}' has no blocking implementation for '{}'",
            self.name(),
            function
        )))
    }
}

/// 工具目录：启动时构建后传给运行时，不使用全局注册表
pub struct ToolCatalog {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS)
    }
}

impl ToolCatalog {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 注册工具；重名或描述不合法时返回 Implementation 错误
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
            return Err(AgentError::Implementation(format!(
                "invalid tool name '{}'",
                name
            )));
        }
        if self.tools.contains_key(&name) {
            return Err(AgentError::Implementation(format!(
                "tool '{}' is already registered",
                name
            )));
        }
        let functions = tool.functions();
        if functions.is_empty() {
            return Err(AgentError::Implementation(format!(
                "tool '{}' declares no functions",
                name
            )));
        }
        for (i, f) in functions.iter().enumerate() {
            f.validate()
                .map_err(|e| AgentError::Implementation(format!("tool '{}': {}", name, e)))?;
            if !tool.supports(f.style) {
                return Err(AgentError::Implementation(format!(
                    "tool '{}' declares '{}' as {:?} but does not implement that call style",
                    name, f.name, f.style
                )));
            }
            if functions[..i].iter().any(|g| g.name == f.name) {
                return Err(AgentError::Implementation(format!(
                    "tool '{}' declares function '{}' twice",
                    name, f.name
                )));
            }
        }
        tracing::info!(tool = %name, functions = functions.len(), "tool registered");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn register_tool(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        self.register(Arc::new(tool))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 所有函数的 prompt 描述；按工具名、声明顺序排列，多次调用结果相同
    pub fn describe_all(&self) -> String {
        self.tools
            .iter()
            .flat_map(|(name, tool)| {
                tool.functions()
                    .iter()
                    .map(move |f| f.describe(name))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn resolve(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<(Arc<dyn Tool>, FunctionDescriptor), ToolError> {
        let tool = self
            .tools
            .get(invocation.tool_name())
            .ok_or_else(|| ToolError::failed(format!("Unknown tool: {}", invocation.tool_name())))?;
        let function = tool
            .functions()
            .iter()
            .find(|f| f.name == invocation.function_name())
            .cloned()
            .ok_or_else(|| {
                ToolError::failed(format!(
                    "Unknown function '{}' for tool '{}'",
                    invocation.function_name(),
                    invocation.tool_name()
                ))
            })?;
        Ok((Arc::clone(tool), function))
    }

    /// 执行一次调用，返回回填给模型的结果文本
    pub async fn execute(&self, invocation: &ToolInvocation) -> Result<String, ToolError> {
        let start = Instant::now();
        let result = self.execute_inner(invocation).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Pause { .. }) => "pause",
            Err(ToolError::Failed { retryable: true, .. }) => "retryable_error",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": invocation.tool_name(),
            "function": invocation.function_name(),
            "call_id": invocation.call_id,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&Value::Object(invocation.arguments.clone())),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result.map(ToolOutput::into_text)
    }

    async fn execute_inner(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let (tool, function) = self.resolve(invocation)?;
        let args = coerce(&function, &invocation.arguments)?;
        let name = function.name.clone();
        let limit = match function.timeout {
            CallTimeout::Catalog => Some(self.timeout),
            CallTimeout::Secs(secs) => Some(Duration::from_secs(secs)),
            CallTimeout::Unbounded => None,
        };

        let call = async move {
            match function.style {
                CallStyle::Inline => tool.invoke(&name, args).await,
                CallStyle::Blocking => {
                    match tokio::task::spawn_blocking(move || tool.invoke_blocking(&name, args))
                        .await
                    {
                        Ok(result) => result,
                        Err(e) => Err(ToolError::failed(format!("tool task failed: {}", e))),
                    }
                }
            }
        };

        let Some(limit) = limit else {
            return call.await;
        };
        match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::retryable(format!(
                "{} timed out after {}s",
                invocation.qualified_name,
                limit.as_secs()
            ))),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
