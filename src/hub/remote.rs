//! 远程工具：把一个 provider 的全部函数包装为目录中的 `mcp.<provider>` 工具

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use super::process::{ProviderProcess, RemoteToolInfo};
use super::schema::params_from_schema;
use super::HubError;
use crate::protocol::SEPARATOR;
use crate::tools::{FunctionDescriptor, Tool, ToolArgs, ToolError, ToolOutput};

pub const NAMESPACE: &str = "mcp";

pub fn namespaced(provider: &str) -> String {
    format!("{}{}{}", NAMESPACE, SEPARATOR, provider)
}

/// 远程函数名中的分隔符替换为 `_`，调用时再映射回原名
pub fn local_function_name(remote: &str) -> String {
    remote.replace(SEPARATOR, "_")
}

pub fn describe_remote(info: &RemoteToolInfo) -> FunctionDescriptor {
    FunctionDescriptor {
        name: local_function_name(&info.name),
        description: info.description.clone().unwrap_or_default(),
        params: params_from_schema(info.input_schema.as_ref()),
        style: Default::default(),
        timeout: Default::default(),
    }
}

pub struct RemoteTool {
    name: String,
    process: ProviderProcess,
    functions: Vec<FunctionDescriptor>,
    remote_names: HashMap<String, String>,
}

impl RemoteTool {
    pub async fn new(process: ProviderProcess) -> Self {
        let infos = process.tools().await;
        let functions = infos.iter().map(describe_remote).collect();
        let remote_names = infos
            .iter()
            .map(|i| (local_function_name(&i.name), i.name.clone()))
            .collect();
        Self {
            name: namespaced(process.name()),
            process,
            functions,
            remote_names,
        }
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    async fn invoke(&self, function: &str, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let remote = self
            .remote_names
            .get(function)
            .map(String::as_str)
            .unwrap_or(function);
        let result = self.process.call_tool(remote, args.into_map()).await?;
        interpret_call_result(remote, &result)
            .map(ToolOutput::Text)
            .map_err(ToolError::from)
    }
}

/// tools/call 结果必须恰好包含一个 text 项，否则视为不可重试错误
pub fn interpret_call_result(tool: &str, result: &Value) -> Result<String, HubError> {
    let bad = |message: String| HubError::BadResult {
        tool: tool.to_string(),
        message,
    };
    let content = result
        .get("content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        return Err(bad(format!(
            "returned an error: {}",
            Value::Array(content)
        )));
    }
    match content.as_slice() {
        [] => Err(bad("returned empty response".to_string())),
        [item] => match (
            item.get("type").and_then(Value::as_str),
            item.get("text").and_then(Value::as_str),
        ) {
            (Some("text"), Some(text)) => Ok(text.to_string()),
            _ => Err(bad("returned non-text response, expected text".to_string())),
        },
        _ => Err(bad(
            "returned multiple values, expected exactly one".to_string(),
        )),
    }
}
