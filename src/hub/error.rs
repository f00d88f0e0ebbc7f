use thiserror::Error;

use crate::core::AgentError;
use crate::tools::ToolError;

/// 外部工具进程（stdio JSON-RPC）相关错误
#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid provider '{provider}': {message}")]
    Config { provider: String, message: String },

    #[error("failed to spawn provider '{provider}': {source}")]
    Spawn {
        provider: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error with provider '{provider}': {message}")]
    Transport { provider: String, message: String },

    #[error("invalid JSON exchanged with provider '{provider}': {source}")]
    InvalidJson {
        provider: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("provider '{provider}' returned error {code}: {message}")]
    Rpc {
        provider: String,
        code: i64,
        message: String,
    },

    #[error("provider '{provider}' did not answer '{method}' in time")]
    Timeout { provider: String, method: String },

    #[error("provider '{provider}' terminated")]
    Terminated { provider: String },

    #[error("request to provider '{provider}' was cancelled")]
    Cancelled { provider: String },

    /// tools/call 成功返回但结果不可用（isError、空、多项、非文本）
    #[error("remote tool {tool} {message}")]
    BadResult { tool: String, message: String },
}

impl From<HubError> for ToolError {
    fn from(err: HubError) -> Self {
        ToolError::failed(err.to_string())
    }
}

impl From<HubError> for AgentError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Config { .. } => AgentError::Config(err.to_string()),
            other => AgentError::Implementation(other.to_string()),
        }
    }
}
