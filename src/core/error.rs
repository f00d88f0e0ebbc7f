//! Agent 错误类型与中断信号
//!
//! 编排器不做重试：AgentError 一旦到达主循环即终止任务；是否可重试由产生错误的工具标注。
//! 等待用户输入（Pause）不是错误，单独用 Interrupt::Pause 表示。

use thiserror::Error;

use crate::tools::ToolError;

/// Agent 运行过程中可能出现的错误（解析、工具、实现、模型、存储、状态、配置）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 模型输出中的 tool_use 块结构损坏，永不重试
    #[error("Tool parsing error: {0}")]
    Parsing(String),

    #[error("Tool execution error: {message} (retryable: {retryable})")]
    ToolExecution { message: String, retryable: bool },

    /// 工具自我描述与实现不一致，尽量在注册时暴露
    #[error("Implementation error: {0}")]
    Implementation(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid task state: {0}")]
    InvalidState(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn tool(message: impl Into<String>, retryable: bool) -> Self {
        Self::ToolExecution {
            message: message.into(),
            retryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ToolExecution { retryable: true, .. })
    }
}

/// 单步执行的中断：暂停等待用户，或不可恢复的失败
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// 需要人工输入；任务标记为 Completed 且可在下一轮继续
    Pause(String),
    Fail(AgentError),
}

impl From<AgentError> for Interrupt {
    fn from(err: AgentError) -> Self {
        Interrupt::Fail(err)
    }
}

impl From<ToolError> for Interrupt {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Pause { question } => Interrupt::Pause(question),
            ToolError::Failed { message, retryable } => {
                Interrupt::Fail(AgentError::ToolExecution { message, retryable })
            }
            ToolError::Implementation(message) => {
                Interrupt::Fail(AgentError::Implementation(message))
            }
        }
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(err: rusqlite::Error) -> Self {
        AgentError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Storage(format!("serialization failed: {}", err))
    }
}
