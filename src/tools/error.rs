//! 工具实现返回的错误

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// 执行失败；retryable 由工具自行判断（网络抖动、限流等为 true）
    #[error("{message}")]
    Failed { message: String, retryable: bool },

    /// 需要用户补充信息，编排器暂停任务
    #[error("waiting for user input: {question}")]
    Pause { question: String },

    /// 描述与实现不一致（例如声明 blocking 却没有实现 invoke_blocking）
    #[error("implementation error: {0}")]
    Implementation(String),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn pause(question: impl Into<String>) -> Self {
        Self::Pause {
            question: question.into(),
        }
    }
}
