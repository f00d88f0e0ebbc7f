//! 用户交互工具：system.user_interaction.ask_followup_question
//!
//! 有交互回调（如终端 / 聊天前端）时把回答作为工具结果返回；
//! 没有回调时抛出 Pause，编排器结束本轮并等待下一条用户消息。
//! 等人回答不受目录统一超时限制。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use super::{FunctionDescriptor, ParamType, Tool, ToolArgs, ToolError, ToolOutput};

pub const TOOL_NAME: &str = "system.user_interaction";

/// 交互回调：问题 -> 用户回答
pub type AskCallback = Arc<dyn Fn(String) -> BoxFuture<'static, Result<String, String>> + Send + Sync>;

pub struct UserInteractionTool {
    callback: Option<AskCallback>,
    functions: Vec<FunctionDescriptor>,
}

impl UserInteractionTool {
    pub fn new(callback: Option<AskCallback>) -> Self {
        Self {
            callback,
            functions: vec![FunctionDescriptor::new(
                "ask_followup_question",
                "Ask the user a follow-up question and get their response.",
            )
            .required("question", ParamType::String, "The question to ask the user.")
            .no_timeout()],
        }
    }

    /// 无回调：每次提问都暂停任务
    pub fn pausing() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Tool for UserInteractionTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    async fn invoke(&self, function: &str, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        if function != "ask_followup_question" {
            return Err(ToolError::failed(format!("Unknown function: {}", function)));
        }
        let question = args.require_str("question")?.to_string();
        match &self.callback {
            Some(ask) => ask(question)
                .await
                .map(ToolOutput::Text)
                .map_err(|e| ToolError::retryable(format!("Error during user interaction: {}", e))),
            None => Err(ToolError::pause(question)),
        }
    }
}
