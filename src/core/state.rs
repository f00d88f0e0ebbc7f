//! 任务状态机：TaskState 与下一步 Action

use serde::Serialize;

/// 任务阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    /// 已写入 system prompt 与首条用户消息
    Initialized,
    RunningGeneric,
    RunningModel,
    RunningTool,
    Completed,
    Error,
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            TaskState::RunningGeneric | TaskState::RunningModel | TaskState::RunningTool
        )
    }
}

/// 主循环的下一步动作：ModelCall -> ParseModel -> ToolCall -> ParseTool -> ModelCall ...
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// 终止（解析不到工具调用，或尚未创建任务）
    None,
    ModelCall,
    ParseModel,
    ToolCall,
    ParseTool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_states() {
        assert!(TaskState::RunningModel.is_running());
        assert!(TaskState::RunningTool.is_running());
        assert!(!TaskState::Initialized.is_running());
        assert!(!TaskState::Error.is_running());
    }
}
