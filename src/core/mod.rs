//! 核心编排层：错误与中断、任务状态机、事件流、会话运行时与构建器

pub mod builder;
pub mod error;
pub mod events;
pub mod runtime;
pub mod state;
pub mod task;

pub use builder::AgentBuilder;
pub use error::{AgentError, Interrupt};
pub use events::{EventKind, StreamEvent};
pub use runtime::AgentRuntime;
pub use state::{Action, TaskState};
pub use task::{AgentServices, TaskManager, TaskOptions, DEFAULT_MAX_STEPS, NO_RESULT};
