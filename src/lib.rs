//! Gensee - Rust 智能体执行核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务状态机、事件流、会话运行时与构建器
//! - **hub**: 外部工具进程（stdio JSON-RPC）的生命周期与远程工具
//! - **ledger**: 会话账本、Transcript 与会话快照存储
//! - **llm**: 模型客户端抽象、OpenAI 兼容实现、Mock 与多模型路由
//! - **observability**: tracing 初始化
//! - **prompt**: system prompt 模板渲染
//! - **protocol**: 模型输出清洗、tool_use 解析与工具结果回合
//! - **tools**: 工具描述、参数校验、工具目录与内置工具

pub mod config;
pub mod core;
pub mod hub;
pub mod ledger;
pub mod llm;
pub mod observability;
pub mod prompt;
pub mod protocol;
pub mod tools;

pub use crate::core::{AgentBuilder, AgentError, AgentRuntime, StreamEvent, TaskManager, TaskOptions};
