//! LLM 层：客户端抽象、路由与实现（OpenAI 兼容 / Mock / Scripted）

pub mod mock;
pub mod openai;
pub mod router;
pub mod traits;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use router::ModelRouter;
pub use traits::{Completion, LlmClient};
