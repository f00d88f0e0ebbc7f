//! 工具层：描述、参数转换、目录与调度、内置工具

pub mod api;
pub mod args;
pub mod descriptor;
pub mod error;
pub mod letter_counter;
pub mod registry;
pub mod scrape;
pub mod search;
pub mod user_interaction;

pub use api::ApiClient;
pub use args::{coerce, ToolArgs};
pub use descriptor::{CallStyle, CallTimeout, FunctionDescriptor, ParamSpec, ParamType};
pub use error::ToolError;
pub use letter_counter::LetterCounterTool;
pub use registry::{Tool, ToolCatalog, ToolOutput};
pub use scrape::ScrapeTool;
pub use search::SearchTool;
pub use user_interaction::{AskCallback, UserInteractionTool};
