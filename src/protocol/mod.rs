//! 模型输出协议：清洗、结构解析、工具调用与结果轮次格式

pub mod invocation;
pub mod parser;
pub mod sanitize;

pub use invocation::{
    parse_tool_result_turn, split_qualified, tool_result_turn, ToolInvocation, ToolResultTurn,
    SEPARATOR,
};
pub use parser::{extract_title, parse, ParsedResponse, UNTITLED};
pub use sanitize::{sanitize, unescape, SanitizeOptions};
