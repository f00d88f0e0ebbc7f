//! 工具调用请求与结果轮次的文本格式

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// tool 与 function 之间的分隔符
pub const SEPARATOR: char = '.';

/// 从模型输出解析出的一次工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub qualified_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    pub call_id: String,
}

impl ToolInvocation {
    pub fn new(qualified_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            arguments,
            call_id: new_call_id(),
        }
    }

    /// `mcp.local_time.get_time` -> `mcp.local_time`
    pub fn tool_name(&self) -> &str {
        split_qualified(&self.qualified_name).0
    }

    pub fn function_name(&self) -> &str {
        split_qualified(&self.qualified_name).1
    }

    /// `tool.function#call_id`
    pub fn label(&self) -> String {
        format!("{}#{}", self.qualified_name, self.call_id)
    }
}

/// 在最后一个分隔符处切分；没有分隔符时 tool 部分为空
pub fn split_qualified(name: &str) -> (&str, &str) {
    match name.rfind(SEPARATOR) {
        Some(idx) => (&name[..idx], &name[idx + 1..]),
        None => ("", name),
    }
}

/// 8 位十六进制随机 id，允许碰撞，仅用于标注结果轮次
pub fn new_call_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// 回填给模型的结果轮次：`[tool.function#id] Result:\n<text>`
pub fn tool_result_turn(invocation: &ToolInvocation, result: &str) -> String {
    format!("[{}] Result:\n{}", invocation.label(), result)
}

/// tool_result_turn 的逆操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResultTurn {
    pub qualified_name: String,
    pub call_id: String,
    pub result: String,
}

pub fn parse_tool_result_turn(turn: &str) -> Option<ToolResultTurn> {
    let rest = turn.strip_prefix('[')?;
    let (label, result) = rest.split_once("] Result:\n")?;
    let (qualified_name, call_id) = label.rsplit_once('#')?;
    Some(ToolResultTurn {
        qualified_name: qualified_name.to_string(),
        call_id: call_id.to_string(),
        result: result.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_last_separator() {
        let inv = ToolInvocation::new("mcp.local_time.get_local_time", Map::new());
        assert_eq!(inv.tool_name(), "mcp.local_time");
        assert_eq!(inv.function_name(), "get_local_time");
        assert_eq!(split_qualified("plain"), ("", "plain"));
    }

    #[test]
    fn call_id_is_short_hex() {
        let id = new_call_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn result_turn_parses_back() {
        let inv = ToolInvocation::new("letter_counter.count", Map::new());
        let turn = tool_result_turn(&inv, "3\nsecond line");
        assert!(turn.starts_with("[letter_counter.count#"));
        let parsed = parse_tool_result_turn(&turn).unwrap();
        assert_eq!(parsed.qualified_name, "letter_counter.count");
        assert_eq!(parsed.call_id, inv.call_id);
        assert_eq!(parsed.result, "3\nsecond line");
        assert!(parse_tool_result_turn("just text").is_none());
    }
}
