//! 结构解析：从清洗后的模型输出中取标题与至多一个 tool_use 块
//!
//! 没有 tool_use 块不是错误（模型给出了最终回复）；块存在但无法修复时返回 Parsing 错误。
//! 可修复的情况：缺少 `</tool_use>`、`</name>`、`</arguments>` 闭合标签，
//! arguments 外面包了 markdown 代码围栏。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::invocation::{ToolInvocation, SEPARATOR};
use super::sanitize::{sanitize, unescape, SanitizeOptions};
use crate::core::AgentError;

/// 缺少 `<title>` 时的占位标题
pub const UNTITLED: &str = "[Untitled]";

/// 一次模型输出的解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub title: String,
    pub invocation: Option<ToolInvocation>,
}

static THINKING_RE: OnceLock<Regex> = OnceLock::new();
static TITLE_RE: OnceLock<Regex> = OnceLock::new();
static OPEN_RE: OnceLock<Regex> = OnceLock::new();
static CLOSE_RE: OnceLock<Regex> = OnceLock::new();
static NAME_RE: OnceLock<Regex> = OnceLock::new();
static ARGS_RE: OnceLock<Regex> = OnceLock::new();

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

pub fn parse(text: &str) -> Result<ParsedResponse, AgentError> {
    let body = prepare(text);
    let title = scan_title(&body).unwrap_or_else(|| UNTITLED.to_string());
    let invocation = extract_invocation(&body)?;
    Ok(ParsedResponse { title, invocation })
}

/// 独立的标题扫描，不受 tool_use 块是否合法影响
pub fn extract_title(text: &str) -> String {
    scan_title(&prepare(text)).unwrap_or_else(|| UNTITLED.to_string())
}

fn prepare(text: &str) -> String {
    let clean = sanitize(text, SanitizeOptions::default());
    re(&THINKING_RE, r"(?s)<thinking\s*>.*?</thinking\s*>")
        .replace_all(&clean, "")
        .into_owned()
}

fn scan_title(body: &str) -> Option<String> {
    let caps = re(&TITLE_RE, r"(?s)<title\s*>(.*?)</title\s*>").captures(body)?;
    let title = unescape(caps[1].trim());
    (!title.is_empty()).then_some(title)
}

fn extract_invocation(body: &str) -> Result<Option<ToolInvocation>, AgentError> {
    let opens: Vec<_> = re(&OPEN_RE, r"<tool_use\s*>").find_iter(body).collect();
    let open = match opens.as_slice() {
        [] => return Ok(None),
        [one] => one,
        many => {
            return Err(AgentError::Parsing(format!(
                "found {} <tool_use> blocks, only one tool call is allowed per response",
                many.len()
            )))
        }
    };

    let rest = &body[open.end()..];
    let inner = match re(&CLOSE_RE, r"</tool_use\s*>").find(rest) {
        Some(close) => &rest[..close.start()],
        None => {
            tracing::debug!("repairing <tool_use> block without closing tag");
            rest
        }
    };

    let name = re(&NAME_RE, r"(?s)<name\s*>(.*?)(?:</name\s*>|<|$)")
        .captures(inner)
        .map(|caps| unescape(caps[1].trim()))
        .ok_or_else(|| AgentError::Parsing("<tool_use> block has no <name>".to_string()))?;
    validate_name(&name)?;

    let arguments = match re(&ARGS_RE, r"(?s)<arguments\s*>(.*?)(?:</arguments\s*>|$)").captures(inner)
    {
        Some(caps) => parse_arguments(&unescape(caps[1].trim()))?,
        None => Map::new(),
    };

    Ok(Some(ToolInvocation::new(name, arguments)))
}

fn validate_name(name: &str) -> Result<(), AgentError> {
    let valid = match name.rfind(SEPARATOR) {
        Some(idx) => {
            idx > 0 && idx + 1 < name.len() && !name.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AgentError::Parsing(format!(
            "invalid tool name '{}', expected tool{}function",
            name, SEPARATOR
        )))
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, AgentError> {
    let raw = strip_code_fence(raw);
    if raw.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AgentError::Parsing(format!(
            "<arguments> must be a JSON object, got: {}",
            other
        ))),
        Err(e) => Err(AgentError::Parsing(format!(
            "invalid JSON in <arguments>: {}",
            e
        ))),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
