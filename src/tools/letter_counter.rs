//! 字母计数工具（示例 / 测试用）

use serde_json::json;

use super::{CallStyle, FunctionDescriptor, ParamType, Tool, ToolArgs, ToolError, ToolOutput};

pub struct LetterCounterTool {
    functions: Vec<FunctionDescriptor>,
}

impl LetterCounterTool {
    pub fn new() -> Self {
        Self {
            functions: vec![FunctionDescriptor::new(
                "count",
                "Count occurrences of a specific letter in the given text (case-insensitive).",
            )
            .required("letter", ParamType::String, "The letter to count.")
            .required("text", ParamType::String, "The text in which to count the letter.")
            .blocking()],
        }
    }
}

impl Default for LetterCounterTool {
    fn default() -> Self {
        Self::new()
    }
}

pub fn count_letters(letter: &str, text: &str) -> usize {
    let letter = letter.to_lowercase();
    if letter.is_empty() {
        return 0;
    }
    text.to_lowercase().matches(letter.as_str()).count()
}

#[async_trait::async_trait]
impl Tool for LetterCounterTool {
    fn name(&self) -> &str {
        "letter_counter"
    }

    fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    fn supports(&self, style: CallStyle) -> bool {
        style == CallStyle::Blocking
    }

    fn invoke_blocking(&self, function: &str, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        match function {
            "count" => {
                let n = count_letters(args.require_str("letter")?, args.require_str("text")?);
                Ok(ToolOutput::Structured(json!(n)))
            }
            other => Err(ToolError::failed(format!("Unknown function: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_case_insensitively() {
        assert_eq!(count_letters("r", "strawberry"), 3);
        assert_eq!(count_letters("R", "StRawberry"), 3);
        assert_eq!(count_letters("", "abc"), 0);
    }
}
