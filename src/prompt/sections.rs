//! 默认段落文本

use chrono::Local;

pub fn agent_role(name: &str) -> String {
    let name = if name.trim().is_empty() { "an AI agent" } else { name };
    format!(
        "You are {}, a capable assistant that completes the user's task step by step, \
         using the available tools when they help.",
        name
    )
}

pub fn objective(objective: &str) -> String {
    format!("OBJECTIVE\n\n{}", objective)
}

pub fn context(extra: Option<&str>) -> String {
    let now = Local::now();
    let mut out = format!(
        "Here are the additional contexts:\nCurrent local time: {}\nCurrent timezone: UTC{}\n",
        now.format("%Y-%m-%d %H:%M:%S"),
        now.format("%:z")
    );
    if let Some(extra) = extra.filter(|s| !s.trim().is_empty()) {
        out.push_str(extra);
        out.push('\n');
    }
    out
}

pub fn rules(allow_interaction: bool) -> String {
    let interaction = if allow_interaction {
        "  - If you need to ask the user a follow-up question, use the `system.user_interaction` tool following tool use format."
    } else {
        "  - Do not ask follow-up questions, use your best judgement."
    };
    format!(
        r#"RULES

You must follow these rules:

1. In every response, you must include a <title> tag that summarizes your response in less than 10 words. This title will be used as both the subject line to the user and as the unique identifier for the message in the conversation history. The title should be unique, concise and descriptive of the content of your response.
  - To make the title unique, you are allowed to use numbers, dates, or other specific details relevant to the content of your response. For example, "request document set 1", "found bug in file X", "completed task on 2024-10-01".
2. You must always respond in valid XML format, using the specified tags for structure. Each tag must be properly opened and closed, and nested correctly.
  - Include your thinking in the <thinking> tag.
  - Use the <tool_use> tag to specify any tool you want to use, following the TOOL USE format.
  - If you are presenting the final result of the task, use the <result> tag.
{interaction}
  - Put your conclusions in the <result> tag.
"#
    )
}

pub fn tool_use(tool_descriptions: &str, allow_interaction: bool) -> String {
    let interaction = if allow_interaction {
        "7. If you need to initiate any user interactions (like asking questions or seeking clarifications), you need to explicitly call the `system.user_interaction` tool, otherwise users will not be prompted for input.\n"
    } else {
        ""
    };
    format!(
        r#"TOOL USE

You have access to a set of tools that are executed upon the user's approval. You can use one tool per message, and will receive the result of that tool use in the user's response. You use tools step-by-step to accomplish a given task, with each tool use informed by the result of the previous tool use.

# Tool Use Formatting

Tool use is formatted using XML-style tags for the structure, with JSON for the arguments to properly handle special characters, code, and complex data:

<tool_use>
<name>tool_name.function_name</name>
<arguments>
{{
  "parameter1_name": "value1",
  "parameter2_name": "value2"
}}
</arguments>
</tool_use>

IMPORTANT:
- If the tool does not have arguments, the arguments section can be omitted. If present, the arguments must be valid JSON.
- JSON automatically handles special characters including <, >, &, quotes, newlines, etc.
- Use \n for newlines, \" for escaped quotes, \\ for backslashes

Always adhere to this format for the tool use to ensure proper parsing and execution.

# Tools

{tool_descriptions}

# Tool Use Examples

## Example 1: Counting letters

<tool_use>
<name>letter_counter.count</name>
<arguments>
{{
  "letter": "r",
  "text": "strawberry"
}}
</arguments>
</tool_use>

## Example 2: Get current time (no arguments)

<tool_use>
<name>mcp.local_time.get_local_time</name>
</tool_use>

# Tool Use Guidelines

1. In <thinking> tags, assess what information you already have and what information you need to proceed with the task.
2. Choose the most appropriate tool based on the task and the tool descriptions provided. Assess if you need additional information to proceed, and which of the available tools would be most effective for gathering this information.
3. If multiple actions are needed, use one tool at a time per message to accomplish the task iteratively, with each tool use being informed by the result of the previous tool use. Do not assume the outcome of any tool use.
4. Formulate your tool use using the XML format specified above.
5. After each tool use, the user will respond with the result of that tool use, labeled `[tool_name.function_name#call_id] Result:`. It tells you whether the tool succeeded or failed and provides the information you need to continue.
6. ALWAYS wait for the result after each tool use before proceeding. Never assume the success of a tool use without explicit confirmation.
{interaction}
It is crucial to proceed step-by-step, waiting for the result after each tool use before moving forward with the task.
"#
    )
}
