//! System prompt generation.

use crate::parser::Protocol;
use locode_provider::ToolDefinition;
use std::path::Path;

/// Prompt for backends with native tool calling.
pub const NATIVE_PROMPT: &str = r#"You are a helpful AI coding assistant.
You can read files, write files, and run commands.
Always use the provided tools to interact with the system.
If you use a tool, output ONLY the JSON object for the tool call.
Do NOT use markdown code blocks like ```python or ```json for the tool call.
Just output the raw JSON object.
When the task is done, reply with your final answer as plain text."#;

/// Prompt for the JSON action protocol.
pub const JSON_PROMPT: &str = r#"You are a helpful AI coding assistant.
You can read files, write files, and run commands.

Every reply MUST be a single raw JSON object and nothing else.
Do NOT use markdown code blocks like ```json around it.

To use a tool, reply with:
{"thought": "<your reasoning>", "action": "tool", "tool_name": "<tool>", "tool_args": {<arguments>}}

When the task is done, reply with:
{"thought": "<your reasoning>", "action": "finish", "final_answer": "<answer for the user>"}

Use exactly one tool per reply. The result of the tool is sent back to you in the next message."#;

/// Describe the tools for the JSON protocol, which has no tool declaration.
pub fn tool_catalog(tools: &[ToolDefinition]) -> String {
    let mut catalog = String::from("Available tools:");
    for tool in tools {
        catalog.push_str(&format!(
            "\n- {}: {}\n  Arguments (JSON Schema): {}",
            tool.name, tool.description, tool.parameters
        ));
    }
    catalog
}

/// Generate environment context for the system prompt.
pub fn environment_context(directory: &Path, platform: &str) -> String {
    let is_git_repo = directory.join(".git").exists();
    format!(
        r#"Here is some useful information about the environment you are running in:
<env>
  Working directory: {}
  Is directory a git repo: {}
  Platform: {}
</env>
File paths must stay inside the working directory."#,
        directory.display(),
        if is_git_repo { "yes" } else { "no" },
        platform,
    )
}

/// Build the complete system prompt.
pub fn build_system_prompt(
    protocol: Protocol,
    tools: &[ToolDefinition],
    custom_instructions: Option<&str>,
    environment: &str,
) -> String {
    let mut parts = Vec::new();

    match protocol {
        Protocol::Native => parts.push(NATIVE_PROMPT.to_string()),
        Protocol::Json => {
            parts.push(JSON_PROMPT.to_string());
            parts.push(tool_catalog(tools));
        }
    }

    if let Some(custom) = custom_instructions {
        parts.push(custom.to_string());
    }

    parts.push(environment.to_string());

    parts.join("\n\n")
}
