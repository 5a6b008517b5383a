//! Turning an assembled model response into actions.
//!
//! Two protocols are supported. With [`Protocol::Native`] the backend's own
//! tool-calling mechanism carries tool calls and plain text is the final
//! answer. With [`Protocol::Json`] every response is a JSON action document
//! (see [`crate::action`]).

use crate::action::{parse_action, strip_fences, AgentAction, SchemaError};
use locode_provider::FinishReason;
use locode_tools::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// How the model expresses tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Backend tool calls, free text as the final answer.
    #[default]
    Native,
    /// One JSON action document per response.
    Json,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Native => "native",
            Protocol::Json => "json",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native" => Ok(Protocol::Native),
            "json" => Ok(Protocol::Json),
            other => Err(format!(
                "unknown protocol '{other}', expected 'native' or 'json'"
            )),
        }
    }
}

/// A tool call as the backend reported it, arguments still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A complete model response, assembled from the stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<RawToolCall>,
    pub finish_reason: Option<FinishReason>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// What the model said, for putting back into the conversation.
    ///
    /// Tool calls are rendered as `{"name": ..., "arguments": ...}` lines
    /// when there is no text.
    pub fn raw_text(&self) -> String {
        if !self.text.trim().is_empty() || self.tool_calls.is_empty() {
            return self.text.clone();
        }
        self.tool_calls
            .iter()
            .map(|call| {
                let mut doc = Map::new();
                doc.insert("name".into(), Value::String(call.name.clone()));
                doc.insert("arguments".into(), Value::String(call.arguments.clone()));
                Value::Object(doc).to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parses responses according to one protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionParser {
    protocol: Protocol,
}

impl ActionParser {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Parse a response into actions.
    ///
    /// The JSON protocol yields exactly one action. The native protocol
    /// yields one action per tool call, or a single finish action.
    pub fn parse(&self, response: &ModelResponse) -> Result<Vec<AgentAction>, SchemaError> {
        match self.protocol {
            Protocol::Json => parse_action(&response.text).map(|action| vec![action]),
            Protocol::Native => parse_native(response),
        }
    }

    /// The corrective user message for a failed parse.
    pub fn feedback(&self, error: &SchemaError) -> String {
        match self.protocol {
            Protocol::Json => format!(
                "{} Respond with only a raw JSON object of the form \
                 {{\"thought\": \"...\", \"action\": \"tool\", \"tool_name\": \"...\", \"tool_args\": {{...}}}} \
                 or {{\"thought\": \"...\", \"action\": \"finish\", \"final_answer\": \"...\"}}. \
                 Do not use markdown code blocks.",
                error.feedback()
            ),
            Protocol::Native => format!(
                "{} Call one of the provided tools with valid arguments, or reply with your final answer.",
                error.feedback()
            ),
        }
    }
}

fn parse_native(response: &ModelResponse) -> Result<Vec<AgentAction>, SchemaError> {
    let thought = response.text.trim();

    if !response.tool_calls.is_empty() {
        return response
            .tool_calls
            .iter()
            .map(|raw| {
                let args = decode_arguments(&raw.name, &Value::String(raw.arguments.clone()))?;
                let call = ToolCall::decode(&raw.name, &args)?;
                Ok(AgentAction::tool(thought, Some(raw.id.clone()), call))
            })
            .collect();
    }

    if thought.is_empty() {
        return Err(SchemaError::EmptyResponse);
    }

    match fallback_call(thought)? {
        Some(action) => Ok(vec![action]),
        None => Ok(vec![AgentAction::finish("", thought)]),
    }
}

/// Tool calls some models write into the content instead of using the
/// tool-calling API.
fn fallback_call(text: &str) -> Result<Option<AgentAction>, SchemaError> {
    let body = strip_fences(text);
    if !(body.starts_with('{') && body.ends_with('}')) {
        return Ok(None);
    }
    let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(body) else {
        return Ok(None);
    };

    if doc.contains_key("action") || doc.contains_key("decision") {
        return parse_action(body).map(Some);
    }

    match (doc.get("name"), doc.get("arguments")) {
        (Some(Value::String(name)), Some(arguments)) => {
            let args = decode_arguments(name, arguments)?;
            let call = ToolCall::decode(name, &args)?;
            Ok(Some(AgentAction::tool("", None, call)))
        }
        _ => Ok(None),
    }
}

/// Arguments arrive either as an object or as a JSON-encoded string.
fn decode_arguments(tool: &str, arguments: &Value) -> Result<Value, SchemaError> {
    match arguments {
        Value::String(text) if text.trim().is_empty() => Ok(Value::Object(Map::new())),
        Value::String(text) => {
            serde_json::from_str(text).map_err(|e| SchemaError::InvalidToolCall {
                tool: tool.to_string(),
                reason: format!("arguments are not valid JSON: {e}"),
            })
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Decision, ToolInvocation};
    use locode_tools::{ReadArgs, RunArgs, WriteArgs};

    fn tool_call(id: &str, name: &str, arguments: &str) -> RawToolCall {
        RawToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("native".parse::<Protocol>().unwrap(), Protocol::Native);
        assert_eq!("JSON".parse::<Protocol>().unwrap(), Protocol::Json);
        assert!("xml".parse::<Protocol>().is_err());
        assert_eq!(Protocol::default(), Protocol::Native);
    }

    #[test]
    fn test_native_tool_calls() {
        let parser = ActionParser::new(Protocol::Native);
        let response = ModelResponse {
            text: String::new(),
            tool_calls: vec![
                tool_call("call_1", "read_file", r#"{"path": "a.txt"}"#),
                tool_call("call_2", "run_command", r#"{"command": "ls"}"#),
            ],
            finish_reason: Some(FinishReason::ToolUse),
        };

        let actions = parser.parse(&response).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0].decision,
            Decision::Tool(ToolInvocation {
                id: Some("call_1".into()),
                call: ToolCall::ReadFile(ReadArgs {
                    path: "a.txt".into()
                }),
            })
        );
        assert_eq!(
            actions[1].decision,
            Decision::Tool(ToolInvocation {
                id: Some("call_2".into()),
                call: ToolCall::RunCommand(RunArgs {
                    command: "ls".into()
                }),
            })
        );
    }

    #[test]
    fn test_native_text_is_final_answer() {
        let parser = ActionParser::new(Protocol::Native);
        let actions = parser
            .parse(&ModelResponse::text("  The file says hello.\n"))
            .unwrap();
        assert_eq!(actions, vec![AgentAction::finish("", "The file says hello.")]);
    }

    #[test]
    fn test_native_empty_response() {
        let parser = ActionParser::new(Protocol::Native);
        assert_eq!(
            parser.parse(&ModelResponse::text("   ")).unwrap_err(),
            SchemaError::EmptyResponse
        );
    }

    #[test]
    fn test_native_fallback_in_content() {
        let parser = ActionParser::new(Protocol::Native);
        let response = ModelResponse::text(
            r#"{"name": "write_file", "arguments": {"path": "hello.txt", "content": "Hi"}}"#,
        );

        let actions = parser.parse(&response).unwrap();
        assert_eq!(
            actions,
            vec![AgentAction::tool(
                "",
                None,
                ToolCall::WriteFile(WriteArgs {
                    path: "hello.txt".into(),
                    content: "Hi".into()
                })
            )]
        );
    }

    #[test]
    fn test_native_fallback_with_fence_and_string_arguments() {
        let parser = ActionParser::new(Protocol::Native);
        let response = ModelResponse::text(
            "```json\n{\"name\": \"read_file\", \"arguments\": \"{\\\"path\\\": \\\"a.txt\\\"}\"}\n```",
        );

        let actions = parser.parse(&response).unwrap();
        assert_eq!(
            actions,
            vec![AgentAction::tool(
                "",
                None,
                ToolCall::ReadFile(ReadArgs {
                    path: "a.txt".into()
                })
            )]
        );
    }

    #[test]
    fn test_native_fallback_accepts_action_document() {
        let parser = ActionParser::new(Protocol::Native);
        let response =
            ModelResponse::text(r#"{"thought": "t", "action": "finish", "final_answer": "ok"}"#);
        assert_eq!(
            parser.parse(&response).unwrap(),
            vec![AgentAction::finish("t", "ok")]
        );
    }

    #[test]
    fn test_native_json_without_call_shape_is_an_answer() {
        let parser = ActionParser::new(Protocol::Native);
        let response = ModelResponse::text(r#"{"version": "1.0"}"#);
        assert_eq!(
            parser.parse(&response).unwrap(),
            vec![AgentAction::finish("", r#"{"version": "1.0"}"#)]
        );
    }

    #[test]
    fn test_native_bad_arguments() {
        let parser = ActionParser::new(Protocol::Native);
        let response = ModelResponse {
            tool_calls: vec![tool_call("call_1", "read_file", "{not json")],
            ..Default::default()
        };
        assert!(matches!(
            parser.parse(&response).unwrap_err(),
            SchemaError::InvalidToolCall { .. }
        ));

        let response = ModelResponse {
            tool_calls: vec![tool_call("call_1", "delete_file", "{}")],
            ..Default::default()
        };
        assert_eq!(
            parser.parse(&response).unwrap_err(),
            SchemaError::UnknownTool("delete_file".into())
        );
    }

    #[test]
    fn test_json_protocol() {
        let parser = ActionParser::new(Protocol::Json);
        let actions = parser
            .parse(&ModelResponse::text(
                r#"{"thought": "t", "action": "finish", "final_answer": "done"}"#,
            ))
            .unwrap();
        assert_eq!(actions, vec![AgentAction::finish("t", "done")]);

        // Plain prose is not an answer in the JSON protocol.
        assert!(matches!(
            parser.parse(&ModelResponse::text("Sure, here you go")),
            Err(SchemaError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_feedback_per_protocol() {
        let error = SchemaError::EmptyResponse;
        assert!(ActionParser::new(Protocol::Json)
            .feedback(&error)
            .contains("raw JSON object"));
        assert!(ActionParser::new(Protocol::Native)
            .feedback(&error)
            .contains("provided tools"));
    }

    #[test]
    fn test_raw_text_renders_tool_calls() {
        let response = ModelResponse {
            tool_calls: vec![tool_call("c", "read_file", "{bad")],
            ..Default::default()
        };
        let rendered: Value = serde_json::from_str(&response.raw_text()).unwrap();
        assert_eq!(rendered["name"], "read_file");
        assert_eq!(rendered["arguments"], "{bad");
        assert_eq!(ModelResponse::text("hi").raw_text(), "hi");
    }
}
