//! The structured action the model produces on every turn.
//!
//! In the text protocol the model answers with a JSON document:
//!
//! ```json
//! {"thought": "...", "action": "tool", "tool_name": "read_file", "tool_args": {"path": "a.txt"}}
//! {"thought": "...", "action": "finish", "final_answer": "..."}
//! ```
//!
//! [`parse_action`] turns that document into an [`AgentAction`], naming the
//! violated constraint when it cannot.

use locode_tools::{ArgsError, ToolCall};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// One decision by the model, with its reasoning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAction {
    pub thought: String,
    pub decision: Decision,
}

/// Either run a tool or stop with an answer, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Tool(ToolInvocation),
    Finish(String),
}

/// A decoded tool call.
///
/// `id` is set when the backend issued a native tool call, and is echoed back
/// with the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub id: Option<String>,
    pub call: ToolCall,
}

/// Why a model response could not become an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("the response was empty")]
    EmptyResponse,

    #[error("the response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("missing required field `{field}`{}", for_decision(.decision))]
    MissingField {
        field: &'static str,
        decision: Option<&'static str>,
    },

    #[error("field `{field}` is not allowed when action is `{decision}`")]
    UnexpectedField {
        field: &'static str,
        decision: &'static str,
    },

    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("unknown action `{0}`, expected `tool` or `finish`")]
    UnknownDecision(String),

    #[error("fields `action` and `decision` disagree (`{action}` vs `{decision}`)")]
    ConflictingDecision { action: String, decision: String },

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidToolCall { tool: String, reason: String },

    #[error("unknown tool `{0}`, available tools are read_file, write_file and run_command")]
    UnknownTool(String),
}

fn for_decision(decision: &Option<&'static str>) -> String {
    match decision {
        Some(decision) => format!(" when action is `{decision}`"),
        None => String::new(),
    }
}

impl SchemaError {
    /// The corrective message sent back to the model.
    pub fn feedback(&self) -> String {
        format!("Error: your last response could not be used: {self}. Please try again.")
    }
}

impl From<ArgsError> for SchemaError {
    fn from(err: ArgsError) -> Self {
        match err {
            ArgsError::UnknownTool(name) => SchemaError::UnknownTool(name),
            ArgsError::NotAnObject { tool } | ArgsError::Invalid { tool, .. } => {
                SchemaError::InvalidToolCall {
                    tool: tool.to_string(),
                    reason: err.to_string(),
                }
            }
        }
    }
}

const TOOL: &str = "tool";
const FINISH: &str = "finish";

impl AgentAction {
    /// A tool action.
    pub fn tool(thought: impl Into<String>, id: Option<String>, call: ToolCall) -> Self {
        Self {
            thought: thought.into(),
            decision: Decision::Tool(ToolInvocation { id, call }),
        }
    }

    /// A finish action.
    pub fn finish(thought: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            decision: Decision::Finish(answer.into()),
        }
    }

    /// The text-protocol document for this action.
    pub fn to_json(&self) -> Value {
        match &self.decision {
            Decision::Tool(invocation) => json!({
                "thought": self.thought,
                "action": TOOL,
                "tool_name": invocation.call.name(),
                "tool_args": invocation.call.args(),
            }),
            Decision::Finish(answer) => json!({
                "thought": self.thought,
                "action": FINISH,
                "final_answer": answer,
            }),
        }
    }
}

/// Remove a surrounding markdown code fence, if any.
///
/// The opening fence may carry a language tag (```` ```json ````). Either
/// fence may be missing.
pub fn strip_fences(raw: &str) -> &str {
    let mut body = raw.trim();

    if let Some(rest) = body.strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+')))
            .unwrap_or(rest.len());
        let after_tag = &rest[tag_len..];
        let tag_ends = after_tag.starts_with(|c: char| c.is_whitespace() || c == '{' || c == '[');
        body = if tag_len > 0 && tag_ends {
            after_tag
        } else {
            rest
        };
    }

    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }

    body.trim()
}

/// Parse a text-protocol response into an action.
///
/// Unknown extra fields are ignored. `null` counts as absent.
pub fn parse_action(raw: &str) -> Result<AgentAction, SchemaError> {
    let body = strip_fences(raw);
    if body.is_empty() {
        return Err(SchemaError::EmptyResponse);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| SchemaError::InvalidJson(e.to_string()))?;
    let Value::Object(doc) = value else {
        return Err(SchemaError::InvalidJson("expected a JSON object".to_string()));
    };

    let thought = match field(&doc, "thought") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(SchemaError::WrongType {
                field: "thought",
                expected: "a string",
            })
        }
        None => {
            return Err(SchemaError::MissingField {
                field: "thought",
                decision: None,
            })
        }
    };

    if let (Some(Value::String(action)), Some(Value::String(decision))) =
        (field(&doc, "action"), field(&doc, "decision"))
    {
        if action != decision {
            return Err(SchemaError::ConflictingDecision {
                action: action.clone(),
                decision: decision.clone(),
            });
        }
    }

    let decision = match field(&doc, "action").or_else(|| field(&doc, "decision")) {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => return Err(SchemaError::UnknownDecision(other.to_string())),
        None => {
            return Err(SchemaError::MissingField {
                field: "action",
                decision: None,
            })
        }
    };

    match decision {
        TOOL => {
            if field(&doc, "final_answer").is_some() {
                return Err(SchemaError::UnexpectedField {
                    field: "final_answer",
                    decision: TOOL,
                });
            }
            let name = match field(&doc, "tool_name") {
                Some(Value::String(s)) => s,
                Some(_) => {
                    return Err(SchemaError::WrongType {
                        field: "tool_name",
                        expected: "a string",
                    })
                }
                None => {
                    return Err(SchemaError::MissingField {
                        field: "tool_name",
                        decision: Some(TOOL),
                    })
                }
            };
            let args = field(&doc, "tool_args").ok_or(SchemaError::MissingField {
                field: "tool_args",
                decision: Some(TOOL),
            })?;
            let call = ToolCall::decode(name, args)?;
            Ok(AgentAction::tool(thought, None, call))
        }
        FINISH => {
            for name in ["tool_name", "tool_args"] {
                if field(&doc, name).is_some() {
                    return Err(SchemaError::UnexpectedField {
                        field: name,
                        decision: FINISH,
                    });
                }
            }
            match field(&doc, "final_answer") {
                Some(Value::String(answer)) => Ok(AgentAction::finish(thought, answer.clone())),
                Some(_) => Err(SchemaError::WrongType {
                    field: "final_answer",
                    expected: "a string",
                }),
                None => Err(SchemaError::MissingField {
                    field: "final_answer",
                    decision: Some(FINISH),
                }),
            }
        }
        other => Err(SchemaError::UnknownDecision(other.to_string())),
    }
}

fn field<'a>(doc: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    doc.get(name).filter(|v| !v.is_null())
}
