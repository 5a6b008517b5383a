//! Typed tool arguments.
//!
//! Models send arguments as a loose JSON mapping. [`ToolCall::decode`] picks
//! the variant from the tool name and checks the mapping against that
//! variant's record, so the tools themselves only ever see typed values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Arguments for `read_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadArgs {
    pub path: String,
}

/// Arguments for `write_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteArgs {
    pub path: String,
    pub content: String,
}

/// Arguments for `run_command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArgs {
    pub command: String,
}

/// A tool call with arguments matching its tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ReadFile(ReadArgs),
    WriteFile(WriteArgs),
    RunCommand(RunArgs),
}

/// Why a name/arguments pair could not become a [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("arguments for {tool} must be a JSON object")]
    NotAnObject { tool: &'static str },

    #[error("{reason}")]
    Invalid { tool: &'static str, reason: String },
}

impl From<ArgsError> for crate::ToolError {
    fn from(err: ArgsError) -> Self {
        match err {
            ArgsError::UnknownTool(name) => crate::ToolError::UnknownTool(name),
            ArgsError::NotAnObject { tool } | ArgsError::Invalid { tool, .. } => {
                crate::ToolError::invalid_arguments(tool, err.to_string())
            }
        }
    }
}

impl ToolCall {
    pub const READ_FILE: &'static str = "read_file";
    pub const WRITE_FILE: &'static str = "write_file";
    pub const RUN_COMMAND: &'static str = "run_command";

    /// Every tool name the gateway knows.
    pub const NAMES: [&'static str; 3] = [Self::READ_FILE, Self::WRITE_FILE, Self::RUN_COMMAND];

    /// Decode a tool name and its JSON arguments.
    ///
    /// `null` arguments are treated as an empty object so the missing field
    /// gets named in the error.
    pub fn decode(name: &str, args: &Value) -> Result<Self, ArgsError> {
        let tool = match name {
            Self::READ_FILE => Self::READ_FILE,
            Self::WRITE_FILE => Self::WRITE_FILE,
            Self::RUN_COMMAND => Self::RUN_COMMAND,
            other => return Err(ArgsError::UnknownTool(other.to_string())),
        };

        let args = match args {
            Value::Object(_) => args.clone(),
            Value::Null => Value::Object(Default::default()),
            _ => return Err(ArgsError::NotAnObject { tool }),
        };

        let invalid = |e: serde_json::Error| ArgsError::Invalid {
            tool,
            reason: e.to_string(),
        };

        Ok(match tool {
            Self::READ_FILE => Self::ReadFile(serde_json::from_value(args).map_err(invalid)?),
            Self::WRITE_FILE => Self::WriteFile(serde_json::from_value(args).map_err(invalid)?),
            _ => Self::RunCommand(serde_json::from_value(args).map_err(invalid)?),
        })
    }

    /// The tool name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadFile(_) => Self::READ_FILE,
            Self::WriteFile(_) => Self::WRITE_FILE,
            Self::RunCommand(_) => Self::RUN_COMMAND,
        }
    }

    /// The arguments as a JSON object.
    pub fn args(&self) -> Value {
        let value = match self {
            Self::ReadFile(args) => serde_json::to_value(args),
            Self::WriteFile(args) => serde_json::to_value(args),
            Self::RunCommand(args) => serde_json::to_value(args),
        };
        // Plain string records always serialize.
        value.unwrap_or(Value::Null)
    }
}
