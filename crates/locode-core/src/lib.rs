//! Core logic for locode.
//!
//! This crate turns model output into validated actions and drives the
//! conversation:
//! - [`action`]: the structured action and the text protocol
//! - [`parser`]: protocol selection and response parsing
//! - [`agent`]: the conversation loop
//! - [`config`]: layered configuration
//! - [`system_prompt`]: prompts for each protocol

pub mod action;
pub mod agent;
pub mod config;
pub mod error;
pub mod parser;
pub mod system_prompt;

pub use action::{parse_action, AgentAction, Decision, SchemaError, ToolInvocation};
pub use agent::{AgentConfig, LocodeAgent, LoopState};
pub use config::Config;
pub use error::{AgentError, AgentResult, ConfigError};
pub use parser::{ActionParser, ModelResponse, Protocol, RawToolCall};
