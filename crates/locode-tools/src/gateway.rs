//! The single entry point for tool execution.
//!
//! [`ToolGateway`] never fails: every error, rejection and denial comes back
//! as a [`ToolResponse`] whose text the model reads on its next step.

use crate::read::ReadFileTool;
use crate::run_command::RunCommandTool;
use crate::write::WriteFileTool;
use crate::{OutputEvent, Tool, ToolCall, ToolContext, ToolError, ToolResult, ToolOutput};
use locode_provider::ToolDefinition;
use locode_util::TrustedRoot;
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

/// How a tool execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    /// The tool did what was asked.
    Success,
    /// An OS failure, bad arguments or an unknown tool.
    Failed,
    /// The operator rejected the side effect.
    Declined,
    /// The path guard rejected the path.
    Denied,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Failed => "failed",
            ToolStatus::Declined => "declined",
            ToolStatus::Denied => "denied",
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text returned to the model for one tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    pub content: String,
    pub status: ToolStatus,
}

impl ToolResponse {
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

impl From<ToolResult<ToolOutput>> for ToolResponse {
    fn from(result: ToolResult<ToolOutput>) -> Self {
        match result {
            Ok(output) => Self {
                content: output.output,
                status: ToolStatus::Success,
            },
            Err(err) => {
                let status = match err {
                    ToolError::AccessDenied { .. } => ToolStatus::Denied,
                    ToolError::Declined(_) => ToolStatus::Declined,
                    _ => ToolStatus::Failed,
                };
                Self {
                    content: err.to_string(),
                    status,
                }
            }
        }
    }
}

/// Runs tools against the real filesystem and shell.
pub struct ToolGateway {
    ctx: ToolContext,
}

impl ToolGateway {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    pub fn root(&self) -> &TrustedRoot {
        &self.ctx.root
    }

    /// Definitions of every tool, in a stable order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ReadFileTool.definition(),
            WriteFileTool.definition(),
            RunCommandTool.definition(),
        ]
    }

    /// Decode and run a tool by name.
    pub async fn execute(&self, name: &str, args: &Value) -> ToolResponse {
        match ToolCall::decode(name, args) {
            Ok(call) => self.dispatch(&call).await,
            Err(err) => {
                warn!(tool = name, error = %err, "Rejected tool arguments");
                self.ctx.sink.emit(OutputEvent::ToolCall {
                    name: name.to_string(),
                    args: args.clone(),
                });
                self.finish(name, Err(err.into()))
            }
        }
    }

    /// Run an already-decoded tool call.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResponse {
        self.ctx.sink.emit(OutputEvent::ToolCall {
            name: call.name().to_string(),
            args: call.args(),
        });

        let result = match call {
            ToolCall::ReadFile(args) => ReadFileTool.execute(args, &self.ctx).await,
            ToolCall::WriteFile(args) => WriteFileTool.execute(args, &self.ctx).await,
            ToolCall::RunCommand(args) => RunCommandTool.execute(args, &self.ctx).await,
        };

        self.finish(call.name(), result)
    }

    fn finish(&self, name: &str, result: ToolResult<ToolOutput>) -> ToolResponse {
        let response = ToolResponse::from(result);
        info!(tool = name, status = %response.status, "Tool finished");

        self.ctx.sink.emit(OutputEvent::ToolResult {
            name: name.to_string(),
            status: response.status,
            content: response.content.clone(),
        });

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_unknown_tool() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);
        let gateway = ToolGateway::new(h.ctx.clone());

        let response = gateway.execute("delete_file", &json!({"path": "a"})).await;

        assert_eq!(response.content, "Unknown tool: delete_file");
        assert_eq!(response.status, ToolStatus::Failed);
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);
        let gateway = ToolGateway::new(h.ctx.clone());

        let response = gateway.execute("write_file", &json!({"path": "a.txt"})).await;

        assert_eq!(response.status, ToolStatus::Failed);
        assert!(response
            .content
            .starts_with("Error: invalid arguments for write_file: "));
        assert!(response.content.contains("content"));
        assert!(h.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_access_denied_status() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);
        let gateway = ToolGateway::new(h.ctx.clone());

        let response = gateway
            .execute("read_file", &json!({"path": "../../etc/passwd"}))
            .await;

        assert_eq!(response.status, ToolStatus::Denied);
        assert_eq!(
            response.content,
            format!(
                "Error: Access denied. Cannot read file outside of {}",
                gateway.root()
            )
        );
    }

    #[tokio::test]
    async fn test_declined_status() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), false);
        let gateway = ToolGateway::new(h.ctx.clone());

        let response = gateway
            .execute("write_file", &json!({"path": "a.txt", "content": "x"}))
            .await;

        assert_eq!(response.status, ToolStatus::Declined);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_dispatch_emits_call_and_result() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        let h = harness(dir.path(), true);
        let gateway = ToolGateway::new(h.ctx.clone());

        let response = gateway
            .dispatch(&ToolCall::ReadFile(crate::ReadArgs {
                path: "a.txt".into(),
            }))
            .await;

        assert!(response.is_success());
        assert_eq!(response.content, "alpha");
        assert_eq!(
            h.sink.events(),
            vec![
                OutputEvent::ToolCall {
                    name: "read_file".into(),
                    args: json!({"path": "a.txt"})
                },
                OutputEvent::ToolResult {
                    name: "read_file".into(),
                    status: ToolStatus::Success,
                    content: "alpha".into()
                },
            ]
        );
    }

    #[test]
    fn test_definitions() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);
        let gateway = ToolGateway::new(h.ctx.clone());

        let names: Vec<_> = gateway
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ToolCall::NAMES);

        for definition in gateway.definitions() {
            assert_eq!(definition.parameters["type"], "object");
            assert!(!definition.description.is_empty());
        }
    }
}
