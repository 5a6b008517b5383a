//! Tool implementations for locode.
//!
//! The model can call three tools: `read_file`, `write_file` and
//! `run_command`. All of them go through [`ToolGateway`], which turns every
//! outcome into text the model can read.

pub mod args;
pub mod confirm;
pub mod error;
pub mod gateway;
pub mod output;

// Tool implementations
pub mod read;
pub mod run_command;
pub mod write;

pub use args::{ArgsError, ReadArgs, RunArgs, ToolCall, WriteArgs};
pub use confirm::{ConfirmPolicy, ConfirmationGate, PolicyGate};
pub use error::{ToolError, ToolResult};
pub use gateway::{ToolGateway, ToolResponse, ToolStatus};
pub use output::{CapturingSink, NullSink, OutputEvent, OutputSink};

use async_trait::async_trait;
use locode_provider::ToolDefinition;
use locode_util::TrustedRoot;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for `run_command`.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Context provided to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    /// Directory that file tools may not leave. Commands run here.
    pub root: TrustedRoot,
    /// Approval for writes and commands.
    pub gate: Arc<dyn ConfirmationGate>,
    /// Where diffs, previews and commands are shown.
    pub sink: Arc<dyn OutputSink>,
    /// Upper bound for a single command.
    pub command_timeout: Duration,
}

impl ToolContext {
    /// Create a context with the default command timeout.
    pub fn new(
        root: TrustedRoot,
        gate: Arc<dyn ConfirmationGate>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            root,
            gate,
            sink,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Result of tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Title/summary of the operation.
    pub title: String,
    /// Output text.
    pub output: String,
    /// Tool-specific metadata.
    pub metadata: Value,
}

impl ToolOutput {
    /// Create a new tool output.
    pub fn new(title: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: output.into(),
            metadata: Value::Null,
        }
    }

    /// Add metadata to the output.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The main trait for tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Typed arguments, decoded by [`ToolCall::decode`].
    type Args: Send + Sync;

    /// Get the tool ID.
    fn id(&self) -> &'static str;

    /// Get the tool description (for the model).
    fn description(&self) -> &'static str;

    /// Get the JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool.
    async fn execute(&self, args: &Self::Args, ctx: &ToolContext) -> ToolResult<ToolOutput>;

    /// Definition sent to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.id().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Answers every prompt the same way and remembers the prompts.
    pub struct FixedGate {
        answer: bool,
        pub prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ConfirmationGate for FixedGate {
        async fn confirm(&self, prompt: &str) -> bool {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answer
        }
    }

    pub struct Harness {
        pub ctx: ToolContext,
        pub gate: Arc<FixedGate>,
        pub sink: Arc<CapturingSink>,
    }

    impl Harness {
        pub fn prompts(&self) -> Vec<String> {
            self.gate.prompts.lock().unwrap().clone()
        }
    }

    pub fn harness(root: &std::path::Path, approve: bool) -> Harness {
        let gate = Arc::new(FixedGate {
            answer: approve,
            prompts: Mutex::new(Vec::new()),
        });
        let sink = Arc::new(CapturingSink::new());
        let ctx = ToolContext::new(TrustedRoot::new(root).unwrap(), gate.clone(), sink.clone());
        Harness { ctx, gate, sink }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_output_with_metadata() {
        let output =
            ToolOutput::new("Read a.txt", "hello").with_metadata(json!({"bytes": 5}));
        assert_eq!(output.title, "Read a.txt");
        assert_eq!(output.output, "hello");
        assert_eq!(output.metadata["bytes"], 5);
    }

    #[test]
    fn test_context_timeout_override() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(
            TrustedRoot::new(dir.path()).unwrap(),
            Arc::new(PolicyGate::new(ConfirmPolicy::Deny)),
            Arc::new(NullSink),
        );
        assert_eq!(ctx.command_timeout, DEFAULT_COMMAND_TIMEOUT);

        let ctx = ctx.with_command_timeout(Duration::from_secs(5));
        assert_eq!(ctx.command_timeout, Duration::from_secs(5));
    }
}
