//! run_command - execute a shell command after operator approval.
//!
//! The command runs in the trusted root with stdin closed and both output
//! streams captured separately. It is killed when the timeout elapses or
//! the future is dropped.

use crate::{OutputEvent, RunArgs, Tool, ToolContext, ToolError, ToolOutput, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Maximum output size in bytes before truncation.
const MAX_OUTPUT_SIZE: usize = 30_000;

const RUN_PROMPT: &str = "Do you want to run this command?";

/// Execute shell commands.
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    type Args = RunArgs;

    fn id(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Run a shell command in the current working directory and return its STDOUT, STDERR and exit code. The user is asked to approve every command."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            }
        })
    }

    async fn execute(&self, args: &RunArgs, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let command = args.command.trim();
        if command.is_empty() {
            return Err(ToolError::invalid_arguments(self.id(), "command is empty"));
        }

        ctx.sink.emit(OutputEvent::Command(command.to_string()));

        if !ctx.gate.confirm(RUN_PROMPT).await {
            info!(command, "Command declined");
            return Err(ToolError::declined("command execution."));
        }

        let (exit_code, stdout, stderr) =
            run_shell(command, ctx.root.path(), ctx.command_timeout).await?;

        let output = format!("STDOUT: {stdout}\nSTDERR: {stderr}\nEXIT CODE: {exit_code}");
        let (output, truncated) = truncate_output(&output, MAX_OUTPUT_SIZE);
        if truncated {
            warn!(command, "Output truncated to {} bytes", MAX_OUTPUT_SIZE);
        }

        Ok(ToolOutput::new(truncate_command(command), output).with_metadata(json!({
            "exit_code": exit_code,
            "truncated": truncated
        })))
    }
}

fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Run `command` and collect `(exit code, stdout, stderr)`.
///
/// A process killed by a signal reports exit code -1.
async fn run_shell(
    command: &str,
    workdir: &Path,
    timeout: Duration,
) -> ToolResult<(i32, String, String)> {
    let mut cmd = shell(command);
    cmd.current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Avoid interactive prompts and escape codes.
    cmd.env("TERM", "dumb");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd.env("NO_COLOR", "1");

    debug!(command, workdir = %workdir.display(), "Spawning command");

    let mut child = cmd
        .spawn()
        .map_err(|e| ToolError::execution_failed(format!("failed to spawn process: {e}")))?;

    let result = tokio::time::timeout(timeout, async {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Read both pipes concurrently so neither fills up and blocks the child.
        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(mut stdout) = stdout {
                stdout.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };

        let (stdout_bytes, stderr_bytes, status) =
            tokio::try_join!(read_stdout, read_stderr, child.wait())?;

        Ok::<_, std::io::Error>((status, stdout_bytes, stderr_bytes))
    })
    .await;

    match result {
        Ok(Ok((status, stdout_bytes, stderr_bytes))) => Ok((
            status.code().unwrap_or(-1),
            String::from_utf8_lossy(&stdout_bytes).into_owned(),
            String::from_utf8_lossy(&stderr_bytes).into_owned(),
        )),
        Ok(Err(e)) => Err(ToolError::execution_failed(format!("process error: {e}"))),
        Err(_) => {
            // The child is killed when it is dropped.
            warn!(command, ?timeout, "Command timed out");
            Err(ToolError::Timeout(timeout))
        }
    }
}

/// Truncate command for display in title.
fn truncate_command(cmd: &str) -> String {
    let first_line = cmd.lines().next().unwrap_or(cmd);
    if first_line.chars().count() > 50 {
        let cut: String = first_line.chars().take(47).collect();
        format!("{cut}...")
    } else {
        first_line.to_string()
    }
}

/// Largest char boundary at or below `index`.
fn floor_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Smallest char boundary at or above `index`.
fn ceil_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Truncate output if too long, keeping the head and the tail.
fn truncate_output(output: &str, max_size: usize) -> (String, bool) {
    if output.len() <= max_size {
        return (output.to_string(), false);
    }

    let keep_start = floor_boundary(output, max_size * 2 / 3);
    let keep_end = max_size.saturating_sub(keep_start + 100); // Leave room for truncation message

    let start = &output[..keep_start];
    let end_start = ceil_boundary(output, output.len() - keep_end);
    let end = &output[end_start..];

    let truncated = format!(
        "{}\n\n... [truncated {} bytes] ...\n\n{}",
        start,
        end_start - keep_start,
        end
    );

    (truncated, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use tempfile::tempdir;

    fn args(command: &str) -> RunArgs {
        RunArgs {
            command: command.to_string(),
        }
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore)]
    async fn test_simple_command() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);

        let result = RunCommandTool
            .execute(&args("echo hello"), &h.ctx)
            .await
            .unwrap();

        assert_eq!(result.output, "STDOUT: hello\n\nSTDERR: \nEXIT CODE: 0");
        assert_eq!(h.prompts(), vec![RUN_PROMPT.to_string()]);
        assert_eq!(
            h.sink.events(),
            vec![OutputEvent::Command("echo hello".into())]
        );
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore)]
    async fn test_non_zero_exit_keeps_both_streams() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);

        let result = RunCommandTool
            .execute(&args("echo out; echo err >&2; exit 3"), &h.ctx)
            .await
            .unwrap();

        assert_eq!(result.output, "STDOUT: out\n\nSTDERR: err\n\nEXIT CODE: 3");
        assert_eq!(result.metadata["exit_code"], 3);
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore)]
    async fn test_no_output_gives_empty_sections() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);

        let result = RunCommandTool.execute(&args("true"), &h.ctx).await.unwrap();
        assert_eq!(result.output, "STDOUT: \nSTDERR: \nEXIT CODE: 0");
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore)]
    async fn test_runs_in_trusted_root() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);

        RunCommandTool
            .execute(&args("echo marker > created.txt"), &h.ctx)
            .await
            .unwrap();
        assert!(dir.path().join("created.txt").exists());
    }

    #[tokio::test]
    async fn test_declined_command_does_not_run() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), false);

        let err = RunCommandTool
            .execute(&args("echo marker > created.txt"), &h.ctx)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Declined: user cancelled command execution.");
        assert!(!dir.path().join("created.txt").exists());
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore)]
    async fn test_command_timeout() {
        let dir = tempdir().unwrap();
        let mut h = harness(dir.path(), true);
        h.ctx = h.ctx.with_command_timeout(Duration::from_millis(100));

        let err = RunCommandTool
            .execute(&args("sleep 10"), &h.ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Timeout(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);

        let err = RunCommandTool.execute(&args("   "), &h.ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert!(h.prompts().is_empty());
    }

    #[test]
    fn test_truncate_output() {
        let short = "short output";
        assert_eq!(truncate_output(short, 100), (short.to_string(), false));

        let long = format!("{}{}", "a".repeat(40_000), "z".repeat(10));
        let (output, truncated) = truncate_output(&long, MAX_OUTPUT_SIZE);
        assert!(truncated);
        assert!(output.len() < long.len());
        assert!(output.starts_with("aaaa"));
        assert!(output.ends_with("zzzzzzzzzz"));
        assert!(output.contains("[truncated"));
    }

    #[test]
    fn test_truncate_output_multibyte() {
        let long = "ü".repeat(20_000);
        let (output, truncated) = truncate_output(&long, MAX_OUTPUT_SIZE);
        assert!(truncated);
        assert!(output.contains("[truncated"));
    }

    #[test]
    fn test_truncate_command() {
        assert_eq!(truncate_command("ls -la"), "ls -la");
        let long = "x".repeat(80);
        assert_eq!(truncate_command(&long).chars().count(), 50);
        assert_eq!(truncate_command("echo a\necho b"), "echo a");
    }
}
