//! read_file - return the contents of a file inside the trusted root.

use crate::{ReadArgs, Tool, ToolContext, ToolError, ToolOutput, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Maximum file size to read (10MB).
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Bytes inspected when deciding whether a file is binary.
const BINARY_SAMPLE: usize = 8192;

/// Read a whole file.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    type Args = ReadArgs;

    fn id(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file. The path is relative to the current working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to read"
                }
            }
        })
    }

    async fn execute(&self, args: &ReadArgs, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let Some(file_path) = ctx.root.resolve(&args.path) else {
            warn!(path = %args.path, "Attempted to read file outside trusted root");
            return Err(ToolError::access_denied("read", &ctx.root));
        };

        let metadata = tokio::fs::metadata(&file_path)
            .await
            .map_err(ToolError::read)?;

        if metadata.is_dir() {
            return Err(ToolError::read(format!("{} is a directory", args.path)));
        }

        if metadata.len() > MAX_FILE_SIZE {
            return Err(ToolError::read(format!(
                "file too large ({} bytes). Maximum allowed size is {} bytes.",
                metadata.len(),
                MAX_FILE_SIZE
            )));
        }

        let bytes = tokio::fs::read(&file_path).await.map_err(ToolError::read)?;

        let sample_size = std::cmp::min(bytes.len(), BINARY_SAMPLE);
        if bytes[..sample_size].contains(&0) {
            return Err(ToolError::read(format!(
                "{} appears to be a binary file ({} bytes) and cannot be shown as text",
                args.path,
                bytes.len()
            )));
        }

        debug!(path = %args.path, bytes = bytes.len(), "Read file");

        let content = String::from_utf8_lossy(&bytes).into_owned();
        Ok(
            ToolOutput::new(format!("Read {}", args.path), content).with_metadata(json!({
                "bytes": bytes.len(),
                "path": args.path
            })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use tempfile::tempdir;

    fn args(path: &str) -> ReadArgs {
        ReadArgs {
            path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn test_read_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "line 1\nline 2\n").unwrap();
        let h = harness(dir.path(), true);

        let result = ReadFileTool.execute(&args("notes.txt"), &h.ctx).await.unwrap();

        assert_eq!(result.output, "line 1\nline 2\n");
        assert_eq!(result.metadata["bytes"], 14);
        // Reads never ask for approval.
        assert!(h.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_read_outside_root_denied() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);

        let err = ReadFileTool
            .execute(&args("../../etc/passwd"), &h.ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::AccessDenied { action: "read", .. }));
        assert_eq!(
            err.to_string(),
            format!(
                "Error: Access denied. Cannot read file outside of {}",
                h.ctx.root
            )
        );
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let h = harness(dir.path(), true);

        let err = ReadFileTool
            .execute(&args("missing.txt"), &h.ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Read(_)));
        assert!(err.to_string().starts_with("Error reading file: "));
    }

    #[tokio::test]
    async fn test_read_directory() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let h = harness(dir.path(), true);

        let err = ReadFileTool.execute(&args("src"), &h.ctx).await.unwrap_err();
        assert!(err.to_string().contains("is a directory"));
    }

    #[tokio::test]
    async fn test_read_binary_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("image.bin"), [0x89, b'P', 0, 0, 1]).unwrap();
        let h = harness(dir.path(), true);

        let err = ReadFileTool
            .execute(&args("image.bin"), &h.ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("binary"));
    }
}
