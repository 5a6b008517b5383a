//! write_file - create or overwrite a file after operator approval.

use crate::{OutputEvent, Tool, ToolContext, ToolError, ToolOutput, ToolResult, WriteArgs};
use async_trait::async_trait;
use serde_json::{json, Value};
use similar::{ChangeTag, TextDiff};
use std::path::Path;
use tracing::{debug, info, warn};

/// Characters of new content shown before creating a file.
pub const PREVIEW_CHARS: usize = 500;

const OVERWRITE_PROMPT: &str = "Do you want to overwrite this file?";
const CREATE_PROMPT: &str = "Do you want to create this file?";

/// Write a whole file.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    type Args = WriteArgs;

    fn id(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file, creating it (and missing parent directories) or overwriting it. The user is asked to approve every write."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The full content of the file"
                }
            }
        })
    }

    async fn execute(&self, args: &WriteArgs, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let Some(file_path) = ctx.root.resolve(&args.path) else {
            warn!(path = %args.path, "Attempted to write file outside trusted root");
            return Err(ToolError::access_denied("write", &ctx.root));
        };

        let existing = match tokio::fs::metadata(&file_path).await {
            Ok(metadata) if metadata.is_dir() => {
                return Err(ToolError::write(format!("{} is a directory", args.path)));
            }
            Ok(_) => {
                let bytes = tokio::fs::read(&file_path).await.map_err(ToolError::write)?;
                Some(String::from_utf8_lossy(&bytes).into_owned())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(ToolError::write(e)),
        };

        let prompt = match &existing {
            Some(old) => {
                let diff = generate_diff(old, &args.content, Path::new(&args.path));
                ctx.sink.emit(OutputEvent::Diff {
                    path: args.path.clone(),
                    diff,
                });
                OVERWRITE_PROMPT
            }
            None => {
                ctx.sink.emit(OutputEvent::Preview {
                    path: args.path.clone(),
                    preview: preview(&args.content),
                });
                CREATE_PROMPT
            }
        };

        if !ctx.gate.confirm(prompt).await {
            info!(path = %args.path, "Write declined");
            return Err(ToolError::declined(format!(
                "file write/creation of {}",
                args.path
            )));
        }

        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ToolError::write)?;
        }

        tokio::fs::write(&file_path, &args.content)
            .await
            .map_err(ToolError::write)?;

        debug!(path = %args.path, bytes = args.content.len(), "Wrote file");

        Ok(ToolOutput::new(
            format!("Wrote {}", args.path),
            format!("Successfully wrote to {}", args.path),
        )
        .with_metadata(json!({
            "bytes": args.content.len(),
            "path": args.path,
            "created": existing.is_none()
        })))
    }
}

/// The first [`PREVIEW_CHARS`] characters, with `...` when cut short.
pub fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Generate a unified diff.
pub fn generate_diff(old: &str, new: &str, path: &Path) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    output.push_str(&format!("--- a/{}\n", path.display()));
    output.push_str(&format!("+++ b/{}\n", path.display()));

    for group in diff.grouped_ops(3) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;
        output.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_range.start + 1,
            old_range.len(),
            new_range.start + 1,
            new_range.len()
        ));

        for op in &group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };

                output.push_str(sign);
                output.push_str(change.value());
                if !change.value().ends_with('\n') {
                    output.push('\n');
                }
            }
        }
    }

    output
}
