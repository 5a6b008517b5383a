//! Terminal input and output.
//!
//! [`TerminalSink`] renders agent events, [`TerminalGate`] asks the operator
//! for approval, and both share one [`LineReader`] on stdin with the REPL.

use async_trait::async_trait;
use crossterm::style::{StyledContent, Stylize};
use locode_core::AgentError;
use locode_tools::{ConfirmationGate, OutputEvent, OutputSink, ToolStatus};
use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Lines of tool output shown in the transcript.
const RESULT_PREVIEW_LINES: usize = 12;

/// Whether output may carry ANSI styling.
///
/// Off when `NO_COLOR` is set or either output stream is not a terminal.
pub fn styling_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var_os("NO_COLOR").is_none()
            && io::stdout().is_terminal()
            && io::stderr().is_terminal()
    })
}

/// Render styled content, dropping the styling when it is disabled.
pub fn paint<D: Display>(styled: StyledContent<D>) -> String {
    render(styled, styling_enabled())
}

fn render<D: Display>(styled: StyledContent<D>, enabled: bool) -> String {
    if enabled {
        styled.to_string()
    } else {
        styled.content().to_string()
    }
}

/// Line-oriented stdin, shared by everything that reads from the operator.
pub struct LineReader {
    lines: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
}

impl LineReader {
    pub fn stdin() -> Self {
        Self {
            lines: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    /// Next line without its terminator, or `None` at end of input.
    pub async fn read_line(&self) -> io::Result<Option<String>> {
        self.lines.lock().await.next_line().await
    }
}

/// Asks `prompt [y/N]` on the terminal.
pub struct TerminalGate {
    reader: Arc<LineReader>,
}

impl TerminalGate {
    pub fn new(reader: Arc<LineReader>) -> Self {
        Self { reader }
    }
}

/// Only an explicit yes approves.
pub fn is_approval(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl ConfirmationGate for TerminalGate {
    async fn confirm(&self, prompt: &str) -> bool {
        print!("{} {} ", paint(prompt.bold()), paint("[y/N]".dim()));
        let _ = io::stdout().flush();

        match self.reader.read_line().await {
            Ok(Some(answer)) => is_approval(&answer),
            Ok(None) => {
                println!();
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read confirmation");
                false
            }
        }
    }
}

/// Report a failed run to the sink, with a hint when there is one.
pub fn report(sink: &dyn OutputSink, err: &AgentError) {
    match err {
        AgentError::Cancelled => sink.emit(OutputEvent::Notice("Cancelled.".to_string())),
        _ => {
            sink.emit(OutputEvent::Error(err.to_string()));
            if let Some(hint) = err.hint() {
                sink.emit(OutputEvent::Notice(hint.to_string()));
            }
        }
    }
}

/// Renders agent events on stdout.
#[derive(Default)]
pub struct TerminalSink {
    /// Text streamed since the last other event.
    streamed: Mutex<String>,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish a streamed line, returning what was streamed.
    fn end_stream(&self) -> String {
        let streamed = std::mem::take(
            &mut *self
                .streamed
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if !streamed.is_empty() && !streamed.ends_with('\n') {
            println!();
        }
        streamed
    }
}

impl OutputSink for TerminalSink {
    fn emit(&self, event: OutputEvent) {
        if let OutputEvent::TextDelta(delta) = &event {
            print!("{delta}");
            let _ = io::stdout().flush();
            self.streamed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_str(delta);
            return;
        }

        let streamed = self.end_stream();

        match event {
            OutputEvent::Instruction(text) => {
                println!("{} {}", paint("[Agent] Received instruction:".cyan().bold()), text);
            }
            OutputEvent::Thinking(thought) => {
                println!("{} {}", paint("Thinking...".dim()), paint(thought.dim()));
            }
            OutputEvent::ToolCall { name, args } => {
                println!(
                    "{} {}({})",
                    paint("Calling tool:".yellow().bold()),
                    paint(name.bold()),
                    args
                );
            }
            OutputEvent::Diff { path, diff } => {
                println!("{} {}", paint("Changes to".bold()), paint(path.bold()));
                for line in diff.lines() {
                    println!("{}", color_diff_line(line));
                }
            }
            OutputEvent::Preview { path, preview } => {
                println!("{} {}", paint("New file".bold()), paint(path.bold()));
                println!("{}", paint(preview.dim()));
            }
            OutputEvent::Command(command) => {
                println!("{} {}", paint("Command:".bold()), paint(command.cyan()));
            }
            OutputEvent::ToolResult {
                name,
                status,
                content,
            } => {
                let label = format!("[{name}: {status}]");
                let label = match status {
                    ToolStatus::Success => label.green(),
                    ToolStatus::Declined => label.yellow(),
                    ToolStatus::Failed | ToolStatus::Denied => label.red(),
                };
                println!("{}", paint(label));
                for line in content.lines().take(RESULT_PREVIEW_LINES) {
                    println!("  {}", paint(line.dim()));
                }
                let total = content.lines().count();
                if total > RESULT_PREVIEW_LINES {
                    let more = format!("... {} more lines", total - RESULT_PREVIEW_LINES);
                    println!("  {}", paint(more.dim()));
                }
            }
            OutputEvent::FinalAnswer(answer) => {
                println!("{}", paint("Final Answer:".green().bold()));
                // Streamed answers are already on screen.
                if streamed.trim() != answer.trim() {
                    println!("{answer}");
                }
                println!();
            }
            OutputEvent::Notice(text) => {
                println!("{} {}", paint("!".yellow().bold()), paint(text.yellow()));
            }
            OutputEvent::Error(text) => eprintln!("{} {}", paint("Error:".red().bold()), text),
            OutputEvent::TextDelta(_) => {}
        }
    }
}

fn color_diff_line(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        paint(line.bold())
    } else if line.starts_with('+') {
        paint(line.green())
    } else if line.starts_with('-') {
        paint(line.red())
    } else if line.starts_with("@@") {
        paint(line.cyan())
    } else {
        line.to_string()
    }
}
