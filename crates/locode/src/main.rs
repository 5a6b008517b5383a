//! locode - a local AI coding agent.
//!
//! Runs an instruction (and optionally a REPL) against a model served by
//! Ollama or any OpenAI-compatible endpoint.

mod console;
mod logging;

use anyhow::Context;
use clap::Parser;
use console::{paint, report, LineReader, TerminalGate, TerminalSink};
use crossterm::style::Stylize;
use locode_core::{AgentError, Config, LocodeAgent, Protocol};
use locode_provider::OpenAICompatibleProvider;
use locode_tools::{ConfirmPolicy, PolicyGate, ToolContext, ToolGateway};
use locode_util::TrustedRoot;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "locode")]
#[command(author, version, about = "Local AI coding agent for Ollama and OpenAI-compatible models", long_about = None)]
struct Cli {
    /// Instruction to run
    instruction: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Keep reading instructions after the first one
    #[arg(short, long)]
    interactive: bool,

    /// How the model calls tools (native or json)
    #[arg(long)]
    protocol: Option<Protocol>,

    /// Base URL of the chat completions endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Approve every write and command without asking
    #[arg(short = 'y', long)]
    yes: bool,

    /// Wait for complete responses instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Flags that override configuration files and the environment.
    fn overrides(&self) -> Config {
        Config {
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            protocol: self.protocol,
            stream: self.no_stream.then_some(false),
            confirm: self.yes.then_some(ConfirmPolicy::Allow),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = logging::init_logging(cli.verbose);
    info!(log_file = ?log_file, "Starting locode");

    let cwd = std::env::current_dir()?;
    let (config, sources) = Config::load(Some(&cwd)).await?;
    let config = config.merge(cli.overrides());
    info!(sources = ?sources, model = config.model(), "Configuration loaded");

    println!("Starting Locode with model: {}", paint(config.model().bold()));

    let reader = Arc::new(LineReader::stdin());
    let sink = Arc::new(TerminalSink::new());
    let agent = build_agent(&config, &cwd, reader.clone(), sink.clone())?;
    info!(model = agent.model_id(), protocol = %agent.config().protocol, "Agent ready");

    if let Some(instruction) = cli.instruction.as_deref() {
        if let Err(err) = run_instruction(&agent, instruction).await {
            if !cli.interactive {
                // anyhow prints the error itself and exits with 1
                if let Some(hint) = err.hint() {
                    eprintln!("{}", paint(hint.yellow()));
                }
                return Err(err.into());
            }
            report(sink.as_ref(), &err);
        }
    } else if !cli.interactive {
        println!("No instruction given. Pass one as an argument or use --interactive.");
    }

    if cli.interactive {
        repl(&agent, &reader, sink.as_ref()).await?;
    }

    Ok(())
}

fn build_agent(
    config: &Config,
    cwd: &std::path::Path,
    reader: Arc<LineReader>,
    sink: Arc<TerminalSink>,
) -> anyhow::Result<LocodeAgent> {
    let provider =
        OpenAICompatibleProvider::new(config.base_url(), config.api_key(), config.model())
            .context("Failed to create model client")?;
    let root = TrustedRoot::new(cwd).context("Failed to use the working directory as root")?;

    let mut gate = PolicyGate::new(config.confirm_policy());
    if std::io::stdin().is_terminal() {
        gate = gate.with_interactive(Arc::new(TerminalGate::new(reader)));
    }

    let ctx = ToolContext::new(root, Arc::new(gate), sink)
        .with_command_timeout(config.command_timeout());
    Ok(LocodeAgent::new(
        Arc::new(provider),
        ToolGateway::new(ctx),
        config.agent_config(),
    ))
}

/// Run one instruction. Ctrl-C cancels it.
async fn run_instruction(agent: &LocodeAgent, instruction: &str) -> Result<String, AgentError> {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let result = agent.run(instruction, &cancel).await;
    watcher.abort();
    result
}

/// Read instructions until `exit`, `quit`, end of input or Ctrl-C.
async fn repl(
    agent: &LocodeAgent,
    reader: &LineReader,
    sink: &TerminalSink,
) -> anyhow::Result<()> {
    println!("Type an instruction and press Enter. Type 'exit' or 'quit' to leave.");

    loop {
        print!("{}", paint("You> ".green().bold()));
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = reader.read_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        if let Err(err) = run_instruction(agent, line).await {
            report(sink, &err);
        }
    }

    info!("Leaving interactive mode");
    Ok(())
}
