//! The conversation loop.
//!
//! [`LocodeAgent::run`] drives one instruction to a final answer: call the
//! model, parse the response, run tools, feed results back, and repeat. The
//! loop is an explicit state machine ([`LoopState`]) so every transition and
//! every bound (schema retries, steps) is visible in one place.

use crate::action::{AgentAction, Decision, SchemaError};
use crate::error::{AgentError, AgentResult};
use crate::parser::{ActionParser, ModelResponse, Protocol, RawToolCall};
use crate::system_prompt::{build_system_prompt, environment_context};
use futures::StreamExt;
use locode_provider::{
    BoxedLanguageModel, ContentPart, GenerateOptions, Message, ProviderError, StreamChunk,
    ToolDefinition,
};
use locode_tools::{OutputEvent, OutputSink, ToolGateway};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use ulid::Ulid;

/// Settings for the conversation loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// How tool calls are expressed.
    pub protocol: Protocol,
    /// Request a token stream from the backend.
    pub stream: bool,
    pub temperature: Option<f32>,
    /// Consecutive invalid responses corrected before the run fails.
    pub max_schema_retries: u32,
    /// Model calls allowed per run.
    pub max_steps: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Native,
            stream: true,
            temperature: None,
            max_schema_retries: crate::config::DEFAULT_MAX_SCHEMA_RETRIES,
            max_steps: crate::config::DEFAULT_MAX_STEPS,
        }
    }
}

/// Where a run currently is.
#[derive(Debug)]
pub enum LoopState {
    /// About to call the model.
    AwaitingModel,
    /// A complete response has arrived.
    Parsing(ModelResponse),
    /// The response asked for tools.
    DispatchingTool(Vec<AgentAction>, ModelResponse),
    /// The response was rejected and the model gets another try.
    Retrying {
        raw: ModelResponse,
        error: SchemaError,
    },
    /// The response is a final answer.
    Finishing(String, ModelResponse),
    /// The run is over.
    Terminated(AgentResult<String>),
}

/// A coding agent bound to one model, one trusted root and one conversation.
pub struct LocodeAgent {
    provider: BoxedLanguageModel,
    gateway: ToolGateway,
    parser: ActionParser,
    config: AgentConfig,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    history: Mutex<Vec<Message>>,
}

impl LocodeAgent {
    pub fn new(provider: BoxedLanguageModel, gateway: ToolGateway, config: AgentConfig) -> Self {
        let tools = gateway.definitions();
        let environment = environment_context(gateway.root().path(), std::env::consts::OS);
        let system_prompt = build_system_prompt(config.protocol, &tools, None, &environment);

        Self {
            provider,
            gateway,
            parser: ActionParser::new(config.protocol),
            config,
            system_prompt,
            tools,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Snapshot of the conversation so far.
    ///
    /// Waits for a running instruction to finish.
    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    /// Run one instruction to completion.
    ///
    /// Concurrent calls on the same agent are served one after another.
    pub async fn run(&self, instruction: &str, cancel: &CancellationToken) -> AgentResult<String> {
        let span = info_span!("run", run_id = %Ulid::new(), model = %self.provider.model_id());
        self.run_inner(instruction, cancel).instrument(span).await
    }

    async fn run_inner(&self, instruction: &str, cancel: &CancellationToken) -> AgentResult<String> {
        let mut history = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            history = self.history.lock() => history,
        };

        info!(instruction, "Received instruction");
        self.sink().emit(OutputEvent::Instruction(instruction.to_string()));

        // Messages past `committed` belong to the step in flight and are
        // dropped if the run ends early.
        let mut committed = history.len();
        history.push(Message::user(instruction));

        let mut steps = 0u32;
        let mut retries = 0u32;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if steps >= self.config.max_steps {
                        LoopState::Terminated(Err(AgentError::StepLimit {
                            limit: self.config.max_steps,
                        }))
                    } else {
                        steps += 1;
                        debug!(step = steps, "Calling model");
                        match self.request(&history, cancel).await {
                            Ok(response) => LoopState::Parsing(response),
                            Err(err) => LoopState::Terminated(Err(err)),
                        }
                    }
                }

                LoopState::Parsing(response) => match self.parser.parse(&response) {
                    Ok(actions) => {
                        retries = 0;
                        if self.parser.protocol() == Protocol::Json {
                            for action in &actions {
                                if !action.thought.is_empty() {
                                    self.sink()
                                        .emit(OutputEvent::Thinking(action.thought.clone()));
                                }
                            }
                        }

                        let answer = actions.iter().find_map(|action| match &action.decision {
                            Decision::Finish(answer) => Some(answer.clone()),
                            Decision::Tool(_) => None,
                        });
                        match answer {
                            Some(answer) => LoopState::Finishing(answer, response),
                            None => LoopState::DispatchingTool(actions, response),
                        }
                    }
                    Err(error) => LoopState::Retrying {
                        raw: response,
                        error,
                    },
                },

                LoopState::Retrying { raw, error } => {
                    if retries >= self.config.max_schema_retries {
                        LoopState::Terminated(Err(AgentError::RetriesExhausted {
                            attempts: retries + 1,
                            last: error,
                        }))
                    } else {
                        retries += 1;
                        warn!(step = steps, retry = retries, error = %error, "Rejected model response");
                        self.sink().emit(OutputEvent::Notice(format!(
                            "Invalid response ({error}), asking the model again ({retries}/{})",
                            self.config.max_schema_retries
                        )));

                        history.push(Message::assistant(raw.raw_text()));
                        history.push(Message::user(self.parser.feedback(&error)));
                        committed = history.len();
                        LoopState::AwaitingModel
                    }
                }

                LoopState::DispatchingTool(actions, raw) => {
                    match self.run_tools(&actions, cancel).await {
                        Ok(results) => {
                            history.push(assistant_turn(&raw, &actions));
                            history.extend(results);
                            committed = history.len();
                            LoopState::AwaitingModel
                        }
                        Err(err) => LoopState::Terminated(Err(err)),
                    }
                }

                LoopState::Finishing(answer, raw) => {
                    history.push(Message::assistant(raw.raw_text()));
                    committed = history.len();
                    info!(steps, "Final answer");
                    self.sink().emit(OutputEvent::FinalAnswer(answer.clone()));
                    LoopState::Terminated(Ok(answer))
                }

                LoopState::Terminated(result) => {
                    match &result {
                        Ok(_) => {}
                        Err(AgentError::Cancelled) => info!(steps, "Run cancelled"),
                        Err(err) => error!(steps, error = %err, "Run failed"),
                    }
                    history.truncate(committed);
                    return result;
                }
            };
        }
    }

    /// Call the model and assemble its complete response.
    async fn request(
        &self,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> AgentResult<ModelResponse> {
        let options = GenerateOptions {
            temperature: self.config.temperature,
            system: Some(self.system_prompt.clone()),
            tools: match self.config.protocol {
                Protocol::Native => self.tools.clone(),
                Protocol::Json => Vec::new(),
            },
            stream: self.config.stream,
            abort: Some(cancel.clone()),
            ..Default::default()
        };

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            result = self.provider.generate(history.to_vec(), options) => result.map_err(transport)?,
        };

        let mut response = ModelResponse::default();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };

            match chunk.map_err(transport)? {
                StreamChunk::TextDelta(delta) => {
                    if self.config.protocol == Protocol::Native {
                        self.sink().emit(OutputEvent::TextDelta(delta.clone()));
                    }
                    response.text.push_str(&delta);
                }
                StreamChunk::ToolCall {
                    id,
                    name,
                    arguments,
                } => {
                    debug!(tool = %name, id = %id, "Received tool call");
                    response.tool_calls.push(RawToolCall {
                        id,
                        name,
                        arguments,
                    });
                }
                StreamChunk::FinishStep { finish_reason } => {
                    response.finish_reason = Some(finish_reason);
                }
                StreamChunk::Error(message) => {
                    return Err(AgentError::Transport(ProviderError::internal(message)));
                }
                StreamChunk::TextStart | StreamChunk::TextEnd | StreamChunk::ToolCallStart { .. } => {}
            }
        }

        debug!(
            text_len = response.text.len(),
            tool_calls = response.tool_calls.len(),
            finish_reason = ?response.finish_reason,
            "Model responded"
        );
        Ok(response)
    }

    /// Run every tool action in order, returning one result message each.
    async fn run_tools(
        &self,
        actions: &[AgentAction],
        cancel: &CancellationToken,
    ) -> AgentResult<Vec<Message>> {
        let mut results = Vec::with_capacity(actions.len());

        for action in actions {
            let Decision::Tool(invocation) = &action.decision else {
                continue;
            };
            let name = invocation.call.name();

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                response = self.gateway.dispatch(&invocation.call) => response,
            };

            results.push(match &invocation.id {
                Some(id) if response.is_success() => {
                    Message::tool_result(id, name, response.content)
                }
                Some(id) => Message::tool_error(id, name, response.content),
                None => Message::user(format!("Tool '{}' output: {}", name, response.content)),
            });
        }

        Ok(results)
    }

    fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.gateway.context().sink
    }
}

/// The assistant message recording what the model asked for.
///
/// Native tool calls are kept as `ToolUse` parts so their results can be
/// matched by id. Everything else is kept as the raw text.
fn assistant_turn(raw: &ModelResponse, actions: &[AgentAction]) -> Message {
    let native: Vec<_> = actions
        .iter()
        .filter_map(|action| match &action.decision {
            Decision::Tool(invocation) => invocation
                .id
                .as_ref()
                .map(|id| ContentPart::tool_use(id, invocation.call.name(), invocation.call.args())),
            Decision::Finish(_) => None,
        })
        .collect();

    if native.is_empty() {
        return Message::assistant(raw.raw_text());
    }

    let mut message = Message::assistant_empty();
    if !raw.text.trim().is_empty() {
        message = message.with_part(ContentPart::text(raw.text.clone()));
    }
    native.into_iter().fold(message, Message::with_part)
}

fn transport(err: ProviderError) -> AgentError {
    match err {
        ProviderError::Cancelled => AgentError::Cancelled,
        other => AgentError::Transport(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locode_provider::Role;
    use locode_tools::{ReadArgs, ToolCall};

    #[test]
    fn test_assistant_turn_native() {
        let raw = ModelResponse::text("Let me look.");
        let actions = vec![AgentAction::tool(
            "Let me look.",
            Some("call_1".into()),
            ToolCall::ReadFile(ReadArgs {
                path: "a.txt".into(),
            }),
        )];

        let message = assistant_turn(&raw, &actions);
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.text(), "Let me look.");
        let uses: Vec<_> = message.tool_uses().collect();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].0, "call_1");
        assert_eq!(uses[0].1, "read_file");
        assert_eq!(uses[0].2["path"], "a.txt");
    }

    #[test]
    fn test_assistant_turn_text_protocol() {
        let raw = ModelResponse::text(r#"{"name": "read_file", "arguments": {"path": "a.txt"}}"#);
        let actions = vec![AgentAction::tool(
            "",
            None,
            ToolCall::ReadFile(ReadArgs {
                path: "a.txt".into(),
            }),
        )];

        let message = assistant_turn(&raw, &actions);
        assert_eq!(message.text(), raw.text);
        assert_eq!(message.tool_uses().count(), 0);
    }

    #[test]
    fn test_provider_cancellation_is_not_transport() {
        assert!(matches!(
            transport(ProviderError::Cancelled),
            AgentError::Cancelled
        ));
        assert!(transport(ProviderError::internal("boom")).is_transport());
    }

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.protocol, Protocol::Native);
        assert_eq!(config.max_schema_retries, 3);
        assert_eq!(config.max_steps, 50);
    }
}
