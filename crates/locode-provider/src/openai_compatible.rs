//! OpenAI-compatible chat completions backend.
//!
//! Covers Ollama's `/v1` endpoint as well as any other server speaking the
//! OpenAI chat format. Both the SSE streaming mode and the single JSON
//! completion mode are turned into the same [`StreamChunk`] sequence.

use crate::{
    error::ProviderError,
    message::{ContentPart, Message, Role},
    stream::{FinishReason, StreamChunk},
    GenerateOptions, LanguageModel, ProviderResult, ToolDefinition,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, trace, warn};

/// Default endpoint of a local Ollama server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

/// Placeholder key accepted by Ollama.
pub const DEFAULT_API_KEY: &str = "ollama";

/// OpenAI-compatible provider.
pub struct OpenAICompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    model_id: String,
    provider_id: String,
}

impl OpenAICompatibleProvider {
    /// Create a provider for `model` served at `base_url`.
    ///
    /// An empty `api_key` sends no authorization header.
    pub fn new(base_url: &str, api_key: &str, model: impl Into<String>) -> ProviderResult<Self> {
        let mut headers = HeaderMap::new();
        if !api_key.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", api_key))
                    .map_err(|_| ProviderError::invalid_api_key("openai-compatible"))?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::internal(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let provider_id = if base_url.contains(":11434") {
            "ollama"
        } else {
            "openai-compatible"
        };

        Ok(Self {
            client,
            base_url,
            model_id: model.into(),
            provider_id: provider_id.to_string(),
        })
    }

    /// Create a provider for a local Ollama server.
    pub fn ollama(model: impl Into<String>) -> ProviderResult<Self> {
        Self::new(DEFAULT_BASE_URL, DEFAULT_API_KEY, model)
    }

    /// The endpoint base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our messages to OpenAI format.
    fn convert_messages(messages: &[Message], system: Option<&str>) -> Vec<Value> {
        let mut result = Vec::new();

        if let Some(sys) = system {
            result.push(json!({
                "role": "system",
                "content": sys
            }));
        }

        for msg in messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };

            if msg.role == Role::Tool {
                for part in &msg.content {
                    if let ContentPart::ToolResult {
                        tool_use_id,
                        name,
                        content,
                        ..
                    } = part
                    {
                        let mut message = json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content
                        });
                        if let Some(name) = name {
                            message["name"] = json!(name);
                        }
                        result.push(message);
                    }
                }
                continue;
            }

            let text = msg.text();
            let tool_calls = if msg.role == Role::Assistant {
                convert_tool_calls(&msg.content)
            } else {
                None
            };

            match tool_calls {
                Some(calls) => {
                    let content = if text.is_empty() {
                        Value::Null
                    } else {
                        Value::String(text)
                    };
                    result.push(json!({
                        "role": role,
                        "content": content,
                        "tool_calls": calls
                    }));
                }
                None => result.push(json!({
                    "role": role,
                    "content": text
                })),
            }
        }

        result
    }

    /// Convert tools to OpenAI format.
    fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters
                    }
                })
            })
            .collect()
    }
}

/// Convert tool calls to OpenAI format.
fn convert_tool_calls(parts: &[ContentPart]) -> Option<Value> {
    let calls: Vec<Value> = parts
        .iter()
        .filter_map(|part| {
            if let ContentPart::ToolUse { id, name, input } = part {
                Some(json!({
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": input.to_string()
                    }
                }))
            } else {
                None
            }
        })
        .collect();

    if calls.is_empty() {
        None
    } else {
        Some(Value::Array(calls))
    }
}

/// Arguments arrive as a JSON string from OpenAI and sometimes as an object
/// from other servers.
fn arguments_text(arguments: &Value) -> String {
    match arguments {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A tool call being assembled from stream deltas.
#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Flush assembled tool calls. Calls without an id get a positional one.
fn drain_tool_calls(calls: &mut Vec<PendingCall>) -> Vec<StreamChunk> {
    calls
        .drain(..)
        .enumerate()
        .filter(|(_, call)| !call.name.is_empty())
        .map(|(index, call)| {
            let id = if call.id.is_empty() {
                format!("call_{}", index)
            } else {
                call.id
            };
            StreamChunk::ToolCall {
                id,
                name: call.name,
                arguments: call.arguments,
            }
        })
        .collect()
}

/// OpenAI chat completion request.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
}

/// OpenAI streaming chunk.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Error object some servers put inside the stream.
#[derive(Debug, Deserialize)]
struct StreamError {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed { message: String },
    Plain(String),
}

impl ErrorBody {
    fn message(self) -> String {
        match self {
            ErrorBody::Detailed { message } | ErrorBody::Plain(message) => message,
        }
    }
}

/// OpenAI non-streaming completion.
#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Debug, Deserialize)]
struct CompletionToolCall {
    #[serde(default)]
    id: Option<String>,
    function: CompletionFunction,
}

#[derive(Debug, Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Turn a complete response into the chunk sequence a stream would produce.
fn completion_chunks(completion: ChatCompletion) -> ProviderResult<Vec<StreamChunk>> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::invalid_response("completion has no choices"))?;

    let mut chunks = Vec::new();
    if let Some(content) = choice.message.content.filter(|c| !c.is_empty()) {
        chunks.push(StreamChunk::TextStart);
        chunks.push(StreamChunk::TextDelta(content));
        chunks.push(StreamChunk::TextEnd);
    }

    for (index, call) in choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
    {
        let id = call.id.unwrap_or_else(|| format!("call_{}", index));
        chunks.push(StreamChunk::tool_call_start(&id, &call.function.name));
        chunks.push(StreamChunk::tool_call(
            id,
            call.function.name,
            arguments_text(&call.function.arguments),
        ));
    }

    let finish_reason = choice
        .finish_reason
        .as_deref()
        .map(FinishReason::from_openai)
        .unwrap_or_default();
    chunks.push(StreamChunk::FinishStep { finish_reason });

    Ok(chunks)
}

#[async_trait]
impl LanguageModel for OpenAICompatibleProvider {
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<BoxStream<'static, ProviderResult<StreamChunk>>> {
        let request = ChatRequest {
            model: self.model_id.clone(),
            messages: Self::convert_messages(&messages, options.system.as_deref()),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            tools: Self::convert_tools(&options.tools),
            stream: options.stream,
        };

        debug!(model = %self.model_id, stream = options.stream, "Sending chat request");
        trace!(request = ?request, "Full request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Chat API error");
            let message = serde_json::from_str::<StreamError>(&error_text)
                .map(|e| e.error.message())
                .unwrap_or(error_text);
            return Err(ProviderError::api_error(status.as_u16(), message));
        }

        if !options.stream {
            let completion: ChatCompletion = response.json().await?;
            let chunks = completion_chunks(completion)?;
            return Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))));
        }

        let byte_stream = response.bytes_stream();
        let abort = options.abort.clone();

        Ok(Box::pin(try_stream! {
            use futures::StreamExt;
            use tokio::io::AsyncBufReadExt;
            use tokio_util::io::StreamReader;

            let reader = StreamReader::new(
                byte_stream.map(|r| r.map_err(std::io::Error::other))
            );
            let mut lines = reader.lines();

            let mut tool_calls: Vec<PendingCall> = Vec::new();
            let mut text_started = false;
            let mut finished = false;

            while let Some(line) = lines.next_line().await? {
                if let Some(ref token) = abort {
                    if token.is_cancelled() {
                        Err(ProviderError::Cancelled)?;
                    }
                }

                let line = line.trim();
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }

                let data = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
                if data == "[DONE]" {
                    break;
                }
                if data.is_empty() {
                    continue;
                }

                let chunk: ChatChunk = match serde_json::from_str(data) {
                    Ok(c) => c,
                    Err(e) => {
                        if let Ok(err) = serde_json::from_str::<StreamError>(data) {
                            yield StreamChunk::Error(err.error.message());
                            continue;
                        }
                        trace!(error = %e, data = %data, "Failed to parse chunk");
                        continue;
                    }
                };

                for choice in &chunk.choices {
                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty() {
                            if !text_started {
                                yield StreamChunk::TextStart;
                                text_started = true;
                            }
                            yield StreamChunk::TextDelta(content.clone());
                        }
                    }

                    if let Some(tool_deltas) = &choice.delta.tool_calls {
                        for (position, delta) in tool_deltas.iter().enumerate() {
                            let index = delta.index.unwrap_or(position);
                            while tool_calls.len() <= index {
                                tool_calls.push(PendingCall::default());
                            }

                            let call = &mut tool_calls[index];

                            if let Some(id) = &delta.id {
                                call.id = id.clone();
                            }

                            if let Some(func) = &delta.function {
                                if let Some(name) = &func.name {
                                    call.name = name.clone();
                                    yield StreamChunk::ToolCallStart {
                                        id: call.id.clone(),
                                        name: name.clone(),
                                    };
                                }
                                if let Some(args) = &func.arguments {
                                    call.arguments.push_str(&arguments_text(args));
                                }
                            }
                        }
                    }

                    if let Some(reason) = &choice.finish_reason {
                        if text_started {
                            yield StreamChunk::TextEnd;
                            text_started = false;
                        }

                        for call in drain_tool_calls(&mut tool_calls) {
                            yield call;
                        }

                        finished = true;
                        yield StreamChunk::FinishStep {
                            finish_reason: FinishReason::from_openai(reason),
                        };
                    }
                }
            }

            // Connection closed without a finish_reason.
            if !finished {
                if text_started {
                    yield StreamChunk::TextEnd;
                }
                let has_calls = tool_calls.iter().any(|c| !c.name.is_empty());
                for call in drain_tool_calls(&mut tool_calls) {
                    yield call;
                }
                yield StreamChunk::FinishStep {
                    finish_reason: if has_calls { FinishReason::ToolUse } else { FinishReason::EndTurn },
                };
            }
        }))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages() {
        let messages = vec![Message::user("Hello, world!")];

        let converted =
            OpenAICompatibleProvider::convert_messages(&messages, Some("You are helpful"));

        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0]["role"], "system");
        assert_eq!(converted[1]["role"], "user");
        assert_eq!(converted[1]["content"], "Hello, world!");
    }

    #[test]
    fn test_convert_tool_round() {
        let messages = vec![
            Message::assistant_empty().with_part(ContentPart::tool_use(
                "call_1",
                "read_file",
                json!({"path": "a.txt"}),
            )),
            Message::tool_result("call_1", "read_file", "hello"),
        ];

        let converted = OpenAICompatibleProvider::convert_messages(&messages, None);

        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0]["role"], "assistant");
        assert!(converted[0]["content"].is_null());
        assert_eq!(converted[0]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            converted[0]["tool_calls"][0]["function"]["arguments"],
            r#"{"path":"a.txt"}"#
        );
        assert_eq!(converted[1]["role"], "tool");
        assert_eq!(converted[1]["tool_call_id"], "call_1");
        assert_eq!(converted[1]["name"], "read_file");
        assert_eq!(converted[1]["content"], "hello");
    }

    #[test]
    fn test_convert_tools() {
        let tools = vec![ToolDefinition {
            name: "read_file".to_string(),
            description: "Read a file".to_string(),
            parameters: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        }];

        let converted = OpenAICompatibleProvider::convert_tools(&tools);

        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0]["type"], "function");
        assert_eq!(converted[0]["function"]["name"], "read_file");
    }

    #[test]
    fn test_arguments_text() {
        assert_eq!(arguments_text(&json!("{\"a\":1}")), "{\"a\":1}");
        assert_eq!(arguments_text(&json!({"a": 1})), "{\"a\":1}");
        assert_eq!(arguments_text(&Value::Null), "");
    }

    #[test]
    fn test_completion_chunks() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "function": {"name": "run_command", "arguments": {"command": "ls"}}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();

        let chunks = completion_chunks(completion).unwrap();
        assert_eq!(
            chunks,
            vec![
                StreamChunk::tool_call_start("call_0", "run_command"),
                StreamChunk::tool_call("call_0", "run_command", r#"{"command":"ls"}"#),
                StreamChunk::FinishStep {
                    finish_reason: FinishReason::ToolUse
                },
            ]
        );
    }

    #[test]
    fn test_completion_without_choices_is_invalid() {
        let completion = ChatCompletion { choices: vec![] };
        assert!(matches!(
            completion_chunks(completion),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_provider_id() {
        let provider = OpenAICompatibleProvider::ollama("llama3.1").unwrap();
        assert_eq!(provider.provider_id(), "ollama");
        assert_eq!(provider.model_id(), "llama3.1");

        let provider =
            OpenAICompatibleProvider::new("https://api.example.com/v1/", "", "gpt").unwrap();
        assert_eq!(provider.provider_id(), "openai-compatible");
        assert_eq!(provider.base_url(), "https://api.example.com/v1");
    }
}
