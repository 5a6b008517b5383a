//! Test provider implementations.
//!
//! Provides a provider that records interactions and returns queued responses.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use locode_provider::{
    ContentPart, FinishReason, GenerateOptions, LanguageModel, Message, ProviderError,
    ProviderResult, StreamChunk,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A provider that records all interactions for later inspection.
///
/// # Example
///
/// ```rust,ignore
/// use locode_test_utils::providers::RecordingProvider;
///
/// let provider = RecordingProvider::new()
///     .with_response(r#"{"thought": "done", "action": "finish", "final_answer": "Hi"}"#);
///
/// // Use provider in test...
///
/// assert_eq!(provider.call_count(), 1);
/// ```
pub struct RecordingProvider {
    model_id: String,
    /// Recorded calls to generate().
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    /// Queue of responses to return.
    responses: Arc<Mutex<VecDeque<ProviderResponse>>>,
    /// Default response when queue is empty.
    default_response: Arc<Mutex<ProviderResponse>>,
}

/// A recorded call to the provider.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The messages sent to the provider.
    pub messages: Vec<Message>,
    /// The options used for generation.
    pub options: GenerateOptions,
}

impl RecordedCall {
    /// Text of the last message in the request.
    pub fn last_text(&self) -> String {
        self.messages.last().map(Message::text).unwrap_or_default()
    }
}

/// A response that the provider can return.
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    /// Return a text response in one delta.
    Text(String),
    /// Return a text response split into several deltas.
    StreamedText(Vec<String>),
    /// Return a tool call.
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    /// Return multiple tool calls.
    MultipleToolCalls(Vec<(String, String, String)>), // (id, name, arguments)
    /// Fail before any chunk is produced, like an unreachable backend.
    Unreachable(String),
    /// Fail in the middle of the stream.
    Error(String),
    /// Return a sequence of chunks.
    Chunks(Vec<StreamChunk>),
    /// Never produce anything.
    Hang,
}

impl Default for ProviderResponse {
    fn default() -> Self {
        ProviderResponse::Text("Test response".to_string())
    }
}

impl RecordingProvider {
    /// Create a new recording provider.
    pub fn new() -> Self {
        Self {
            model_id: "test-model".to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            default_response: Arc::new(Mutex::new(ProviderResponse::default())),
        }
    }

    /// Queue any response.
    pub fn with(self, response: ProviderResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Queue a text response.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with(ProviderResponse::Text(text.into()))
    }

    /// Queue a text response delivered in pieces.
    pub fn with_streamed_response(self, pieces: &[&str]) -> Self {
        self.with(ProviderResponse::StreamedText(
            pieces.iter().map(|p| p.to_string()).collect(),
        ))
    }

    /// Queue a tool call response.
    pub fn with_tool_call(self, id: &str, name: &str, arguments: &str) -> Self {
        self.with(ProviderResponse::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
    }

    /// Queue a mid-stream error response.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.with(ProviderResponse::Error(message.into()))
    }

    /// Queue a connection failure.
    pub fn with_unreachable(self, message: impl Into<String>) -> Self {
        self.with(ProviderResponse::Unreachable(message.into()))
    }

    /// Set the default response when queue is empty.
    pub fn with_default_response(self, response: ProviderResponse) -> Self {
        *self.default_response.lock().unwrap() = response;
        self
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Get the last call made.
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().unwrap().last().cloned()
    }

    /// Number of queued responses not yet returned.
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    /// Check if a message containing the given text was sent.
    pub fn was_sent(&self, text: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|call| {
            call.messages.iter().any(|msg| {
                msg.content.iter().any(|part| match part {
                    ContentPart::Text { text: t } => t.contains(text),
                    ContentPart::ToolResult { content, .. } => content.contains(text),
                    ContentPart::ToolUse { .. } => false,
                })
            })
        })
    }
}

impl Default for RecordingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for RecordingProvider {
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<BoxStream<'static, ProviderResult<StreamChunk>>> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall { messages, options });

        let response = {
            let mut responses = self.responses.lock().unwrap();
            match responses.pop_front() {
                Some(response) => response,
                None => self.default_response.lock().unwrap().clone(),
            }
        };

        if let ProviderResponse::Unreachable(message) = response {
            return Err(ProviderError::internal(message));
        }

        Ok(Box::pin(try_stream! {
            match response {
                ProviderResponse::Text(text) => {
                    yield StreamChunk::TextStart;
                    yield StreamChunk::TextDelta(text);
                    yield StreamChunk::TextEnd;
                    yield StreamChunk::FinishStep {
                        finish_reason: FinishReason::EndTurn,
                    };
                }
                ProviderResponse::StreamedText(pieces) => {
                    yield StreamChunk::TextStart;
                    for piece in pieces {
                        yield StreamChunk::TextDelta(piece);
                    }
                    yield StreamChunk::TextEnd;
                    yield StreamChunk::FinishStep {
                        finish_reason: FinishReason::EndTurn,
                    };
                }
                ProviderResponse::ToolCall { id, name, arguments } => {
                    yield StreamChunk::ToolCallStart { id: id.clone(), name: name.clone() };
                    yield StreamChunk::ToolCall { id, name, arguments };
                    yield StreamChunk::FinishStep {
                        finish_reason: FinishReason::ToolUse,
                    };
                }
                ProviderResponse::MultipleToolCalls(calls) => {
                    for (id, name, arguments) in calls {
                        yield StreamChunk::ToolCallStart { id: id.clone(), name: name.clone() };
                        yield StreamChunk::ToolCall { id, name, arguments };
                    }
                    yield StreamChunk::FinishStep {
                        finish_reason: FinishReason::ToolUse,
                    };
                }
                ProviderResponse::Error(msg) => {
                    yield StreamChunk::TextStart;
                    Err(ProviderError::internal(msg))?;
                }
                ProviderResponse::Chunks(chunks) => {
                    for chunk in chunks {
                        yield chunk;
                    }
                }
                ProviderResponse::Hang => {
                    futures::future::pending::<()>().await;
                }
                ProviderResponse::Unreachable(_) => {}
            }
        }))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn provider_id(&self) -> &str {
        "recording"
    }
}
