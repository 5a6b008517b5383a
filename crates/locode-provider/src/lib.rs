//! Language model backend abstraction for locode.
//!
//! The agent talks to a chat endpoint through the [`LanguageModel`] trait.
//! Responses arrive as a stream of [`StreamChunk`]s, whether the backend
//! streams tokens or answers with a single completion.
//!
//! The shipped backend is [`OpenAICompatibleProvider`], which covers Ollama
//! and any other server exposing `/chat/completions`.

pub mod error;
pub mod message;
pub mod openai_compatible;
pub mod stream;

pub use error::{ProviderError, ProviderResult};
pub use message::{ContentPart, Message, Role};
pub use openai_compatible::OpenAICompatibleProvider;
pub use stream::{FinishReason, StreamChunk};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;

/// Options for text generation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Temperature for sampling (0.0-1.0).
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// System prompt.
    pub system: Option<String>,
    /// Tools the model may call. Empty means no tool declaration is sent.
    pub tools: Vec<ToolDefinition>,
    /// Ask the backend for an incremental token stream.
    pub stream: bool,
    /// Cancellation token.
    pub abort: Option<tokio_util::sync::CancellationToken>,
}

/// A tool definition for the AI.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for the tool parameters.
    pub parameters: Value,
}

/// The main trait for AI language models.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a response.
    ///
    /// Returns a stream of `StreamChunk` items. Errors returned before the
    /// stream starts are transport failures (unreachable backend, bad status).
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<BoxStream<'static, ProviderResult<StreamChunk>>>;

    /// The model identifier sent to the backend.
    fn model_id(&self) -> &str;

    /// Get the provider ID (e.g., "ollama").
    fn provider_id(&self) -> &str;
}

/// A boxed language model for dynamic dispatch.
pub type BoxedLanguageModel = Arc<dyn LanguageModel>;
