//! Completion backends.
//!
//! Every backend implements [`CompletionClient`], which exposes the three
//! call shapes the tutor needs:
//!
//! - [`complete`](CompletionClient::complete) - whole response at once
//! - [`complete_streaming`](CompletionClient::complete_streaming) - incremental
//!   content fragments
//! - [`complete_structured`](CompletionClient::complete_structured) - whole
//!   response constrained to a JSON schema
//!
//! # Supported Backends
//!
//! - **`OpenAI`-compatible** ([`OpenAiClient`]): any chat-completions endpoint
//!   with SSE streaming
//! - **Scripted** ([`ScriptedClient`]): deterministic in-process responses for
//!   tests and offline use
//!
//! # Example
//!
//! ```rust,ignore
//! use parla::providers::{ChatMessage, CompletionClient, CompletionRequest, OpenAiClient};
//!
//! let client = OpenAiClient::from_env()?;
//! let request = CompletionRequest::new("gpt-4o-mini").message(ChatMessage::user("Hi!"));
//! let text = client.complete(request).await?;
//! ```

mod config;
mod streaming;
mod types;

pub mod openai;
pub mod scripted;

pub use config::{HttpClientConfig, RetryConfig};
pub use streaming::{SseStreamParser, is_done_marker, parse_sse_data};
pub use types::{ChatMessage, CompletionRequest, FragmentStream, ResponseSchema};

pub use openai::OpenAiClient;
pub use scripted::ScriptedClient;

use crate::error::LlmError;
use async_trait::async_trait;
use std::sync::Arc;

/// The interface every completion backend implements.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider name used in logs and errors (e.g., "openai").
    fn provider(&self) -> &'static str {
        "unknown"
    }

    /// Generate a whole response.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails or the response has no text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;

    /// Generate a response as a stream of content fragments.
    ///
    /// The default implementation falls back to [`complete`](Self::complete)
    /// and yields the whole text as one fragment.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened. Failures after the
    /// stream is open arrive as `Err` items.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, LlmError> {
        let text = self.complete(request).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }

    /// Generate a whole response constrained to `schema`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails or the response has no text.
    async fn complete_structured(
        &self,
        request: CompletionRequest,
        schema: &ResponseSchema,
    ) -> Result<String, LlmError>;
}

/// A shared, reference-counted client for use across tasks.
pub type SharedClient = Arc<dyn CompletionClient>;
