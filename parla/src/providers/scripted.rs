//! Deterministic in-process backend.
//!
//! [`ScriptedClient`] answers every call from a script instead of a network
//! service. It drives the offline chat mode and the test suites, where
//! fragment timing and failure points must be reproducible.

use crate::error::LlmError;
use crate::providers::{CompletionClient, CompletionRequest, FragmentStream, ResponseSchema};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const PROVIDER: &str = "scripted";

/// Which entry point a recorded call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// [`CompletionClient::complete`].
    Complete,
    /// [`CompletionClient::complete_streaming`].
    Streaming,
    /// [`CompletionClient::complete_structured`].
    Structured,
}

/// One call observed by a [`ScriptedClient`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Entry point used.
    pub kind: CallKind,
    /// The request as received.
    pub request: CompletionRequest,
    /// Schema name for structured calls.
    pub schema: Option<String>,
}

/// Scripted completion backend.
///
/// With no fragments configured, streaming echoes the newest user message.
///
/// ```rust,ignore
/// let client = ScriptedClient::new()
///     .with_fragments(["Ciao", "! ", "Come stai?"])
///     .with_fragment_delay(Duration::from_millis(50))
///     .with_structured(r#"{"status":"good", ...}"#);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedClient {
    fragments: Vec<String>,
    fragment_delay: Duration,
    fail_stream_after: Option<usize>,
    fail_stream_open: Option<LlmError>,
    completion: Option<String>,
    structured: Option<String>,
    structured_by_schema: HashMap<String, String>,
    structured_failure: Option<LlmError>,
    structured_delay: Duration,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedClient {
    /// Create a client that echoes user input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragments yielded by streaming calls, in order.
    #[must_use]
    pub fn with_fragments<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fragments = fragments.into_iter().map(Into::into).collect();
        self
    }

    /// Delay before each streamed fragment.
    #[must_use]
    pub const fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    /// Fail the stream after `count` fragments have been yielded.
    #[must_use]
    pub const fn fail_stream_after(mut self, count: usize) -> Self {
        self.fail_stream_after = Some(count);
        self
    }

    /// Refuse to open streams at all.
    #[must_use]
    pub fn fail_stream_open(mut self, error: LlmError) -> Self {
        self.fail_stream_open = Some(error);
        self
    }

    /// Text returned by plain completions.
    #[must_use]
    pub fn with_completion(mut self, text: impl Into<String>) -> Self {
        self.completion = Some(text.into());
        self
    }

    /// Text returned by structured calls without a schema-specific answer.
    #[must_use]
    pub fn with_structured(mut self, text: impl Into<String>) -> Self {
        self.structured = Some(text.into());
        self
    }

    /// Text returned by structured calls for the schema named `name`.
    #[must_use]
    pub fn with_structured_for(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.structured_by_schema.insert(name.into(), text.into());
        self
    }

    /// Fail every structured call with `error`.
    #[must_use]
    pub fn fail_structured(mut self, error: LlmError) -> Self {
        self.structured_failure = Some(error);
        self
    }

    /// Delay before a structured call resolves.
    #[must_use]
    pub const fn with_structured_delay(mut self, delay: Duration) -> Self {
        self.structured_delay = delay;
        self
    }

    /// Every call observed so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Observed calls of one kind.
    #[must_use]
    pub fn calls_of(&self, kind: CallKind) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.kind == kind)
            .collect()
    }

    fn record(&self, kind: CallKind, request: &CompletionRequest, schema: Option<&str>) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                kind,
                request: request.clone(),
                schema: schema.map(String::from),
            });
    }

    fn script_for(&self, request: &CompletionRequest) -> Vec<String> {
        if !self.fragments.is_empty() {
            return self.fragments.clone();
        }
        let echo = format!("You said: {}", request.last_user_content().unwrap_or(""));
        echo.split_inclusive(' ').map(String::from).collect()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.record(CallKind::Complete, &request, None);
        Ok(self
            .completion
            .clone()
            .unwrap_or_else(|| self.script_for(&request).concat()))
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, LlmError> {
        self.record(CallKind::Streaming, &request, None);
        if let Some(error) = &self.fail_stream_open {
            return Err(error.clone());
        }

        let script = self.script_for(&request);
        let mut items: Vec<Result<String, LlmError>> = match self.fail_stream_after {
            Some(count) => script.into_iter().take(count).map(Ok).collect(),
            None => script.into_iter().map(Ok).collect(),
        };
        if let Some(count) = self.fail_stream_after {
            items.push(Err(LlmError::stream(format!(
                "stream interrupted after {count} fragments"
            ))
            .for_provider(PROVIDER)));
        }

        let delay = self.fragment_delay;
        Ok(Box::pin(futures::stream::iter(items).then(
            move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            },
        )))
    }

    async fn complete_structured(
        &self,
        request: CompletionRequest,
        schema: &ResponseSchema,
    ) -> Result<String, LlmError> {
        self.record(CallKind::Structured, &request, Some(&schema.name));
        if !self.structured_delay.is_zero() {
            tokio::time::sleep(self.structured_delay).await;
        }
        if let Some(error) = &self.structured_failure {
            return Err(error.clone());
        }
        self.structured_by_schema
            .get(&schema.name)
            .or(self.structured.as_ref())
            .cloned()
            .ok_or_else(|| {
                LlmError::provider(
                    PROVIDER,
                    format!("no structured response scripted for '{}'", schema.name),
                )
            })
    }
}
