//! Chat Completions API implementation.
//!
//! Implements [`CompletionClient`] for [`OpenAiClient`], covering plain,
//! streaming and schema-constrained generation.

use super::client::{OpenAiClient, PROVIDER};
use crate::error::LlmError;
use crate::providers::streaming::SseStreamParser;
use crate::providers::{CompletionClient, CompletionRequest, FragmentStream, ResponseSchema};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, future};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::pin::Pin;
use tracing::{debug, instrument, warn};

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Build the request body for the API.
fn build_request_body(
    request: &CompletionRequest,
    stream: bool,
    schema: Option<&ResponseSchema>,
) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });

    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if stream {
        body["stream"] = json!(true);
    }
    if let Some(schema) = schema {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.schema,
            }
        });
    }

    body
}

/// Map a non-success status to an error.
fn status_error(status: StatusCode, body: &str) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::auth(PROVIDER, format!("HTTP {status}: {body}")),
        429 => LlmError::rate_limited(PROVIDER),
        code => LlmError::http_status(code, body).for_provider(PROVIDER),
    }
}

/// Extract the assistant text from a non-streaming response.
fn parse_response(json: &Value) -> Result<String, LlmError> {
    if let Some(message) = json["error"]["message"].as_str() {
        return Err(LlmError::provider(PROVIDER, message));
    }
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| {
            LlmError::response_format("choices[0].message.content", "no text content")
                .for_provider(PROVIDER)
        })
}

/// Extract the content fragment of one streamed chunk.
///
/// Chunks without content (role announcements, finish markers) yield `None`.
fn parse_delta(data: &str) -> Option<Result<String, LlmError>> {
    let json: Value = match serde_json::from_str(data) {
        Ok(json) => json,
        Err(e) => {
            return Some(Err(LlmError::stream(format!(
                "malformed stream chunk: {e}"
            ))
            .for_provider(PROVIDER)));
        }
    };

    if let Some(message) = json["error"]["message"].as_str() {
        return Some(Err(LlmError::provider(PROVIDER, message)));
    }

    json["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| Ok(s.to_string()))
}

/// Turn a raw event-stream body into content fragments.
fn fragments(body: ByteStream) -> FragmentStream {
    let parser = SseStreamParser::new(body);
    Box::pin(parser.filter_map(|item| {
        future::ready(match item {
            Ok(data) => parse_delta(&data),
            Err(e) => Some(Err(e.for_provider(PROVIDER))),
        })
    }))
}

impl OpenAiClient {
    /// POST `body` once and return the parsed JSON response.
    async fn post_json(&self, body: &Value) -> Result<Value, LlmError> {
        let response = self
            .http_client
            .post(self.completions_url())
            .headers(self.auth_headers())
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::from(e).for_provider(PROVIDER))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::from(e).for_provider(PROVIDER))
    }

    /// POST `body`, retrying retryable failures per the client's policy.
    async fn post_with_retry(&self, body: &Value) -> Result<Value, LlmError> {
        let mut attempt = 0;
        loop {
            match self.post_json(body).await {
                Ok(json) => return Ok(json),
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(error = %e, attempt, delay = ?delay, "Retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = build_request_body(&request, false, None);
        debug!(messages = request.messages.len(), "Sending completion request");
        let json = self.post_with_retry(&body).await?;
        parse_response(&json)
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, LlmError> {
        let body = build_request_body(&request, true, None);
        debug!(messages = request.messages.len(), "Sending streaming request");

        let response = self
            .http_client
            .post(self.completions_url())
            .headers(self.auth_headers())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from(e).for_provider(PROVIDER))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_text));
        }

        Ok(fragments(Box::pin(response.bytes_stream())))
    }

    #[instrument(skip(self, request, schema), fields(model = %request.model, schema = %schema.name))]
    async fn complete_structured(
        &self,
        request: CompletionRequest,
        schema: &ResponseSchema,
    ) -> Result<String, LlmError> {
        let body = build_request_body(&request, false, Some(schema));
        debug!("Sending structured completion request");
        let json = self.post_with_retry(&body).await?;
        parse_response(&json)
    }
}
