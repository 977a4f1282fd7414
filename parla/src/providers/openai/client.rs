//! `OpenAI`-compatible API client.
//!
//! Talks to any endpoint implementing the Chat Completions API: `OpenAI`
//! itself, Azure `OpenAI`, local proxies and third-party gateways.

use crate::error::LlmError;
use crate::providers::config::{HttpClientConfig, RetryConfig};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Arc;

/// Default `OpenAI` API base URL.
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider name reported in logs and errors.
pub(crate) const PROVIDER: &str = "openai";

/// `OpenAI`-compatible chat completion client.
///
/// # Example
///
/// ```rust,ignore
/// use parla::providers::OpenAiClient;
///
/// // From OPENAI_API_KEY / OPENAI_BASE_URL
/// let client = OpenAiClient::from_env()?;
///
/// // Explicit configuration
/// let client = OpenAiClient::builder()
///     .api_key("sk-...")
///     .base_url("http://localhost:8080/v1")
///     .timeout_secs(30)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct OpenAiClient {
    pub(super) http_client: reqwest::Client,
    api_key: Arc<str>,
    base_url: Arc<str>,
    pub(super) retry: RetryConfig,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Create a client for the default base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        Self::builder().api_key(api_key).build()
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> OpenAiClientBuilder {
        OpenAiClientBuilder::default()
    }

    /// Create a client from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENAI_API_KEY` (required): The API key
    /// - `OPENAI_BASE_URL` (optional): Custom base URL
    ///
    /// # Errors
    ///
    /// Returns an auth error if `OPENAI_API_KEY` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::auth(PROVIDER, "OPENAI_API_KEY environment variable not set"))?;

        let mut builder = Self::builder().api_key(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            builder = builder.base_url(base_url);
        }
        builder.build()
    }

    /// Get the base URL for API requests.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the chat completions endpoint.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Build authentication headers for API requests.
    #[must_use]
    pub fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(2);
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

/// Builder for [`OpenAiClient`].
#[derive(Debug, Default)]
pub struct OpenAiClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    http: HttpClientConfig,
    retry: Option<RetryConfig>,
}

impl OpenAiClientBuilder {
    /// Set the API key.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set a custom base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout in seconds.
    #[must_use]
    pub const fn timeout_secs(mut self, timeout: u64) -> Self {
        self.http.timeout_secs = Some(timeout);
        self
    }

    /// Set the retry policy for non-streaming calls.
    #[must_use]
    pub const fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an auth error if no API key was given, or an internal error if
    /// the HTTP client fails to build.
    pub fn build(self) -> Result<OpenAiClient, LlmError> {
        let api_key = self
            .api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| LlmError::auth(PROVIDER, "API key is required"))?;
        let base_url = self
            .base_url
            .unwrap_or_else(|| OPENAI_API_BASE_URL.to_string());

        Ok(OpenAiClient {
            http_client: self.http.build_client()?,
            api_key: api_key.into(),
            base_url: base_url.into(),
            retry: self.retry.unwrap_or_default(),
        })
    }
}
