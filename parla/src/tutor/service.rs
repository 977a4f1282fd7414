//! Tutor calls against the completion backend.

use super::config::AgentConfig;
use super::prompts::PromptSet;
use crate::error::{Error, Result};
use crate::history::{EvaluationResult, Role, SUGGESTION_OPTIONS, SuggestionResult, Turn};
use crate::markup::{self, MarkupGroup};
use crate::providers::{ChatMessage, CompletionRequest, ResponseSchema, SharedClient};
use crate::session::Session;
use crate::util::truncate_str;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Schema name of evaluation calls.
pub const EVALUATION_SCHEMA: &str = "evaluation";
/// Schema name of suggestion calls.
pub const SUGGESTION_SCHEMA: &str = "suggestion";

/// Prompts plus the backend they are sent to.
///
/// Cheap to clone; lanes of a turn each hold their own copy.
#[derive(Clone)]
pub struct Tutor {
    client: SharedClient,
    prompts: Arc<PromptSet>,
}

impl std::fmt::Debug for Tutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tutor")
            .field("provider", &self.client.provider())
            .finish_non_exhaustive()
    }
}

impl Tutor {
    /// Create a tutor with the built-in prompts.
    #[must_use]
    pub fn new(client: SharedClient) -> Self {
        Self {
            client,
            prompts: Arc::new(PromptSet::default()),
        }
    }

    /// Replace the prompt set.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    /// The backend.
    #[must_use]
    pub const fn client(&self) -> &SharedClient {
        &self.client
    }

    /// The prompt set.
    #[must_use]
    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    fn request(config: &AgentConfig) -> CompletionRequest {
        CompletionRequest::new(&config.model.model)
            .temperature(config.model.temperature)
            .max_tokens(config.model.max_tokens)
    }

    fn instruction_request(&self, config: &AgentConfig, instruction: String) -> CompletionRequest {
        Self::request(config)
            .message(ChatMessage::system(self.prompts.conversation(config)))
            .message(ChatMessage::user(instruction))
    }

    /// Request for the streaming lane: system prompt plus recent history.
    ///
    /// `history` is expected to end with the learner's new message.
    #[must_use]
    pub fn conversation_request(&self, config: &AgentConfig, history: Vec<ChatMessage>) -> CompletionRequest {
        Self::request(config)
            .message(ChatMessage::system(self.prompts.conversation(config)))
            .messages(history)
    }

    /// Request for the evaluation lane.
    #[must_use]
    pub fn evaluation_request(
        &self,
        config: &AgentConfig,
        last_assistant: &str,
        user_message: &str,
    ) -> CompletionRequest {
        Self::request(config)
            .message(ChatMessage::system(self.prompts.evaluation(
                config,
                last_assistant,
                user_message,
            )))
            .message(ChatMessage::user(user_message))
    }

    /// Evaluate one learner reply against the tutor message it answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails or the response does not
    /// decode into an [`EvaluationResult`].
    #[instrument(skip_all, fields(user_len = user_message.len()))]
    pub async fn evaluate(
        &self,
        config: &AgentConfig,
        last_assistant: &str,
        user_message: &str,
    ) -> Result<EvaluationResult> {
        let request = self.evaluation_request(config, last_assistant, user_message);
        let schema = ResponseSchema::of::<EvaluationResult>(EVALUATION_SCHEMA);
        let text = self.client.complete_structured(request, &schema).await?;
        let evaluation: EvaluationResult = decode_json(EVALUATION_SCHEMA, &text)?;
        debug!(status = ?evaluation.status, "Evaluation decoded");
        Ok(evaluation)
    }

    /// Suggest the learner's next reply and attach it to the last tutor turn.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAssistantTurn`] when the tutor has not spoken yet,
    /// or a backend/decode error. A suggestion without exactly three options
    /// is a decode error.
    #[instrument(skip_all, fields(session = %session.id()))]
    pub async fn suggest(&self, session: &mut Session) -> Result<SuggestionResult> {
        let last_assistant = session
            .log()
            .last_of_role(Role::Assistant)
            .map(|turn| turn.content.clone())
            .ok_or(Error::NoAssistantTurn)?;

        let config = session.config();
        let request = Self::request(config)
            .message(ChatMessage::system(self.prompts.conversation(config)))
            .messages(session.log().to_messages(config.model.history_window))
            .message(ChatMessage::user(self.prompts.suggestion(config, &last_assistant)));
        let schema = ResponseSchema::of::<SuggestionResult>(SUGGESTION_SCHEMA);

        let text = self.client.complete_structured(request, &schema).await?;
        let suggestion: SuggestionResult = decode_json(SUGGESTION_SCHEMA, &text)?;
        if !suggestion.is_well_formed() {
            return Err(Error::decode(format!(
                "suggestion: expected {SUGGESTION_OPTIONS} vocabulary options, got {}",
                suggestion.vocab_options.len()
            )));
        }

        session.log_mut().attach_suggestion(suggestion.clone());
        Ok(suggestion)
    }

    /// Vocabulary tips for the recent conversation.
    ///
    /// Each group is a word (`title`), its meaning (`description`) and
    /// example phrases.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails. Decoding never fails.
    #[instrument(skip_all, fields(session = %session.id()))]
    pub async fn vocabulary_tips(&self, session: &Session) -> Result<Vec<MarkupGroup>> {
        let config = session.config();
        let recent = session.log().recent(config.model.history_window);
        let prompt = self.prompts.vocabulary(config, &transcript(recent.iter()));
        let text = self
            .client
            .complete(self.instruction_request(config, prompt))
            .await?;
        Ok(markup::decode(&text))
    }

    /// Assessment of everything the learner wrote in this session.
    ///
    /// Returns no groups, without calling the backend, when the learner has
    /// not written anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails. Decoding never fails.
    #[instrument(skip_all, fields(session = %session.id()))]
    pub async fn assess(&self, session: &Session) -> Result<Vec<MarkupGroup>> {
        let config = session.config();
        let mut learner = session
            .log()
            .turns()
            .iter()
            .filter(|turn| turn.role == Role::User)
            .peekable();
        if learner.peek().is_none() {
            return Ok(Vec::new());
        }

        let prompt = self.prompts.assessment(config, &transcript(learner));
        let text = self
            .client
            .complete(self.instruction_request(config, prompt))
            .await?;
        Ok(markup::decode(&text))
    }
}

/// Render turns as `Speaker: text` lines.
fn transcript<'a>(turns: impl Iterator<Item = &'a Turn>) -> String {
    turns
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "Learner",
                Role::Assistant => "Tutor",
                Role::System => "System",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode a structured response, tolerating a surrounding code fence.
fn decode_json<T: DeserializeOwned>(what: &str, text: &str) -> Result<T> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|inner| inner.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
        .map_err(|e| Error::decode(format!("{what}: {e} in {:?}", truncate_str(body, 80))))
}
