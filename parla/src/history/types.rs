//! Core types for the conversation log.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The learner.
    User,
    /// The tutor model.
    Assistant,
    /// Instructions injected by the application.
    System,
}

impl Role {
    /// Wire name of the role as used by chat-completion APIs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grade given to a learner reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// Natural and correct.
    Excellent,
    /// Understandable with minor issues.
    Good,
    /// Contains errors worth correcting.
    NeedsImprovement,
}

/// Assessment of a single learner reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationResult {
    /// Overall grade.
    pub status: EvaluationStatus,
    /// One-line summary shown inline.
    pub short_description: String,
    /// Detailed explanation.
    pub long_description: String,
    /// Corrected version of the learner's message.
    pub corrected: String,
}

/// A vocabulary option offered as a possible reply fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VocabOption {
    /// The word or phrase.
    pub text: String,
    /// A single emoji illustrating it.
    pub emoji: String,
}

/// Number of vocabulary options every suggestion carries.
pub const SUGGESTION_OPTIONS: usize = 3;

/// Reply suggestion attached to an assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SuggestionResult {
    /// Sentence starter the learner can complete.
    pub leading_sentence: String,
    /// Exactly [`SUGGESTION_OPTIONS`] options, in display order.
    pub vocab_options: Vec<VocabOption>,
}

impl SuggestionResult {
    /// Check the option count.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.vocab_options.len() == SUGGESTION_OPTIONS
    }
}

/// One message in a conversation with a stable ordinal index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Stable index, assigned once.
    pub index: u64,
    /// Author of the turn.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Evaluation of a user turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
    /// Suggestion attached to an assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<SuggestionResult>,
    /// Set when the content was committed from an interrupted stream.
    #[serde(default)]
    pub truncated: bool,
    /// Creation time (Unix milliseconds).
    pub created_at: u64,
}

/// Per-role turn counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStats {
    /// User turns.
    pub user: usize,
    /// Assistant turns.
    pub assistant: usize,
    /// System turns.
    pub system: usize,
}

impl LogStats {
    /// Total number of turns.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.user + self.assistant + self.system
    }
}

impl fmt::Display for LogStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} turns (user: {}, assistant: {}, system: {})",
            self.total(),
            self.user,
            self.assistant,
            self.system
        )
    }
}
