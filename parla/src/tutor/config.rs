//! Per-session tutor configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default number of recent turns sent with each request.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Learner proficiency level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Simple vocabulary, short sentences.
    Beginner,
    /// Everyday conversation.
    #[default]
    Intermediate,
    /// Idiomatic, nuanced language.
    Advanced,
}

impl Level {
    /// All levels, easiest first.
    pub const ALL: [Self; 3] = [Self::Beginner, Self::Intermediate, Self::Advanced];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| format!("unknown level '{s}' (expected beginner, intermediate or advanced)"))
    }
}

/// Sampling parameters shared by every call of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Recent turns sent with each request; 0 sends the whole log.
    pub history_window: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 512,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

/// What a session talks about and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Conversation topic.
    pub topic: String,
    /// Learner level.
    pub level: Level,
    /// Target language.
    pub language: String,
    /// Model parameters.
    pub model: ModelParams,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            topic: "everyday life".to_string(),
            level: Level::default(),
            language: "English".to_string(),
            model: ModelParams::default(),
        }
    }
}

impl AgentConfig {
    /// Create a configuration with default model parameters.
    #[must_use]
    pub fn new(topic: impl Into<String>, level: Level, language: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            level,
            language: language.into(),
            model: ModelParams::default(),
        }
    }

    /// Replace the model parameters.
    #[must_use]
    pub fn with_model(mut self, model: ModelParams) -> Self {
        self.model = model;
        self
    }

    /// Whether `other` changes what the prompts say.
    ///
    /// Model parameters do not count; a topic, level or language change does.
    #[must_use]
    pub fn prompt_differs(&self, other: &Self) -> bool {
        self.topic != other.topic || self.level != other.level || self.language != other.language
    }
}
