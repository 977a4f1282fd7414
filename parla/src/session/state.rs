//! Per-session state.

use crate::history::ConversationLog;
use crate::tutor::AgentConfig;
use crate::util::timestamp_ms;

/// One learner's conversation: its log and how the tutor behaves.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    log: ConversationLog,
    config: AgentConfig,
    created_at: u64,
    updated_at: u64,
}

impl Session {
    /// Create a session with an empty log.
    #[must_use]
    pub fn new(id: impl Into<String>, config: AgentConfig) -> Self {
        let now = timestamp_ms();
        Self {
            id: id.into(),
            log: ConversationLog::new(),
            config,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get the session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The conversation log.
    #[must_use]
    pub const fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Mutable access to the conversation log.
    pub fn log_mut(&mut self) -> &mut ConversationLog {
        self.updated_at = timestamp_ms();
        &mut self.log
    }

    /// The tutor configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Replace the configuration.
    ///
    /// Returns `true` if the log was reset because the topic, level or
    /// language changed.
    pub fn set_config(&mut self, config: AgentConfig) -> bool {
        let reset = self.config.prompt_differs(&config);
        self.config = config;
        if reset {
            self.log.reset();
        }
        self.updated_at = timestamp_ms();
        reset
    }

    /// Clear the conversation, keeping the configuration.
    pub fn reset(&mut self) {
        self.log.reset();
        self.updated_at = timestamp_ms();
    }

    /// Creation time in Unix milliseconds.
    #[must_use]
    pub const fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Last mutation time in Unix milliseconds.
    #[must_use]
    pub const fn updated_at(&self) -> u64 {
        self.updated_at
    }
}
