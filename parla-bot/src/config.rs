//! Bot configuration.
//!
//! Stored as JSON at `~/.parla/config.json` unless `--config` or
//! `PARLA_CONFIG` points elsewhere. Every field has a default, so a partial
//! file is valid:
//!
//! ```json
//! {
//!   "provider": { "base_url": "http://localhost:8080/v1" },
//!   "tutor": { "topic": "travel", "level": "beginner" }
//! }
//! ```
//!
//! `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `PARLA_MODEL` override the file.

use crate::error::{ConfigError, ConfigResult};
use parla::providers::OpenAiClient;
use parla::providers::openai::OPENAI_API_BASE_URL;
use parla::tutor::{AgentConfig, DEFAULT_HISTORY_WINDOW, DEFAULT_MODEL, Level, ModelParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the configuration directory under the home directory.
const CONFIG_DIR: &str = ".parla";

/// Name of the configuration file.
const CONFIG_FILE: &str = "config.json";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Completion backend.
    pub provider: ProviderConfig,
    /// Tutor defaults for new sessions.
    pub tutor: TutorConfig,
}

/// `OpenAI`-compatible backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API base URL.
    pub base_url: String,
    /// API key; usually left to `OPENAI_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_API_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

/// Tutor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    /// Conversation topic.
    pub topic: String,
    /// Learner level.
    pub level: Level,
    /// Target language.
    pub language: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Recent turns sent with each request.
    pub history_window: usize,
}

impl Default for TutorConfig {
    fn default() -> Self {
        let agent = AgentConfig::default();
        Self {
            topic: agent.topic,
            level: agent.level,
            language: agent.language,
            model: DEFAULT_MODEL.to_string(),
            temperature: agent.model.temperature,
            max_tokens: agent.model.max_tokens,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

impl TutorConfig {
    /// The session configuration these settings describe.
    #[must_use]
    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig::new(&self.topic, self.level, &self.language).with_model(ModelParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            history_window: self.history_window,
        })
    }
}

/// Severity of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    /// The bot cannot run with this configuration.
    Error,
    /// The bot runs, possibly not as intended.
    Warning,
}

/// A problem found by [`BotConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Severity.
    pub level: IssueLevel,
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong.
    pub message: String,
}

impl ConfigIssue {
    fn error(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            field,
            message: message.into(),
        }
    }

    fn warning(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            IssueLevel::Error => "error",
            IssueLevel::Warning => "warning",
        };
        write!(f, "{level}: {}: {}", self.field, self.message)
    }
}

impl BotConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|v| !v.is_empty()) {
            self.provider.base_url = url;
        }
        if let Some(model) = lookup("PARLA_MODEL").filter(|v| !v.is_empty()) {
            self.tutor.model = model;
        }
    }

    /// Check the configuration for problems.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.tutor.topic.trim().is_empty() {
            issues.push(ConfigIssue::error("tutor.topic", "must not be empty"));
        }
        if self.tutor.language.trim().is_empty() {
            issues.push(ConfigIssue::error("tutor.language", "must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.tutor.temperature) {
            issues.push(ConfigIssue::error(
                "tutor.temperature",
                format!("{} is outside 0.0..=2.0", self.tutor.temperature),
            ));
        }
        if self.tutor.max_tokens == 0 {
            issues.push(ConfigIssue::error("tutor.max_tokens", "must be positive"));
        }
        if self.provider.base_url.trim().is_empty() {
            issues.push(ConfigIssue::error("provider.base_url", "must not be empty"));
        }
        if self.provider.api_key.is_none() {
            issues.push(ConfigIssue::warning(
                "provider.api_key",
                "not set; export OPENAI_API_KEY or use --offline",
            ));
        }

        issues
    }

    /// Build the backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the client cannot be
    /// built.
    pub fn build_client(&self) -> ConfigResult<OpenAiClient> {
        let api_key = self
            .provider
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::missing("provider.api_key (or OPENAI_API_KEY)"))?;

        OpenAiClient::builder()
            .api_key(api_key)
            .base_url(&self.provider.base_url)
            .timeout_secs(self.provider.timeout_secs)
            .build()
            .map_err(|e| ConfigError::invalid(e.to_string()))
    }
}

/// Whether any issue is an error.
#[must_use]
pub fn has_errors(issues: &[ConfigIssue]) -> bool {
    issues.iter().any(|i| i.level == IssueLevel::Error)
}

/// The configuration directory (`~/.parla`).
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

/// The default configuration file path.
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Read a configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn read_config(path: &Path) -> ConfigResult<BotConfig> {
    let content = tokio::fs::read_to_string(path).await?;
    let config = serde_json::from_str(&content)?;
    debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Load the configuration, falling back to defaults when the file is absent.
///
/// Environment overrides are applied.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load_config(path: &Path) -> ConfigResult<BotConfig> {
    let mut config = if tokio::fs::try_exists(path).await? {
        read_config(path).await?
    } else {
        debug!(path = %path.display(), "No configuration file; using defaults");
        BotConfig::default()
    };
    config.apply_env();
    Ok(config)
}

/// Write a configuration file, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn save_config(path: &Path, config: &BotConfig) -> ConfigResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

/// Write the default configuration to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn init_config(path: &Path) -> ConfigResult<BotConfig> {
    let config = BotConfig::default();
    save_config(path, &config).await?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("parla-test-{}", parla::util::generate_session_id()))
            .join(CONFIG_FILE)
    }

    #[test]
    fn test_partial_config() {
        let config: BotConfig =
            serde_json::from_str(r#"{"tutor": {"topic": "travel", "level": "advanced"}}"#)
                .expect("parse");
        assert_eq!(config.tutor.topic, "travel");
        assert_eq!(config.tutor.level, Level::Advanced);
        assert_eq!(config.provider.base_url, OPENAI_API_BASE_URL);
        assert_eq!(config.tutor.history_window, DEFAULT_HISTORY_WINDOW);
    }

    #[test]
    fn test_overrides() {
        let mut config = BotConfig::default();
        config.apply_overrides(|name| match name {
            "OPENAI_API_KEY" => Some("sk-test".into()),
            "PARLA_MODEL" => Some("gpt-4o".into()),
            "OPENAI_BASE_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.tutor.model, "gpt-4o");
        assert_eq!(config.provider.base_url, OPENAI_API_BASE_URL);
    }

    #[test]
    fn test_validate() {
        let mut config = BotConfig::default();
        let issues = config.validate();
        assert!(!has_errors(&issues));
        assert!(issues.iter().any(|i| i.field == "provider.api_key"));

        config.tutor.topic = "  ".into();
        config.tutor.temperature = 2.5;
        config.tutor.max_tokens = 0;
        let fields: Vec<&str> = config.validate().iter().map(|i| i.field).collect();
        assert!(fields.contains(&"tutor.topic"));
        assert!(fields.contains(&"tutor.temperature"));
        assert!(fields.contains(&"tutor.max_tokens"));
        assert!(has_errors(&config.validate()));
    }

    #[test]
    fn test_agent_config() {
        let tutor = TutorConfig {
            topic: "music".into(),
            history_window: 6,
            ..TutorConfig::default()
        };
        let agent = tutor.to_agent_config();
        assert_eq!(agent.topic, "music");
        assert_eq!(agent.model.history_window, 6);
        assert_eq!(agent.model.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_build_client_requires_key() {
        let mut config = BotConfig::default();
        assert!(matches!(config.build_client(), Err(ConfigError::Missing(_))));
        config.provider.api_key = Some("sk-test".into());
        assert!(config.build_client().is_ok());
    }

    #[tokio::test]
    async fn test_save_and_read() {
        let path = temp_path();
        let mut config = BotConfig::default();
        config.tutor.topic = "cooking".into();
        save_config(&path, &config).await.expect("save");

        let loaded = read_config(&path).await.expect("read");
        assert_eq!(loaded, config);

        if let Some(dir) = path.parent() {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() {
        assert!(matches!(
            read_config(&temp_path()).await,
            Err(ConfigError::Io(_))
        ));
    }
}
