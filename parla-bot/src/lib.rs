//! Parla Bot - an interactive language tutor for the terminal.
//!
//! This crate wires the [`parla`] library into a command-line program:
//!
//! - **Config** ([`config`]) - JSON configuration with environment overrides
//! - **Chat** ([`chat`]) - streaming REPL with inline feedback and commands
//! - **Errors** ([`error`]) - unified error types for the binary
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use parla_bot::prelude::*;
//!
//! let config = load_config(&config_path()).await?;
//! let tutor = Tutor::new(Arc::new(config.build_client()?));
//! ChatRepl::new(tutor, config.tutor.to_agent_config(), None, ChatOptions::default())
//!     .await
//!     .run()
//!     .await?;
//! ```

pub mod chat;
pub mod config;
pub mod error;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::chat::{ChatOptions, ChatRepl, Command, offline_client};
    pub use crate::config::{
        BotConfig, ConfigIssue, IssueLevel, ProviderConfig, TutorConfig, config_dir, config_path,
        has_errors, init_config, load_config, read_config, save_config,
    };
    pub use crate::error::{BotError, ConfigError, ConfigResult, ErrorContext, Result};
}
