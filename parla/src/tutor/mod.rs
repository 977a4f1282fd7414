//! The tutor: configuration, prompts and the calls built on them.
//!
//! A [`Tutor`] pairs a completion backend with a [`PromptSet`]. Besides the
//! two lanes of a conversation turn (see [`crate::orchestrator`]) it offers
//! services that read a session's committed log:
//!
//! - [`Tutor::evaluate`] rates a learner reply
//! - [`Tutor::suggest`] proposes the learner's next reply
//! - [`Tutor::vocabulary_tips`] and [`Tutor::assess`] return tag-markup groups

mod config;
mod prompts;
mod service;

pub use config::{AgentConfig, DEFAULT_HISTORY_WINDOW, DEFAULT_MODEL, Level, ModelParams};
pub use prompts::{PromptSet, render};
pub use service::{EVALUATION_SCHEMA, SUGGESTION_SCHEMA, Tutor};
