//! Parla is a library for language-tutoring conversations driven by an LLM.
//!
//! A learner talks to a tutor about a topic at their level. Every learner
//! message starts a turn in which the tutor's reply is streamed while the
//! message itself is evaluated, and both results are committed to the
//! session's conversation log.
//!
//! # Modules
//!
//! - [`history`]: the conversation log and its turn types
//! - [`markup`]: decoder for the tutor's `<t>…</t><d>…</d>` tag markup
//! - [`providers`]: completion backends (`OpenAI`-compatible, scripted)
//! - [`tutor`]: configuration, prompts, evaluation and suggestion services
//! - [`orchestrator`]: the two-lane streaming turn
//! - [`session`]: sessions and the session registry
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use parla::prelude::*;
//! use std::sync::Arc;
//!
//! let client = Arc::new(OpenAiClient::from_env()?);
//! let orchestrator = Orchestrator::new(Tutor::new(client));
//! let registry = SessionRegistry::new();
//!
//! let session = registry.create("travel", Level::Beginner, "English", None).await;
//! let mut turn = orchestrator.advance_turn(&session, "Hello!").await;
//! while let Some(event) = turn.next().await {
//!     if let Some(text) = event.as_fragment() {
//!         print!("{text}");
//!     }
//! }
//! ```

pub mod error;
pub mod history;
pub mod markup;
pub mod orchestrator;
pub mod prelude;
pub mod providers;
pub mod session;
pub mod tutor;
pub mod util;

pub use error::{Error, LlmError, LlmErrorKind, Result};
