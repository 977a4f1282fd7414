//! Conversation history for tutoring sessions.
//!
//! A [`ConversationLog`] is an ordered list of [`Turn`]s, each with an index
//! that is allocated once and never reused. Side-data produced after the fact
//! (learner evaluations, reply suggestions) is attached to the most recent turn
//! of the matching role.
//!
//! # Example
//!
//! ```rust,ignore
//! use parla::history::{ConversationLog, Role};
//!
//! let mut log = ConversationLog::new();
//! let user = log.append(Role::User, "Hi");
//! let assistant = log.update_last_of_role(Role::Assistant, "Hello!");
//! assert_eq!((user, assistant), (0, 1));
//! ```

mod log;
mod types;

pub use log::ConversationLog;
pub use types::{
    EvaluationResult, EvaluationStatus, LogStats, Role, SUGGESTION_OPTIONS, SuggestionResult,
    Turn, VocabOption,
};
