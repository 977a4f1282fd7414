//! Commonly used types.

pub use crate::error::{Error, LlmError, Result};
pub use crate::history::{
    ConversationLog, EvaluationResult, EvaluationStatus, Role, SuggestionResult, Turn,
};
pub use crate::markup::{ExtraKind, MarkupGroup};
pub use crate::orchestrator::{Lane, Orchestrator, TurnEvent, TurnStream, TurnSummary};
pub use crate::providers::{
    ChatMessage, CompletionClient, CompletionRequest, OpenAiClient, ScriptedClient, SharedClient,
};
pub use crate::session::{Session, SessionHandle, SessionRegistry};
pub use crate::tutor::{AgentConfig, Level, ModelParams, PromptSet, Tutor};
