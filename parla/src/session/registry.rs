//! Registry of live sessions.

use super::state::Session;
use crate::error::{Error, Result};
use crate::history::ConversationLog;
use crate::tutor::{AgentConfig, Level, ModelParams};
use crate::util::generate_session_id;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Shared handle to one session.
///
/// Holding its lock is the only way to touch the session; a conversation turn
/// holds it until the reply is committed.
pub type SessionHandle = Arc<Mutex<Session>>;

/// In-memory map from session id to session.
///
/// The map lock is held only to look up, insert or remove handles, so turns
/// on different sessions never wait for each other.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    model: ModelParams,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create an empty registry with default model parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_model(ModelParams::default())
    }

    /// Create an empty registry whose new sessions use `model`.
    #[must_use]
    pub fn with_model(model: ModelParams) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            model,
        }
    }

    /// Model parameters given to sessions created from topic, level and
    /// language alone.
    #[must_use]
    pub const fn model(&self) -> &ModelParams {
        &self.model
    }

    /// Create a session, replacing any existing one under the same id.
    ///
    /// A fresh id is generated when `session_id` is `None`. A turn still
    /// running on a replaced session finishes against the old state.
    pub async fn create(
        &self,
        topic: impl Into<String>,
        level: Level,
        language: impl Into<String>,
        session_id: Option<String>,
    ) -> SessionHandle {
        let config = AgentConfig::new(topic, level, language).with_model(self.model.clone());
        self.create_with(config, session_id).await
    }

    /// Create a session from a full configuration.
    pub async fn create_with(&self, config: AgentConfig, session_id: Option<String>) -> SessionHandle {
        let id = session_id.unwrap_or_else(generate_session_id);
        let handle = Arc::new(Mutex::new(Session::new(id.clone(), config)));
        let replaced = self
            .sessions
            .lock()
            .await
            .insert(id.clone(), Arc::clone(&handle))
            .is_some();
        info!(session = %id, replaced, "Session created");
        handle
    }

    /// Look up a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if no session has this id.
    pub async fn get(&self, session_id: &str) -> Result<SessionHandle> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    /// Look up a session, creating it from `config` if missing.
    pub async fn get_or_create(&self, session_id: &str, config: AgentConfig) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(session_id) {
            debug!(session = %session_id, "Loaded existing session");
            return Arc::clone(handle);
        }
        let handle = Arc::new(Mutex::new(Session::new(session_id, config)));
        sessions.insert(session_id.to_string(), Arc::clone(&handle));
        debug!(session = %session_id, "Created new session");
        handle
    }

    /// Remove a session, returning its handle if it existed.
    pub async fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        let removed = self.sessions.lock().await.remove(session_id);
        if removed.is_some() {
            info!(session = %session_id, "Session removed");
        }
        removed
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Ids of all live sessions, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Copy of a session's log taken under its lock.
    ///
    /// Waits for an in-flight turn to commit first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if no session has this id.
    pub async fn snapshot(&self, session_id: &str) -> Result<ConversationLog> {
        let handle = self.get(session_id).await?;
        let session = handle.lock().await;
        Ok(session.log().clone())
    }

    /// Replace a session's configuration.
    ///
    /// Returns `true` if the log was reset because the topic, level or
    /// language changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if no session has this id.
    pub async fn update_config(&self, session_id: &str, config: AgentConfig) -> Result<bool> {
        let handle = self.get(session_id).await?;
        let reset = handle.lock().await.set_config(config);
        info!(session = %session_id, reset, "Session configuration updated");
        Ok(reset)
    }
}
