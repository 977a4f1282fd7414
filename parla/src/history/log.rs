//! The per-session conversation log.

use super::types::{EvaluationResult, LogStats, Role, SuggestionResult, Turn};
use crate::providers::ChatMessage;
use crate::util::timestamp_ms;
use serde::{Deserialize, Serialize};

/// Ordered record of turns with stable indices.
///
/// The log performs no synchronization of its own. Callers reach it through
/// the owning session's lock, which serializes every mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationLog {
    turns: Vec<Turn>,
    next_index: u64,
}

impl ConversationLog {
    /// Create an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            turns: Vec::new(),
            next_index: 0,
        }
    }

    /// Append a turn and return its freshly allocated index.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.turns.push(Turn {
            index,
            role,
            content: content.into(),
            evaluation: None,
            suggestion: None,
            truncated: false,
            created_at: timestamp_ms(),
        });
        index
    }

    /// Overwrite the newest turn of `role`, or append one if none exists.
    pub fn update_last_of_role(&mut self, role: Role, content: impl Into<String>) -> u64 {
        match self.last_of_role_mut(role) {
            Some(turn) => {
                turn.content = content.into();
                turn.index
            }
            None => self.append(role, content),
        }
    }

    /// Attach an evaluation to the newest user turn. No-op on a log without one.
    ///
    /// Returns the index of the turn that received it.
    pub fn attach_evaluation(&mut self, evaluation: EvaluationResult) -> Option<u64> {
        let turn = self.last_of_role_mut(Role::User)?;
        turn.evaluation = Some(evaluation);
        Some(turn.index)
    }

    /// Attach a suggestion to the newest assistant turn. No-op on a log without one.
    ///
    /// Returns the index of the turn that received it.
    pub fn attach_suggestion(&mut self, suggestion: SuggestionResult) -> Option<u64> {
        let turn = self.last_of_role_mut(Role::Assistant)?;
        turn.suggestion = Some(suggestion);
        Some(turn.index)
    }

    /// Flag the newest turn of `role` as cut short.
    pub fn mark_last_truncated(&mut self, role: Role) -> Option<u64> {
        let turn = self.last_of_role_mut(role)?;
        turn.truncated = true;
        Some(turn.index)
    }

    /// The last `n` turns in original order.
    ///
    /// `n == 0` or `n` beyond the length yields the whole log.
    #[must_use]
    pub fn recent(&self, n: usize) -> &[Turn] {
        if n == 0 || n >= self.turns.len() {
            &self.turns
        } else {
            &self.turns[self.turns.len() - n..]
        }
    }

    /// Recent turns as chat messages, oldest first.
    #[must_use]
    pub fn to_messages(&self, n: usize) -> Vec<ChatMessage> {
        self.recent(n)
            .iter()
            .map(|turn| ChatMessage::new(turn.role, turn.content.clone()))
            .collect()
    }

    /// Newest turn of `role`.
    #[must_use]
    pub fn last_of_role(&self, role: Role) -> Option<&Turn> {
        self.turns.iter().rev().find(|turn| turn.role == role)
    }

    fn last_of_role_mut(&mut self, role: Role) -> Option<&mut Turn> {
        self.turns.iter_mut().rev().find(|turn| turn.role == role)
    }

    /// Look a turn up by its stable index.
    #[must_use]
    pub fn get(&self, index: u64) -> Option<&Turn> {
        self.turns
            .binary_search_by_key(&index, |turn| turn.index)
            .ok()
            .map(|pos| &self.turns[pos])
    }

    /// All turns, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if the log holds no turns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop the oldest turns so at most `max` remain. Indices are untouched.
    pub fn trim_to(&mut self, max: usize) {
        if self.turns.len() > max {
            let excess = self.turns.len() - max;
            self.turns.drain(..excess);
        }
    }

    /// Drop every turn and restart numbering at zero.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.next_index = 0;
    }

    /// Per-role counts.
    #[must_use]
    pub fn stats(&self) -> LogStats {
        self.turns
            .iter()
            .fold(LogStats::default(), |mut stats, turn| {
                match turn.role {
                    Role::User => stats.user += 1,
                    Role::Assistant => stats.assistant += 1,
                    Role::System => stats.system += 1,
                }
                stats
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EvaluationStatus;

    fn evaluation() -> EvaluationResult {
        EvaluationResult {
            status: EvaluationStatus::Good,
            short_description: "Nice".into(),
            long_description: "Mostly correct.".into(),
            corrected: "I went home.".into(),
        }
    }

    #[test]
    fn test_append_indices_are_sequential() {
        let mut log = ConversationLog::new();
        let indices: Vec<u64> = (0..5)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                log.append(role, format!("msg {i}"))
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_indices_survive_updates() {
        let mut log = ConversationLog::new();
        assert_eq!(log.append(Role::User, "a"), 0);
        assert_eq!(log.update_last_of_role(Role::User, "a2"), 0);
        assert_eq!(log.append(Role::Assistant, "b"), 1);
        assert_eq!(log.update_last_of_role(Role::Assistant, "b2"), 1);
        assert_eq!(log.append(Role::User, "c"), 2);
        assert_eq!(log.len(), 3);
        assert_eq!(log.turns()[1].content, "b2");
    }

    #[test]
    fn test_update_on_empty_log_appends() {
        let mut log = ConversationLog::new();
        assert_eq!(log.update_last_of_role(Role::Assistant, "x"), 0);
        assert_eq!(log.len(), 1);
        assert_eq!(log.turns()[0].role, Role::Assistant);
        assert_eq!(log.turns()[0].content, "x");
    }

    #[test]
    fn test_first_exchange_scenario() {
        let mut log = ConversationLog::new();
        assert_eq!(log.append(Role::User, "Hi"), 0);
        assert_eq!(log.len(), 1);

        assert_eq!(log.update_last_of_role(Role::Assistant, "Hello!"), 1);
        assert_eq!(log.len(), 2);
        let turn = &log.turns()[1];
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content, "Hello!");
    }

    #[test]
    fn test_update_targets_newest_turn_of_role() {
        let mut log = ConversationLog::new();
        log.append(Role::Assistant, "first");
        log.append(Role::User, "reply");
        log.append(Role::Assistant, "second");
        log.append(Role::User, "another");

        assert_eq!(log.update_last_of_role(Role::Assistant, "second!"), 2);
        assert_eq!(log.turns()[0].content, "first");
        assert_eq!(log.turns()[2].content, "second!");
    }

    #[test]
    fn test_attach_evaluation_never_creates_turns() {
        let mut log = ConversationLog::new();
        assert_eq!(log.attach_evaluation(evaluation()), None);
        assert!(log.is_empty());

        log.append(Role::User, "I goed home");
        log.append(Role::Assistant, "Oh?");
        let before = log.len();
        assert_eq!(log.attach_evaluation(evaluation()), Some(0));
        assert_eq!(log.len(), before);
        assert!(log.turns()[0].evaluation.is_some());
        assert!(log.turns()[1].evaluation.is_none());
    }

    #[test]
    fn test_attach_suggestion_targets_assistant() {
        let mut log = ConversationLog::new();
        let suggestion = SuggestionResult {
            leading_sentence: "I think".into(),
            vocab_options: Vec::new(),
        };
        log.append(Role::User, "hi");
        assert_eq!(log.attach_suggestion(suggestion.clone()), None);

        log.append(Role::Assistant, "hello");
        assert_eq!(log.attach_suggestion(suggestion), Some(1));
        assert!(log.turns()[1].suggestion.is_some());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_recent() {
        let mut log = ConversationLog::new();
        for i in 0..5 {
            log.append(Role::User, i.to_string());
        }
        let contents = |turns: &[Turn]| turns.iter().map(|t| t.content.clone()).collect::<Vec<_>>();
        assert_eq!(contents(log.recent(2)), vec!["3", "4"]);
        assert_eq!(log.recent(0).len(), 5);
        assert_eq!(log.recent(50).len(), 5);
    }

    #[test]
    fn test_reset_restarts_numbering() {
        let mut log = ConversationLog::new();
        log.append(Role::User, "a");
        log.append(Role::Assistant, "b");
        log.reset();
        assert_eq!(log.len(), 0);
        assert_eq!(log.append(Role::User, "c"), 0);
    }

    #[test]
    fn test_trim_keeps_indices_stable() {
        let mut log = ConversationLog::new();
        for i in 0..4 {
            log.append(Role::User, i.to_string());
        }
        log.trim_to(2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.turns()[0].index, 2);
        assert_eq!(log.get(3).map(|t| t.content.as_str()), Some("3"));
        assert!(log.get(0).is_none());
        assert_eq!(log.append(Role::Assistant, "x"), 4);
    }

    #[test]
    fn test_stats() {
        let mut log = ConversationLog::new();
        log.append(Role::System, "setup");
        log.append(Role::User, "a");
        log.append(Role::Assistant, "b");
        log.append(Role::User, "c");
        let stats = log.stats();
        assert_eq!(stats.user, 2);
        assert_eq!(stats.assistant, 1);
        assert_eq!(stats.system, 1);
        assert_eq!(stats.total(), 4);
    }

    #[test]
    fn test_to_messages_uses_recent_window() {
        let mut log = ConversationLog::new();
        log.append(Role::User, "a");
        log.append(Role::Assistant, "b");
        log.append(Role::User, "c");
        let messages = log.to_messages(2);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[1].content, "c");
    }
}
