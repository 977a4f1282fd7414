//! Events emitted while a turn is in flight.

use crate::history::EvaluationResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The two concurrent producers of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// The streamed tutor reply.
    Streaming,
    /// The evaluation of the learner's message.
    Evaluation,
}

impl Lane {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Evaluation => "evaluation",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of a turn's outbound sequence.
///
/// Fragments arrive in generation order, an evaluation (if any) arrives
/// before [`TurnEvent::TurnComplete`], and `TurnComplete` is always last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A piece of the tutor's reply.
    Fragment {
        /// Fragment text.
        text: String,
    },
    /// The learner's message was evaluated.
    Evaluation {
        /// The evaluation.
        result: EvaluationResult,
    },
    /// A lane failed. Not terminal.
    Error {
        /// The failing lane.
        lane: Lane,
        /// Failure description.
        message: String,
    },
    /// Both lanes are drained and committed.
    TurnComplete(TurnSummary),
}

impl TurnEvent {
    /// Whether this is the terminal marker.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnComplete(_))
    }

    /// Fragment text, if this is a fragment.
    #[must_use]
    pub fn as_fragment(&self) -> Option<&str> {
        match self {
            Self::Fragment { text } => Some(text),
            _ => None,
        }
    }
}

/// What a turn committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSummary {
    /// Session the turn ran in.
    pub session_id: String,
    /// Index of the learner's turn.
    pub user_index: u64,
    /// Index of the tutor's turn, if one was committed.
    pub assistant_index: Option<u64>,
    /// Whether an evaluation was attached to the learner's turn.
    pub evaluation_committed: bool,
    /// Whether the tutor's turn holds a partial reply.
    pub truncated: bool,
    /// Number of fragments forwarded.
    pub fragments: usize,
    /// Number of error events forwarded.
    pub errors: usize,
    /// Wall time from start to commit.
    pub elapsed: Duration,
}

impl fmt::Display for TurnSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Turn Summary")?;
        writeln!(f, "  Session:    {}", self.session_id)?;
        writeln!(f, "  Learner:    #{}", self.user_index)?;
        match self.assistant_index {
            Some(index) if self.truncated => writeln!(f, "  Tutor:      #{index} (truncated)")?,
            Some(index) => writeln!(f, "  Tutor:      #{index}")?,
            None => writeln!(f, "  Tutor:      -")?,
        }
        writeln!(f, "  Evaluated:  {}", self.evaluation_committed)?;
        writeln!(f, "  Fragments:  {}", self.fragments)?;
        writeln!(f, "  Errors:     {}", self.errors)?;
        writeln!(f, "  Duration:   {:.2}s", self.elapsed.as_secs_f64())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = TurnEvent::Error {
            lane: Lane::Evaluation,
            message: "timeout".into(),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "error");
        assert_eq!(json["lane"], "evaluation");
        assert!(!event.is_terminal());

        let fragment = TurnEvent::Fragment { text: "Ciao".into() };
        assert_eq!(fragment.as_fragment(), Some("Ciao"));
    }

    #[test]
    fn test_summary_display() {
        let summary = TurnSummary {
            session_id: "s1".into(),
            user_index: 2,
            assistant_index: Some(3),
            evaluation_committed: true,
            truncated: true,
            fragments: 4,
            errors: 1,
            elapsed: Duration::from_millis(1500),
        };
        let text = summary.to_string();
        assert!(text.contains("#3 (truncated)"));
        assert!(text.contains("1.50s"));
        assert!(TurnEvent::TurnComplete(summary).is_terminal());
    }
}
