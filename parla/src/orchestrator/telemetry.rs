//! Turn telemetry on top of `tracing`.
//!
//! Counters are kept for the [`TurnSummary`](super::TurnSummary); the events
//! themselves go to whatever subscriber the application installed.

use super::events::Lane;
use tokio::time::{Duration, Instant};
use tracing::{Span, debug, info, info_span, warn};

/// Counters collected while a turn runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnMetrics {
    /// Fragments forwarded.
    pub fragments: usize,
    /// Characters of reply text forwarded.
    pub chars: usize,
    /// Error events forwarded.
    pub errors: usize,
    /// Total duration, set on completion.
    pub duration: Option<Duration>,
}

impl TurnMetrics {
    /// Fragments per second over the whole turn.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fragments_per_second(&self) -> Option<f64> {
        self.duration.map(|d| {
            let secs = d.as_secs_f64();
            if secs > 0.0 {
                self.fragments as f64 / secs
            } else {
                0.0
            }
        })
    }
}

/// Telemetry collector for one turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnTelemetry {
    start: Instant,
    metrics: TurnMetrics,
}

impl Default for TurnTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnTelemetry {
    /// Start collecting.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            metrics: TurnMetrics::default(),
        }
    }

    /// Record a forwarded fragment.
    pub fn record_fragment(&mut self, fragment: &str) {
        self.metrics.fragments += 1;
        self.metrics.chars += fragment.chars().count();
        if self.metrics.fragments == 1 {
            debug!(
                first_fragment_ms = self.start.elapsed().as_millis(),
                "first_fragment"
            );
        }
    }

    /// Record a lane failure.
    pub fn record_error(&mut self, lane: Lane, message: &str) {
        self.metrics.errors += 1;
        warn!(%lane, error = message, "lane_failed");
    }

    /// Record a settled evaluation.
    pub fn record_evaluation(&self, committed: bool) {
        debug!(
            committed,
            elapsed_ms = self.start.elapsed().as_millis(),
            "evaluation_settled"
        );
    }

    /// Complete the turn and return final metrics.
    #[must_use]
    pub fn complete(&mut self) -> TurnMetrics {
        let duration = self.start.elapsed();
        self.metrics.duration = Some(duration);

        info!(
            fragments = self.metrics.fragments,
            chars = self.metrics.chars,
            errors = self.metrics.errors,
            duration_ms = duration.as_millis(),
            "turn_completed"
        );

        self.metrics
    }

    /// Current metrics snapshot.
    #[must_use]
    pub const fn metrics(&self) -> &TurnMetrics {
        &self.metrics
    }

    /// Span covering one turn.
    #[must_use]
    pub fn turn_span(session_id: &str) -> Span {
        info_span!("turn", session = %session_id)
    }
}
