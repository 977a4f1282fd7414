//! Session-scoped streaming orchestration.
//!
//! [`Orchestrator::advance_turn`] records the learner's message, then runs two
//! lanes concurrently against the backend:
//!
//! - the **streaming lane** produces the tutor's reply fragment by fragment
//! - the **evaluation lane** rates the learner's message with one structured
//!   call
//!
//! Both are merged into one [`TurnStream`] of [`TurnEvent`]s and committed to
//! the session log. The session lock is held from the moment the learner's
//! message is recorded until both lanes are committed, so turns on one
//! session serialize while different sessions run in parallel.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use parla::prelude::*;
//!
//! let orchestrator = Orchestrator::new(Tutor::new(client));
//! let session = registry.create("travel", Level::Beginner, "English", None).await;
//!
//! let mut turn = orchestrator.advance_turn(&session, "I went to Rome").await;
//! while let Some(event) = turn.next().await {
//!     match event {
//!         TurnEvent::Fragment { text } => print!("{text}"),
//!         TurnEvent::Evaluation { result } => println!("\n[{:?}]", result.status),
//!         TurnEvent::Error { lane, message } => eprintln!("{lane}: {message}"),
//!         TurnEvent::TurnComplete(summary) => println!("\n{summary}"),
//!     }
//! }
//! ```

mod events;
mod merge;
mod telemetry;

pub use events::{Lane, TurnEvent, TurnSummary};
pub use telemetry::{TurnMetrics, TurnTelemetry};

use crate::history::Role;
use crate::providers::{CompletionRequest, SharedClient};
use crate::session::{Session, SessionHandle};
use crate::tutor::Tutor;
use futures::{Stream, StreamExt};
use merge::{EvaluationOutcome, LaneMessage, Merge};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{OwnedMutexGuard, mpsc, oneshot};
use tracing::{Instrument, debug, info};

/// Default capacity of a turn's outbound event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default number of turns a session log keeps; older turns are dropped after
/// each commit.
pub const DEFAULT_MAX_LOG_TURNS: usize = 200;

/// Capacity of the streaming lane's channel into the merge.
const LANE_CAPACITY: usize = 64;

/// Drives conversation turns.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    tutor: Tutor,
    event_capacity: usize,
    max_log_turns: usize,
}

impl Orchestrator {
    /// Create an orchestrator around a tutor.
    #[must_use]
    pub const fn new(tutor: Tutor) -> Self {
        Self {
            tutor,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_log_turns: DEFAULT_MAX_LOG_TURNS,
        }
    }

    /// Set the outbound event channel capacity.
    ///
    /// A consumer that stops polling stalls the turn once this many events are
    /// buffered; dropping the [`TurnStream`] does not.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Cap the session log at `max` turns, trimmed after each commit.
    ///
    /// `0` keeps every turn.
    #[must_use]
    pub const fn with_max_log_turns(mut self, max: usize) -> Self {
        self.max_log_turns = max;
        self
    }

    /// The tutor used for both lanes.
    #[must_use]
    pub const fn tutor(&self) -> &Tutor {
        &self.tutor
    }

    /// Run one learner turn on `session`.
    ///
    /// Waits for any turn already running on the session, records
    /// `user_message`, and returns the event stream of the new turn. The turn
    /// runs to completion in the background even if the stream is dropped.
    pub async fn advance_turn(
        &self,
        session: &SessionHandle,
        user_message: impl Into<String>,
    ) -> TurnStream {
        let guard = Arc::clone(session).lock_owned().await;
        let (events_tx, events_rx) = mpsc::channel(self.event_capacity);
        let span = TurnTelemetry::turn_span(guard.id());
        let tutor = self.tutor.clone();
        let user_message = user_message.into();

        let turn = drive_turn(tutor, guard, user_message, events_tx, self.max_log_turns);
        tokio::spawn(turn.instrument(span));

        TurnStream { events: events_rx }
    }
}

/// Run both lanes and commit their results while holding the session.
async fn drive_turn(
    tutor: Tutor,
    mut session: OwnedMutexGuard<Session>,
    user_message: String,
    events: mpsc::Sender<TurnEvent>,
    max_log_turns: usize,
) {
    let session_id = session.id().to_string();
    let config = session.config().clone();

    let user_index = session.log_mut().append(Role::User, user_message.clone());
    let last_assistant = session
        .log()
        .last_of_role(Role::Assistant)
        .map(|turn| turn.content.clone())
        .unwrap_or_default();
    let request =
        tutor.conversation_request(&config, session.log().to_messages(config.model.history_window));
    debug!(user_index, history = request.messages.len(), "Turn started");

    let (lane_tx, lane_rx) = mpsc::channel(LANE_CAPACITY);
    tokio::spawn(streaming_lane(Arc::clone(tutor.client()), request, lane_tx).in_current_span());

    let (eval_tx, eval_rx) = oneshot::channel::<EvaluationOutcome>();
    tokio::spawn(
        async move {
            let outcome = tutor
                .evaluate(&config, &last_assistant, &user_message)
                .await;
            let _ = eval_tx.send(outcome);
        }
        .in_current_span(),
    );

    let outcome = Merge::new(session.log_mut(), &events, user_index)
        .run(lane_rx, eval_rx)
        .await;
    if max_log_turns > 0 {
        session.log_mut().trim_to(max_log_turns);
    }

    let summary = TurnSummary {
        session_id,
        user_index,
        assistant_index: outcome.assistant_index,
        evaluation_committed: outcome.evaluation_committed,
        truncated: outcome.truncated,
        fragments: outcome.metrics.fragments,
        errors: outcome.metrics.errors,
        elapsed: outcome.metrics.duration.unwrap_or_default(),
    };
    info!(
        user_index,
        assistant_index = ?summary.assistant_index,
        evaluated = summary.evaluation_committed,
        truncated = summary.truncated,
        "Turn committed"
    );
    let _ = events.send(TurnEvent::TurnComplete(summary)).await;
}

/// Forward a streaming completion into the merge.
async fn streaming_lane(
    client: SharedClient,
    request: CompletionRequest,
    lane: mpsc::Sender<LaneMessage>,
) {
    let mut stream = match client.complete_streaming(request).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = lane.send(LaneMessage::Failed(e.to_string())).await;
            return;
        }
    };

    while let Some(item) = stream.next().await {
        let message = match item {
            Ok(fragment) => LaneMessage::Fragment(fragment),
            Err(e) => {
                let _ = lane.send(LaneMessage::Failed(e.to_string())).await;
                return;
            }
        };
        if lane.send(message).await.is_err() {
            return;
        }
    }

    let _ = lane.send(LaneMessage::Finished).await;
}

/// The ordered events of one turn.
///
/// Ends after [`TurnEvent::TurnComplete`].
#[derive(Debug)]
pub struct TurnStream {
    events: mpsc::Receiver<TurnEvent>,
}

impl TurnStream {
    /// Drain the stream and return the final summary.
    ///
    /// Returns `None` only if the turn task ended abnormally.
    pub async fn finish(mut self) -> Option<TurnSummary> {
        while let Some(event) = self.events.recv().await {
            if let TurnEvent::TurnComplete(summary) = event {
                return Some(summary);
            }
        }
        None
    }
}

impl Stream for TurnStream {
    type Item = TurnEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}
