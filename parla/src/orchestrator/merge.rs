//! Two-lane merge for one turn.
//!
//! The streaming lane feeds [`LaneMessage`]s through an mpsc channel; the
//! evaluation lane settles a oneshot. [`Merge::run`] forwards both into the
//! outbound event channel and commits into the log:
//!
//! ```text
//!   Streaming ──(finished | failed)──▶ AwaitingEvaluation ──(settled)──▶ Done
//!       │                                                                  ▲
//!       └────────────(finished | failed, evaluation already settled)───────┘
//! ```
//!
//! The evaluation may settle in either state. Each field is committed at most
//! once: the reply when the streaming lane ends, the evaluation when it
//! arrives.

use super::events::{Lane, TurnEvent};
use super::telemetry::{TurnMetrics, TurnTelemetry};
use crate::error::Result;
use crate::history::{ConversationLog, EvaluationResult, Role};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Output of the streaming lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LaneMessage {
    /// Next piece of the reply.
    Fragment(String),
    /// The stream ended normally.
    Finished,
    /// The stream could not be opened or broke off.
    Failed(String),
}

/// Settled value of the evaluation lane.
pub(crate) type EvaluationOutcome = Result<EvaluationResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeState {
    Streaming,
    AwaitingEvaluation,
    Done,
}

/// What a merge committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergeOutcome {
    pub assistant_index: Option<u64>,
    pub truncated: bool,
    pub evaluation_committed: bool,
    pub metrics: TurnMetrics,
}

/// Merge state for one turn.
pub(crate) struct Merge<'a> {
    log: &'a mut ConversationLog,
    events: &'a mpsc::Sender<TurnEvent>,
    user_index: u64,
    buffer: String,
    assistant_index: Option<u64>,
    truncated: bool,
    evaluation_settled: bool,
    evaluation_committed: bool,
    telemetry: TurnTelemetry,
}

impl<'a> Merge<'a> {
    pub(crate) fn new(
        log: &'a mut ConversationLog,
        events: &'a mpsc::Sender<TurnEvent>,
        user_index: u64,
    ) -> Self {
        Self {
            log,
            events,
            user_index,
            buffer: String::new(),
            assistant_index: None,
            truncated: false,
            evaluation_settled: false,
            evaluation_committed: false,
            telemetry: TurnTelemetry::new(),
        }
    }

    /// Drive both lanes to completion.
    pub(crate) async fn run(
        mut self,
        mut stream: mpsc::Receiver<LaneMessage>,
        mut evaluation: oneshot::Receiver<EvaluationOutcome>,
    ) -> MergeOutcome {
        let mut state = MergeState::Streaming;

        loop {
            state = match state {
                MergeState::Streaming => {
                    tokio::select! {
                        biased;
                        settled = &mut evaluation, if !self.evaluation_settled => {
                            self.on_evaluation(settled).await;
                            MergeState::Streaming
                        }
                        message = stream.recv() => self.on_stream(message).await,
                    }
                }
                MergeState::AwaitingEvaluation => {
                    let settled = (&mut evaluation).await;
                    self.on_evaluation(settled).await;
                    MergeState::Done
                }
                MergeState::Done => break,
            };
        }

        MergeOutcome {
            assistant_index: self.assistant_index,
            truncated: self.truncated,
            evaluation_committed: self.evaluation_committed,
            metrics: self.telemetry.complete(),
        }
    }

    /// State after the streaming lane ends.
    const fn after_stream(&self) -> MergeState {
        if self.evaluation_settled {
            MergeState::Done
        } else {
            MergeState::AwaitingEvaluation
        }
    }

    async fn on_stream(&mut self, message: Option<LaneMessage>) -> MergeState {
        match message {
            Some(LaneMessage::Fragment(text)) => {
                if self.assistant_index.is_none() {
                    self.assistant_index = Some(self.log.append(Role::Assistant, ""));
                }
                self.telemetry.record_fragment(&text);
                self.buffer.push_str(&text);
                self.emit(TurnEvent::Fragment { text }).await;
                MergeState::Streaming
            }
            Some(LaneMessage::Finished) => {
                self.commit_reply();
                self.after_stream()
            }
            Some(LaneMessage::Failed(message)) => {
                self.fail_stream(message).await;
                self.after_stream()
            }
            None => {
                self.fail_stream("streaming lane ended without a result".to_string())
                    .await;
                self.after_stream()
            }
        }
    }

    /// Finalize the reply slot with the whole buffer.
    fn commit_reply(&mut self) {
        if self.assistant_index.is_none() {
            self.assistant_index = Some(self.log.append(Role::Assistant, ""));
        }
        let content = std::mem::take(&mut self.buffer);
        let index = self.log.update_last_of_role(Role::Assistant, content);
        debug!(index, "Reply committed");
    }

    /// Forward a stream failure and keep what was already shown.
    async fn fail_stream(&mut self, message: String) {
        self.telemetry.record_error(Lane::Streaming, &message);
        self.emit(TurnEvent::Error {
            lane: Lane::Streaming,
            message,
        })
        .await;

        if self.assistant_index.is_some() {
            self.commit_reply();
            self.log.mark_last_truncated(Role::Assistant);
            self.truncated = true;
        }
    }

    async fn on_evaluation(
        &mut self,
        settled: std::result::Result<EvaluationOutcome, oneshot::error::RecvError>,
    ) {
        self.evaluation_settled = true;
        match settled {
            Ok(Ok(result)) => {
                self.emit(TurnEvent::Evaluation {
                    result: result.clone(),
                })
                .await;
                self.evaluation_committed =
                    self.log.attach_evaluation(result) == Some(self.user_index);
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                self.telemetry.record_error(Lane::Evaluation, &message);
                self.emit(TurnEvent::Error {
                    lane: Lane::Evaluation,
                    message,
                })
                .await;
            }
            Err(_) => {
                let message = "evaluation lane ended without a result".to_string();
                self.telemetry.record_error(Lane::Evaluation, &message);
                self.emit(TurnEvent::Error {
                    lane: Lane::Evaluation,
                    message,
                })
                .await;
            }
        }
        self.telemetry.record_evaluation(self.evaluation_committed);
    }

    /// Forward an event; a dropped receiver does not stop the merge.
    async fn emit(&self, event: TurnEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Turn receiver dropped; continuing to commit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, LlmError};
    use crate::history::EvaluationStatus;
    use std::time::Duration;

    fn evaluation() -> EvaluationResult {
        EvaluationResult {
            status: EvaluationStatus::Good,
            short_description: "Nice".into(),
            long_description: "Clear and correct.".into(),
            corrected: "I like pizza.".into(),
        }
    }

    struct Harness {
        log: ConversationLog,
        user_index: u64,
        events_tx: mpsc::Sender<TurnEvent>,
        events_rx: mpsc::Receiver<TurnEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let mut log = ConversationLog::new();
            log.append(Role::Assistant, "What food do you like?");
            let user_index = log.append(Role::User, "I like pizza");
            let (events_tx, events_rx) = mpsc::channel(64);
            Self {
                log,
                user_index,
                events_tx,
                events_rx,
            }
        }

        fn drain(&mut self) -> Vec<TurnEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events_rx.try_recv() {
                events.push(event);
            }
            events
        }
    }

    fn lanes() -> (
        mpsc::Sender<LaneMessage>,
        mpsc::Receiver<LaneMessage>,
        oneshot::Sender<EvaluationOutcome>,
        oneshot::Receiver<EvaluationOutcome>,
    ) {
        let (stream_tx, stream_rx) = mpsc::channel(16);
        let (eval_tx, eval_rx) = oneshot::channel();
        (stream_tx, stream_rx, eval_tx, eval_rx)
    }

    #[tokio::test]
    async fn test_evaluation_before_stream() {
        let mut h = Harness::new();
        let (stream_tx, stream_rx, eval_tx, eval_rx) = lanes();
        eval_tx.send(Ok(evaluation())).expect("send");

        let feeder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            for text in ["Pizza ", "is ", "great!"] {
                stream_tx
                    .send(LaneMessage::Fragment(text.into()))
                    .await
                    .expect("send");
            }
            stream_tx.send(LaneMessage::Finished).await.expect("send");
        });

        let outcome = Merge::new(&mut h.log, &h.events_tx, h.user_index)
            .run(stream_rx, eval_rx)
            .await;
        feeder.await.expect("feeder");

        let events = h.drain();
        assert!(matches!(events[0], TurnEvent::Evaluation { .. }));
        let text: String = events.iter().filter_map(TurnEvent::as_fragment).collect();
        assert_eq!(text, "Pizza is great!");

        assert!(outcome.evaluation_committed);
        assert_eq!(outcome.assistant_index, Some(2));
        assert!(!outcome.truncated);
        assert_eq!(outcome.metrics.fragments, 3);
        assert_eq!(h.log.len(), 3);
        assert_eq!(h.log.turns()[2].content, "Pizza is great!");
        assert!(h.log.turns()[1].evaluation.is_some());
    }

    #[tokio::test]
    async fn test_stream_finishes_before_evaluation() {
        let mut h = Harness::new();
        let (stream_tx, stream_rx, eval_tx, eval_rx) = lanes();
        stream_tx
            .send(LaneMessage::Fragment("Bene!".into()))
            .await
            .expect("send");
        stream_tx.send(LaneMessage::Finished).await.expect("send");

        let evaluator = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            eval_tx.send(Ok(evaluation())).expect("send");
        });

        let outcome = Merge::new(&mut h.log, &h.events_tx, h.user_index)
            .run(stream_rx, eval_rx)
            .await;
        evaluator.await.expect("evaluator");

        let events = h.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_fragment(), Some("Bene!"));
        assert!(matches!(events[1], TurnEvent::Evaluation { .. }));
        assert!(outcome.evaluation_committed);
        assert_eq!(h.log.turns()[2].content, "Bene!");
    }

    #[tokio::test]
    async fn test_evaluation_interleaves_with_fragments() {
        let mut h = Harness::new();
        let (stream_tx, stream_rx, eval_tx, eval_rx) = lanes();

        let feeder = tokio::spawn(async move {
            stream_tx
                .send(LaneMessage::Fragment("one ".into()))
                .await
                .expect("send");
            tokio::time::sleep(Duration::from_millis(10)).await;
            eval_tx.send(Ok(evaluation())).expect("send");
            tokio::time::sleep(Duration::from_millis(10)).await;
            stream_tx
                .send(LaneMessage::Fragment("two".into()))
                .await
                .expect("send");
            stream_tx.send(LaneMessage::Finished).await.expect("send");
        });

        Merge::new(&mut h.log, &h.events_tx, h.user_index)
            .run(stream_rx, eval_rx)
            .await;
        feeder.await.expect("feeder");

        let events = h.drain();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].as_fragment(), Some("one "));
        assert!(matches!(events[1], TurnEvent::Evaluation { .. }));
        assert_eq!(events[2].as_fragment(), Some("two"));
        assert_eq!(h.log.turns()[2].content, "one two");
    }

    #[tokio::test]
    async fn test_stream_failure_commits_truncated_reply() {
        let mut h = Harness::new();
        let (stream_tx, stream_rx, eval_tx, eval_rx) = lanes();
        stream_tx
            .send(LaneMessage::Fragment("Half a".into()))
            .await
            .expect("send");
        stream_tx
            .send(LaneMessage::Failed("connection reset".into()))
            .await
            .expect("send");
        eval_tx.send(Ok(evaluation())).expect("send");

        let outcome = Merge::new(&mut h.log, &h.events_tx, h.user_index)
            .run(stream_rx, eval_rx)
            .await;

        let events = h.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            TurnEvent::Error { lane: Lane::Streaming, message } if message == "connection reset"
        )));
        assert!(events.iter().any(|e| matches!(e, TurnEvent::Evaluation { .. })));
        assert!(outcome.truncated);
        assert_eq!(outcome.metrics.errors, 1);

        let reply = &h.log.turns()[2];
        assert_eq!(reply.content, "Half a");
        assert!(reply.truncated);
        assert!(h.log.turns()[1].evaluation.is_some());
    }

    #[tokio::test]
    async fn test_stream_failure_without_content_commits_nothing() {
        let mut h = Harness::new();
        let (stream_tx, stream_rx, eval_tx, eval_rx) = lanes();
        stream_tx
            .send(LaneMessage::Failed("refused".into()))
            .await
            .expect("send");
        eval_tx
            .send(Err(Error::Llm(LlmError::network("refused"))))
            .expect("send");

        let outcome = Merge::new(&mut h.log, &h.events_tx, h.user_index)
            .run(stream_rx, eval_rx)
            .await;

        let errors = h
            .drain()
            .into_iter()
            .filter(|e| matches!(e, TurnEvent::Error { .. }))
            .count();
        assert_eq!(errors, 2);
        assert_eq!(outcome.assistant_index, None);
        assert!(!outcome.evaluation_committed);
        assert_eq!(h.log.len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_lanes_are_failures() {
        let mut h = Harness::new();
        let (stream_tx, stream_rx, eval_tx, eval_rx) = lanes();
        stream_tx
            .send(LaneMessage::Fragment("partial".into()))
            .await
            .expect("send");
        drop(stream_tx);
        drop(eval_tx);

        let outcome = Merge::new(&mut h.log, &h.events_tx, h.user_index)
            .run(stream_rx, eval_rx)
            .await;

        let events = h.drain();
        let lanes: Vec<Lane> = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Error { lane, .. } => Some(*lane),
                _ => None,
            })
            .collect();
        assert!(lanes.contains(&Lane::Streaming));
        assert!(lanes.contains(&Lane::Evaluation));
        assert!(outcome.truncated);
        assert_eq!(h.log.turns()[2].content, "partial");
    }

    #[tokio::test]
    async fn test_reply_does_not_overwrite_previous_tutor_turn() {
        let mut h = Harness::new();
        let (stream_tx, stream_rx, eval_tx, eval_rx) = lanes();
        stream_tx.send(LaneMessage::Finished).await.expect("send");
        eval_tx.send(Ok(evaluation())).expect("send");

        let outcome = Merge::new(&mut h.log, &h.events_tx, h.user_index)
            .run(stream_rx, eval_rx)
            .await;

        assert_eq!(outcome.assistant_index, Some(2));
        assert_eq!(h.log.turns()[0].content, "What food do you like?");
        assert_eq!(h.log.turns()[2].content, "");
    }

    #[tokio::test]
    async fn test_dropped_receiver_still_commits() {
        let mut h = Harness::new();
        let (stream_tx, stream_rx, eval_tx, eval_rx) = lanes();
        h.events_rx.close();

        stream_tx
            .send(LaneMessage::Fragment("still saved".into()))
            .await
            .expect("send");
        stream_tx.send(LaneMessage::Finished).await.expect("send");
        eval_tx.send(Ok(evaluation())).expect("send");

        let outcome = Merge::new(&mut h.log, &h.events_tx, h.user_index)
            .run(stream_rx, eval_rx)
            .await;
        assert!(outcome.evaluation_committed);
        assert_eq!(h.log.turns()[2].content, "still saved");
    }
}
