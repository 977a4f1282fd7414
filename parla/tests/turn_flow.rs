//! End-to-end turn flow against the scripted backend.

use futures::StreamExt;
use parla::markup::ExtraKind;
use parla::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const EVALUATION: &str = r#"{"status": "good", "short_description": "Understandable",
    "long_description": "Mind the article.", "corrected": "I have a dog."}"#;

const SUGGESTION: &str = r#"{"leading_sentence": "My dog is", "vocab_options": [
    {"text": "playful", "emoji": "🐕"},
    {"text": "sleepy", "emoji": "😴"},
    {"text": "hungry", "emoji": "🍖"}]}"#;

fn slow_client() -> ScriptedClient {
    ScriptedClient::new()
        .with_fragments(["One ", "two ", "three"])
        .with_fragment_delay(Duration::from_millis(100))
        .with_structured(EVALUATION)
        .with_structured_delay(Duration::from_millis(150))
}

#[tokio::test(start_paused = true)]
async fn different_sessions_run_in_parallel() {
    let orchestrator = Orchestrator::new(Tutor::new(Arc::new(slow_client())));
    let registry = SessionRegistry::new();
    let a = registry
        .create("pets", Level::Beginner, "English", Some("a".into()))
        .await;
    let b = registry
        .create("pets", Level::Beginner, "English", Some("b".into()))
        .await;

    let start = Instant::now();
    let (first, second) = tokio::join!(
        async { orchestrator.advance_turn(&a, "I have dog").await.finish().await },
        async { orchestrator.advance_turn(&b, "I have cat").await.finish().await },
    );
    let elapsed = start.elapsed();

    assert!(first.is_some() && second.is_some());
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn same_session_turns_serialize() {
    let orchestrator = Orchestrator::new(Tutor::new(Arc::new(slow_client())));
    let registry = SessionRegistry::new();
    let session = registry
        .create("pets", Level::Beginner, "English", Some("s".into()))
        .await;

    let start = Instant::now();
    let (first, second) = tokio::join!(
        async { orchestrator.advance_turn(&session, "first").await.finish().await },
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            orchestrator.advance_turn(&session, "second").await.finish().await
        },
    );
    let elapsed = start.elapsed();

    let first = first.expect("first summary");
    let second = second.expect("second summary");
    assert_eq!((first.user_index, first.assistant_index), (0, Some(1)));
    assert_eq!((second.user_index, second.assistant_index), (2, Some(3)));
    assert!(elapsed >= Duration::from_millis(600), "took {elapsed:?}");

    let log = registry.snapshot("s").await.expect("log");
    let roles: Vec<(Role, &str)> = log
        .turns()
        .iter()
        .map(|t| (t.role, t.content.as_str()))
        .collect();
    assert_eq!(
        roles,
        vec![
            (Role::User, "first"),
            (Role::Assistant, "One two three"),
            (Role::User, "second"),
            (Role::Assistant, "One two three"),
        ]
    );
    assert!(log.turns()[0].evaluation.is_some());
    assert!(log.turns()[2].evaluation.is_some());
}

#[tokio::test(start_paused = true)]
async fn evaluation_arrives_mid_stream() {
    let orchestrator = Orchestrator::new(Tutor::new(Arc::new(slow_client())));
    let registry = SessionRegistry::new();
    let session = registry
        .create("pets", Level::Beginner, "English", None)
        .await;

    let events: Vec<TurnEvent> = orchestrator
        .advance_turn(&session, "I have dog")
        .await
        .collect()
        .await;

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            TurnEvent::Fragment { .. } => "fragment",
            TurnEvent::Evaluation { .. } => "evaluation",
            TurnEvent::Error { .. } => "error",
            TurnEvent::TurnComplete(_) => "complete",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["fragment", "evaluation", "fragment", "fragment", "complete"]
    );
}

#[tokio::test]
async fn interrupted_stream_is_kept_as_truncated_reply() {
    let client = ScriptedClient::new()
        .with_fragments(["I ", "was ", "saying"])
        .fail_stream_after(2)
        .with_structured(EVALUATION);
    let orchestrator = Orchestrator::new(Tutor::new(Arc::new(client)));
    let registry = SessionRegistry::new();
    let session = registry
        .create("pets", Level::Beginner, "English", Some("s".into()))
        .await;

    let events: Vec<TurnEvent> = orchestrator
        .advance_turn(&session, "Tell me more")
        .await
        .collect()
        .await;

    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::Error {
            lane: Lane::Streaming,
            ..
        }
    )));
    let Some(TurnEvent::TurnComplete(summary)) = events.last() else {
        panic!("missing terminal event");
    };
    assert!(summary.truncated);

    let log = registry.snapshot("s").await.expect("log");
    let reply = log.last_of_role(Role::Assistant).expect("reply");
    assert_eq!(reply.content, "I was ");
    assert!(reply.truncated);
}

#[tokio::test]
async fn services_read_committed_log() {
    let client = Arc::new(
        ScriptedClient::new()
            .with_fragments(["Do you have pets?"])
            .with_structured_for("evaluation", EVALUATION)
            .with_structured_for("suggestion", SUGGESTION)
            .with_completion("<t>leash</t><d>a strap for walking a dog</d><s>put the leash on</s>"),
    );
    let tutor = Tutor::new(client.clone());
    let orchestrator = Orchestrator::new(tutor.clone());
    let registry = SessionRegistry::new();
    let session = registry
        .create("pets", Level::Beginner, "English", Some("s".into()))
        .await;

    orchestrator
        .advance_turn(&session, "Hello")
        .await
        .finish()
        .await
        .expect("summary");

    let mut guard = session.lock().await;
    let suggestion = tutor.suggest(&mut guard).await.expect("suggestion");
    assert_eq!(suggestion.leading_sentence, "My dog is");
    assert_eq!(
        guard.log().last_of_role(Role::Assistant).and_then(|t| t.suggestion.clone()),
        Some(suggestion)
    );

    let tips = tutor.vocabulary_tips(&guard).await.expect("tips");
    assert_eq!(tips[0].title, "leash");
    assert_eq!(
        tips[0].extras_of(ExtraKind::Phrase).collect::<Vec<_>>(),
        vec!["put the leash on"]
    );
    drop(guard);

    let stats = registry.snapshot("s").await.expect("log").stats();
    assert_eq!((stats.user, stats.assistant), (1, 1));
}
