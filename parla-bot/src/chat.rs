//! Interactive tutoring REPL.
//!
//! Each line the learner types advances the session by one turn: the tutor's
//! reply streams to stdout, and the evaluation of the learner's message is
//! printed below it once the reply ends. Lines starting with `/` are commands.

#![allow(clippy::print_stdout)]

use crate::error::Result;
use futures::{Stream, StreamExt};
use parla::prelude::*;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// REPL settings.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Print the turn summary after each reply.
    pub show_summary: bool,
    /// Print evaluations of the learner's messages.
    pub show_evaluations: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            show_summary: false,
            show_evaluations: true,
        }
    }
}

/// A REPL command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Suggest a reply to the tutor's last message.
    Suggest,
    /// Vocabulary tips from the recent conversation.
    Tips,
    /// Assess the learner's messages.
    Assess,
    /// Print the conversation.
    History,
    /// Print turn counts and the last turn summary.
    Stats,
    /// Clear the conversation, keeping the session.
    Reset,
    /// Start a fresh session.
    New,
    /// Print the command list.
    Help,
    /// Leave the REPL.
    Exit,
    /// Anything else starting with `/`.
    Unknown(String),
}

impl Command {
    /// Parse a line; `None` means it is a message, not a command.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let name = line.strip_prefix('/')?;
        let name = name.split_whitespace().next().unwrap_or_default();
        Some(match name.to_ascii_lowercase().as_str() {
            "suggest" | "s" => Self::Suggest,
            "tips" | "t" => Self::Tips,
            "assess" | "a" => Self::Assess,
            "history" | "h" => Self::History,
            "stats" => Self::Stats,
            "reset" => Self::Reset,
            "new" => Self::New,
            "help" | "?" => Self::Help,
            "exit" | "quit" | "q" => Self::Exit,
            _ => Self::Unknown(line.to_string()),
        })
    }
}

const HELP: &str = "\
Commands:
  /suggest   suggest a reply to the tutor
  /tips      vocabulary tips from the conversation
  /assess    feedback on your messages
  /history   show the conversation
  /stats     turn counts and last turn summary
  /reset     clear the conversation
  /new       start a fresh session
  /exit      quit";

/// A streaming tutoring REPL over one session at a time.
#[derive(Debug)]
pub struct ChatRepl {
    orchestrator: Orchestrator,
    registry: SessionRegistry,
    session: SessionHandle,
    config: AgentConfig,
    options: ChatOptions,
    last_summary: Option<TurnSummary>,
}

impl ChatRepl {
    /// Create a REPL with a fresh session, named `session_id` if given.
    pub async fn new(
        tutor: Tutor,
        config: AgentConfig,
        session_id: Option<String>,
        options: ChatOptions,
    ) -> Self {
        let registry = SessionRegistry::with_model(config.model.clone());
        let session = registry.create_with(config.clone(), session_id).await;
        Self {
            orchestrator: Orchestrator::new(tutor),
            registry,
            session,
            config,
            options,
            last_summary: None,
        }
    }

    /// Id of the current session.
    pub async fn session_id(&self) -> String {
        self.session.lock().await.id().to_string()
    }

    /// Run one turn, streaming the reply to stdout.
    ///
    /// Returns the turn summary.
    ///
    /// # Errors
    ///
    /// Returns an error if stdout cannot be written.
    pub async fn turn(&mut self, message: &str) -> Result<Option<TurnSummary>> {
        let stream = self.orchestrator.advance_turn(&self.session, message).await;
        let summary = render_turn(stream, &mut io::stdout(), &self.options).await?;
        self.last_summary.clone_from(&summary);
        Ok(summary)
    }

    /// Handle a command. Returns `false` when the REPL should stop.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that should end the REPL.
    pub async fn command(&mut self, command: Command) -> Result<bool> {
        let tutor = self.orchestrator.tutor().clone();
        match command {
            Command::Suggest => {
                let mut session = self.session.lock().await;
                match tutor.suggest(&mut session).await {
                    Ok(suggestion) => println!("{}", format_suggestion(&suggestion)),
                    Err(e) => println!("Cannot suggest: {e}"),
                }
            }
            Command::Tips => {
                let session = self.session.lock().await;
                match tutor.vocabulary_tips(&session).await {
                    Ok(groups) => println!("{}", format_groups(&groups)),
                    Err(e) => println!("Cannot fetch tips: {e}"),
                }
            }
            Command::Assess => {
                let session = self.session.lock().await;
                match tutor.assess(&session).await {
                    Ok(groups) if groups.is_empty() => println!("Nothing to assess yet."),
                    Ok(groups) => println!("{}", format_groups(&groups)),
                    Err(e) => println!("Cannot assess: {e}"),
                }
            }
            Command::History => {
                let session = self.session.lock().await;
                println!("{}", format_history(session.log()));
            }
            Command::Stats => {
                let session = self.session.lock().await;
                println!("Session {}: {}", session.id(), session.log().stats());
                if let Some(summary) = &self.last_summary {
                    print!("{summary}");
                }
            }
            Command::Reset => {
                self.session.lock().await.reset();
                self.last_summary = None;
                println!("Conversation cleared.");
            }
            Command::New => {
                let old = self.session_id().await;
                self.registry.remove(&old).await;
                self.session = self.registry.create_with(self.config.clone(), None).await;
                self.last_summary = None;
                println!("New session {}.", self.session_id().await);
            }
            Command::Help => println!("{HELP}"),
            Command::Exit => return Ok(false),
            Command::Unknown(line) => println!("Unknown command '{line}'. Type /help."),
        }
        Ok(true)
    }

    /// Run the interactive loop until `/exit` or end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin cannot be read.
    pub async fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        println!(
            "Parla: practicing {} ({}) about {}. Type /help for commands, /exit to quit.",
            self.config.language, self.config.level, self.config.topic
        );
        println!();

        loop {
            print!("you> ");
            stdout.flush().ok();

            let mut input = String::new();
            if stdin.read_line(&mut input)? == 0 {
                println!();
                break;
            }

            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            if let Some(command) = Command::parse(input) {
                debug!(?command, "Command");
                if !self.command(command).await? {
                    break;
                }
            } else {
                self.turn(input).await?;
            }
            println!();
        }

        Ok(())
    }
}

/// Write a turn's events to `out`: fragments as they arrive, then the
/// evaluation feedback and, if enabled, the summary.
async fn render_turn<S, W>(
    mut events: S,
    out: &mut W,
    options: &ChatOptions,
) -> io::Result<Option<TurnSummary>>
where
    S: Stream<Item = TurnEvent> + Unpin,
    W: Write,
{
    let mut feedback = Vec::new();
    let mut summary = None;

    write!(out, "tutor> ")?;
    out.flush()?;

    while let Some(event) = events.next().await {
        match event {
            TurnEvent::Fragment { text } => {
                write!(out, "{text}")?;
                out.flush()?;
            }
            TurnEvent::Evaluation { result } => feedback.push(result),
            TurnEvent::Error { lane, message } => {
                warn!(%lane, %message, "Turn lane failed");
                if lane == Lane::Streaming {
                    write!(out, " [interrupted]")?;
                }
            }
            TurnEvent::TurnComplete(done) => summary = Some(done),
        }
    }
    writeln!(out)?;

    if options.show_evaluations {
        for evaluation in &feedback {
            writeln!(out, "{}", format_evaluation(evaluation))?;
        }
    }
    if options.show_summary
        && let Some(summary) = &summary
    {
        write!(out, "{summary}")?;
    }
    out.flush()?;

    Ok(summary)
}

/// Render an evaluation as a feedback block.
#[must_use]
pub fn format_evaluation(evaluation: &EvaluationResult) -> String {
    let badge = match evaluation.status {
        EvaluationStatus::Excellent => "[excellent]",
        EvaluationStatus::Good => "[good]",
        EvaluationStatus::NeedsImprovement => "[needs improvement]",
    };
    let mut out = format!("  {badge} {}", evaluation.short_description);
    if !evaluation.long_description.is_empty() {
        out.push_str(&format!("\n    {}", evaluation.long_description));
    }
    if !evaluation.corrected.is_empty() {
        out.push_str(&format!("\n    Better: {}", evaluation.corrected));
    }
    out
}

/// Render a suggestion as a sentence starter with numbered options.
#[must_use]
pub fn format_suggestion(suggestion: &SuggestionResult) -> String {
    let mut out = format!("Try: {} ...", suggestion.leading_sentence);
    for (i, option) in suggestion.vocab_options.iter().enumerate() {
        out.push_str(&format!("\n  {}. {} {}", i + 1, option.emoji, option.text));
    }
    out
}

/// Render decoded markup groups.
#[must_use]
pub fn format_groups(groups: &[MarkupGroup]) -> String {
    if groups.is_empty() {
        return "(nothing)".to_string();
    }
    groups
        .iter()
        .map(|group| {
            let mut block = format!("* {}", group.title);
            if !group.description.is_empty() {
                block.push_str(&format!(": {}", group.description));
            }
            for extra in &group.extras {
                let label = match extra.kind {
                    ExtraKind::Phrase => "e.g.",
                    ExtraKind::Word => "word:",
                };
                block.push_str(&format!("\n    {label} {}", extra.text));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the conversation, one line per turn.
#[must_use]
pub fn format_history(log: &ConversationLog) -> String {
    if log.is_empty() {
        return "(empty conversation)".to_string();
    }
    log.turns()
        .iter()
        .map(|turn| {
            let who = match turn.role {
                Role::User => "you",
                Role::Assistant => "tutor",
                Role::System => "system",
            };
            let mut line = format!("#{} {who}: {}", turn.index, turn.content);
            if turn.truncated {
                line.push_str(" [interrupted]");
            }
            if let Some(evaluation) = &turn.evaluation {
                line.push_str(&format!(" ({:?})", evaluation.status));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const OFFLINE_EVALUATION: &str = r#"{"status": "good",
    "short_description": "Understandable, keep going!",
    "long_description": "Offline mode does not grade your messages.",
    "corrected": ""}"#;

const OFFLINE_SUGGESTION: &str = r#"{"leading_sentence": "I would like to talk about",
    "vocab_options": [
        {"text": "my weekend", "emoji": "🏖️"},
        {"text": "my favourite food", "emoji": "🍝"},
        {"text": "my hometown", "emoji": "🏘️"}]}"#;

const OFFLINE_MARKUP: &str = "<t>practice</t><d>repeated exercise to improve a skill</d>\
    <s>Practice makes perfect.</s><v>rehearse</v>";

/// A backend that echoes the learner and returns canned feedback.
#[must_use]
pub fn offline_client() -> Arc<ScriptedClient> {
    Arc::new(
        ScriptedClient::new()
            .with_fragment_delay(Duration::from_millis(30))
            .with_structured_for(parla::tutor::EVALUATION_SCHEMA, OFFLINE_EVALUATION)
            .with_structured_for(parla::tutor::SUGGESTION_SCHEMA, OFFLINE_SUGGESTION)
            .with_completion(OFFLINE_MARKUP),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/suggest"), Some(Command::Suggest));
        assert_eq!(Command::parse("  /TIPS  "), Some(Command::Tips));
        assert_eq!(Command::parse("/q"), Some(Command::Exit));
        assert_eq!(
            Command::parse("/dance now"),
            Some(Command::Unknown("/dance now".into()))
        );
        assert_eq!(Command::parse("hello /suggest"), None);
        assert_eq!(Command::parse("I like pizza"), None);
    }

    #[test]
    fn test_format_evaluation() {
        let evaluation = EvaluationResult {
            status: EvaluationStatus::NeedsImprovement,
            short_description: "Missing article".into(),
            long_description: "Use 'a' before singular nouns.".into(),
            corrected: "I have a dog.".into(),
        };
        let out = format_evaluation(&evaluation);
        assert!(out.starts_with("  [needs improvement] Missing article"));
        assert!(out.ends_with("Better: I have a dog."));
    }

    #[test]
    fn test_format_groups() {
        let groups = parla::markup::decode(OFFLINE_MARKUP);
        assert_eq!(
            format_groups(&groups),
            "* practice: repeated exercise to improve a skill\
             \n    e.g. Practice makes perfect.\n    word: rehearse"
        );
        assert_eq!(format_groups(&[]), "(nothing)");
    }

    #[test]
    fn test_format_history() {
        let mut log = ConversationLog::new();
        log.append(Role::User, "Hi");
        log.append(Role::Assistant, "Hello");
        log.mark_last_truncated(Role::Assistant);
        assert_eq!(format_history(&log), "#0 you: Hi\n#1 tutor: Hello [interrupted]");
    }

    fn summary() -> TurnSummary {
        TurnSummary {
            session_id: "s".into(),
            user_index: 0,
            assistant_index: Some(1),
            evaluation_committed: true,
            truncated: false,
            fragments: 2,
            errors: 0,
            elapsed: Duration::from_millis(40),
        }
    }

    #[tokio::test]
    async fn test_evaluation_printed_after_reply() {
        let evaluation = EvaluationResult {
            status: EvaluationStatus::Good,
            short_description: "Nice".into(),
            long_description: String::new(),
            corrected: String::new(),
        };
        let events = futures::stream::iter(vec![
            TurnEvent::Fragment { text: "Ciao ".into() },
            TurnEvent::Evaluation { result: evaluation },
            TurnEvent::Fragment { text: "amico".into() },
            TurnEvent::TurnComplete(summary()),
        ]);

        let mut out = Vec::new();
        let done = render_turn(events, &mut out, &ChatOptions::default())
            .await
            .expect("render");

        assert_eq!(done, Some(summary()));
        assert_eq!(
            String::from_utf8(out).expect("utf-8"),
            "tutor> Ciao amico\n  [good] Nice\n"
        );
    }

    #[tokio::test]
    async fn test_interrupted_reply_and_hidden_feedback() {
        let events = futures::stream::iter(vec![
            TurnEvent::Fragment { text: "I was".into() },
            TurnEvent::Error {
                lane: Lane::Streaming,
                message: "reset".into(),
            },
            TurnEvent::Evaluation {
                result: EvaluationResult {
                    status: EvaluationStatus::Excellent,
                    short_description: "Perfect".into(),
                    long_description: String::new(),
                    corrected: String::new(),
                },
            },
            TurnEvent::TurnComplete(summary()),
        ]);
        let options = ChatOptions {
            show_summary: false,
            show_evaluations: false,
        };

        let mut out = Vec::new();
        render_turn(events, &mut out, &options).await.expect("render");

        assert_eq!(
            String::from_utf8(out).expect("utf-8"),
            "tutor> I was [interrupted]\n"
        );
    }

    #[tokio::test]
    async fn test_offline_turn_and_commands() {
        let config = AgentConfig::new("hobbies", Level::Beginner, "English");
        let mut repl = ChatRepl::new(
            Tutor::new(offline_client()),
            config,
            Some("practice".into()),
            ChatOptions::default(),
        )
        .await;
        assert_eq!(repl.session_id().await, "practice");

        let summary = repl
            .turn("I like chess")
            .await
            .expect("turn")
            .expect("summary");
        assert!(summary.evaluation_committed);
        assert_eq!(summary.assistant_index, Some(1));

        assert!(repl.command(Command::Suggest).await.expect("suggest"));
        {
            let session = repl.session.lock().await;
            let reply = session.log().last_of_role(Role::Assistant).expect("reply");
            assert_eq!(reply.content, "You said: I like chess");
            assert!(reply.suggestion.is_some());
        }

        let first = repl.session_id().await;
        assert!(repl.command(Command::New).await.expect("new"));
        assert_ne!(repl.session_id().await, first);
        assert_eq!(repl.registry.len().await, 1);
        assert!(repl.session.lock().await.log().is_empty());

        assert!(!repl.command(Command::Exit).await.expect("exit"));
    }
}
