//! Prompt templates.
//!
//! Templates use `{name}` placeholders. [`render`] substitutes the ones it
//! knows and leaves everything else, including unknown placeholders and lone
//! braces, untouched.

use super::config::AgentConfig;
use serde::{Deserialize, Serialize};

/// Substitute `{name}` placeholders from `vars`.
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// The templates used by a tutor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    /// System prompt of the conversation itself.
    pub conversation: String,
    /// Instructions for evaluating the learner's last message.
    pub evaluation: String,
    /// Instructions for suggesting the learner's next reply.
    pub suggestion: String,
    /// Instructions for vocabulary tips in tag markup.
    pub vocabulary: String,
    /// Instructions for an overall assessment in tag markup.
    pub assessment: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            conversation: "You are a friendly {language} conversation partner for a {level} \
                learner. Talk about {topic}. Keep replies short, ask one question at a time \
                and match the vocabulary to the learner's level."
                .to_string(),
            evaluation: "You are a {language} teacher. The learner ({level}) was asked:\n\
                \"{last_assistant}\"\n\
                They replied:\n\"{user_message}\"\n\
                Rate the reply as excellent, good or needs_improvement, give a short and a \
                long explanation, and a corrected version of the reply."
                .to_string(),
            suggestion: "The learner ({level}) is talking about {topic} in {language} and \
                must answer:\n\"{last_assistant}\"\n\
                Write the opening of a possible answer and exactly three words or short \
                phrases, each with an emoji, that could complete it."
                .to_string(),
            vocabulary: "Here is a conversation about {topic}:\n{transcript}\n\
                Suggest useful {language} vocabulary for a {level} learner. For every word \
                write <t>word</t><d>meaning</d> followed by one or more <s>example phrase</s>."
                .to_string(),
            assessment: "These are a {level} learner's messages in {language}:\n{transcript}\n\
                Assess them. Write one group per point as <t>heading</t><d>explanation</d>, \
                with <v>word</v> for vocabulary worth learning."
                .to_string(),
        }
    }
}

impl PromptSet {
    fn base_vars(config: &AgentConfig) -> [(&str, &str); 3] {
        [
            ("topic", config.topic.as_str()),
            ("level", config.level.as_str()),
            ("language", config.language.as_str()),
        ]
    }

    fn render_with(template: &str, config: &AgentConfig, extra: &[(&str, &str)]) -> String {
        let mut vars = Self::base_vars(config).to_vec();
        vars.extend_from_slice(extra);
        render(template, &vars)
    }

    /// Conversation system prompt.
    #[must_use]
    pub fn conversation(&self, config: &AgentConfig) -> String {
        Self::render_with(&self.conversation, config, &[])
    }

    /// Evaluation prompt for one learner reply.
    #[must_use]
    pub fn evaluation(&self, config: &AgentConfig, last_assistant: &str, user_message: &str) -> String {
        Self::render_with(
            &self.evaluation,
            config,
            &[("last_assistant", last_assistant), ("user_message", user_message)],
        )
    }

    /// Suggestion prompt for the tutor's last message.
    #[must_use]
    pub fn suggestion(&self, config: &AgentConfig, last_assistant: &str) -> String {
        Self::render_with(&self.suggestion, config, &[("last_assistant", last_assistant)])
    }

    /// Vocabulary prompt over a transcript.
    #[must_use]
    pub fn vocabulary(&self, config: &AgentConfig, transcript: &str) -> String {
        Self::render_with(&self.vocabulary, config, &[("transcript", transcript)])
    }

    /// Assessment prompt over the learner's messages.
    #[must_use]
    pub fn assessment(&self, config: &AgentConfig, transcript: &str) -> String {
        Self::render_with(&self.assessment, config, &[("transcript", transcript)])
    }
}
