//! Decoder for the inline tag markup the tutor model emits.
//!
//! Tips, vocabulary lists and assessments come back as repeated groups:
//!
//! ```text
//! <t>TITLE</t><d>DESCRIPTION</d><s>PHRASE</s><v>WORD</v>...
//! ```
//!
//! Model output carries no format guarantee, so decoding is lenient and never
//! fails: a group with a missing or unterminated description keeps its title
//! with an empty description, and input without any group decodes to a single
//! untitled group holding the raw text.

use serde::{Deserialize, Serialize};

const TITLE: Tag = Tag::new("t");
const DESCRIPTION: Tag = Tag::new("d");
const PHRASE: Tag = Tag::new("s");
const WORD: Tag = Tag::new("v");

/// Kind of a trailing extra tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraKind {
    /// `<s>` example phrase.
    Phrase,
    /// `<v>` vocabulary word.
    Word,
}

impl ExtraKind {
    const fn tag(self) -> Tag {
        match self {
            Self::Phrase => PHRASE,
            Self::Word => WORD,
        }
    }
}

/// A trailing `<s>` or `<v>` entry of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extra {
    /// Which tag produced it.
    pub kind: ExtraKind,
    /// Tag body, trimmed.
    pub text: String,
}

/// One decoded `(title, description, extras)` group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupGroup {
    /// `<t>` body.
    pub title: String,
    /// `<d>` body, empty when missing.
    pub description: String,
    /// Trailing extras in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<Extra>,
}

impl MarkupGroup {
    /// Create a group without extras.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            extras: Vec::new(),
        }
    }

    /// Add an extra entry.
    #[must_use]
    pub fn with_extra(mut self, kind: ExtraKind, text: impl Into<String>) -> Self {
        self.extras.push(Extra {
            kind,
            text: text.into(),
        });
        self
    }

    /// Texts of the extras of one kind.
    pub fn extras_of(&self, kind: ExtraKind) -> impl Iterator<Item = &str> {
        self.extras
            .iter()
            .filter(move |extra| extra.kind == kind)
            .map(|extra| extra.text.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct Tag {
    name: &'static str,
}

impl Tag {
    const fn new(name: &'static str) -> Self {
        Self { name }
    }

    fn open(self) -> String {
        format!("<{}>", self.name)
    }

    fn close(self) -> String {
        format!("</{}>", self.name)
    }
}

/// Cursor over a bounded region of the input.
struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> Scanner<'a> {
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            end: input.len(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..self.end]
    }

    /// Byte offset of the next `pat` inside the region.
    fn find(&self, pat: &str) -> Option<usize> {
        self.rest().find(pat).map(|offset| self.pos + offset)
    }

    /// Move past the next opening `tag`. Returns false when there is none.
    fn skip_past_open(&mut self, tag: Tag) -> bool {
        let open = tag.open();
        match self.find(&open) {
            Some(at) => {
                self.pos = at + open.len();
                true
            }
            None => false,
        }
    }

    /// Read up to the closing `tag` and move past it.
    fn read_body(&mut self, tag: Tag) -> Option<&'a str> {
        let close = tag.close();
        let at = self.find(&close)?;
        let body = &self.input[self.pos..at];
        self.pos = at + close.len();
        Some(body)
    }

    /// Read up to the closing `tag`, or the rest of the region when unterminated.
    fn read_body_or_rest(&mut self, tag: Tag) -> &'a str {
        self.read_body(tag).unwrap_or_else(|| {
            let body = self.rest();
            self.pos = self.end;
            body
        })
    }

    /// A scanner over `[self.pos, end)` sharing the same input.
    const fn region(&self, end: usize) -> Self {
        Self {
            input: self.input,
            pos: self.pos,
            end,
        }
    }

    /// Position of the earliest opening extra tag, with its kind.
    fn next_extra(&self) -> Option<(usize, ExtraKind)> {
        [ExtraKind::Phrase, ExtraKind::Word]
            .into_iter()
            .filter_map(|kind| self.find(&kind.tag().open()).map(|at| (at, kind)))
            .min_by_key(|(at, _)| *at)
    }
}

/// Decode every group in `input`.
#[must_use]
pub fn decode(input: &str) -> Vec<MarkupGroup> {
    let mut scanner = Scanner::new(input);
    let mut groups = Vec::new();

    while scanner.skip_past_open(TITLE) {
        groups.push(group(&mut scanner));
    }

    if groups.is_empty() {
        groups.push(MarkupGroup::new("", input));
    }
    groups
}

/// group := title description? extra*
///
/// The scanner sits just past `<t>`. A group's description and extras must
/// appear before the next `<t>`.
fn group(scanner: &mut Scanner<'_>) -> MarkupGroup {
    let title = scanner.read_body_or_rest(TITLE).trim().to_string();
    let group_end = scanner.find(&TITLE.open()).unwrap_or(scanner.end);

    let mut body = scanner.region(group_end);
    let description = description(&mut body);
    let extras = extras(&mut body);

    scanner.pos = group_end;
    MarkupGroup {
        title,
        description,
        extras,
    }
}

/// An unterminated description leaves the scanner just past `<d>`, so extras
/// after it are still collected.
fn description(scanner: &mut Scanner<'_>) -> String {
    if !scanner.skip_past_open(DESCRIPTION) {
        return String::new();
    }
    scanner
        .read_body(DESCRIPTION)
        .map(|body| body.trim().to_string())
        .unwrap_or_default()
}

fn extras(scanner: &mut Scanner<'_>) -> Vec<Extra> {
    let mut extras = Vec::new();
    while let Some((at, kind)) = scanner.next_extra() {
        scanner.pos = at + kind.tag().open().len();
        match scanner.read_body(kind.tag()) {
            Some(text) => extras.push(Extra {
                kind,
                text: text.trim().to_string(),
            }),
            None => break,
        }
    }
    extras
}

/// Render groups back into the tag markup.
#[must_use]
pub fn encode(groups: &[MarkupGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        push_tag(&mut out, TITLE, &group.title);
        push_tag(&mut out, DESCRIPTION, &group.description);
        for extra in &group.extras {
            push_tag(&mut out, extra.kind.tag(), &extra.text);
        }
    }
    out
}

fn push_tag(out: &mut String, tag: Tag, body: &str) {
    out.push_str(&tag.open());
    out.push_str(body);
    out.push_str(&tag.close());
}
