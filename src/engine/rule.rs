use crate::engine::matcher::{MatchSpan, Matcher};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Rule construction errors. These surface when a rule is built (or a rule
/// file is loaded), never while scanning a file.
#[derive(Error, Debug, Clone)]
pub enum RuleError {
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unsupported block delimiter '{0}' (expected one of '(', '[', '{{')")]
    UnsupportedBracket(char),

    #[error("rule '{rule}' has empty insertion text")]
    EmptyInsertion { rule: String },

    #[error("rule '{rule}' inserts {at} but uses a {matcher} matcher")]
    IncompatiblePosition {
        rule: String,
        at: InsertAt,
        matcher: &'static str,
    },

    #[error("rule '{rule}' would not be idempotent: no already-present marker occurs in its insertion text")]
    MarkerNotInInsertion { rule: String },
}

/// Where the insertion goes relative to the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertAt {
    /// Right after the block's opening bracket
    AfterOpen,
    /// Right before the block's closing bracket
    BeforeClose,
    /// At the start of the anchor line
    BeforeLine,
    /// After the anchor line's terminator
    AfterLine,
}

impl InsertAt {
    fn fits(self, matcher: &Matcher) -> bool {
        matches!(
            (self, matcher),
            (InsertAt::AfterOpen | InsertAt::BeforeClose, Matcher::Block(_))
                | (InsertAt::BeforeLine | InsertAt::AfterLine, Matcher::Line(_))
        )
    }
}

impl fmt::Display for InsertAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InsertAt::AfterOpen => "after-open",
            InsertAt::BeforeClose => "before-close",
            InsertAt::BeforeLine => "before-line",
            InsertAt::AfterLine => "after-line",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub text: String,
    pub at: InsertAt,
}

impl Insertion {
    pub fn new(text: impl Into<String>, at: InsertAt) -> Self {
        Self {
            text: text.into(),
            at,
        }
    }

    pub fn after_open(text: impl Into<String>) -> Self {
        Self::new(text, InsertAt::AfterOpen)
    }

    pub fn before_close(text: impl Into<String>) -> Self {
        Self::new(text, InsertAt::BeforeClose)
    }

    pub fn before_line(text: impl Into<String>) -> Self {
        Self::new(text, InsertAt::BeforeLine)
    }

    pub fn after_line(text: impl Into<String>) -> Self {
        Self::new(text, InsertAt::AfterLine)
    }

    /// Splice the insertion into `text` at the position implied by `span`.
    ///
    /// Returns `None` when the span kind does not fit the position, which
    /// `PatchRule::new` already rules out.
    pub(crate) fn splice(&self, text: &str, span: MatchSpan) -> Option<String> {
        let (offset, lead) = match (self.at, span) {
            (InsertAt::AfterOpen, MatchSpan::Block(b)) => (b.open + 1, ""),
            (InsertAt::BeforeClose, MatchSpan::Block(b)) => (b.close, ""),
            (InsertAt::BeforeLine, MatchSpan::Line(l)) => (l.start, ""),
            (InsertAt::AfterLine, MatchSpan::Line(l)) => {
                (l.end, if l.terminated { "" } else { "\n" })
            }
            _ => return None,
        };

        let mut out = String::with_capacity(text.len() + lead.len() + self.text.len());
        out.push_str(&text[..offset]);
        out.push_str(lead);
        out.push_str(&self.text);
        out.push_str(&text[offset..]);
        Some(out)
    }
}

/// Idempotence guard: the rule counts as already applied when any marker
/// occurs anywhere in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    markers: Vec<String>,
}

impl Precondition {
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// First marker found in `text`.
    pub fn find_in<'a>(&'a self, text: &str) -> Option<&'a str> {
        self.markers
            .iter()
            .map(String::as_str)
            .find(|marker| text.contains(marker))
    }
}

/// A compiled, declarative transformation.
#[derive(Debug, Clone)]
pub struct PatchRule {
    name: String,
    summary: String,
    matcher: Matcher,
    precondition: Precondition,
    requires: Vec<String>,
    insertion: Insertion,
}

impl PatchRule {
    /// Build a rule, checking it can be applied idempotently.
    ///
    /// With no `markers`, the trimmed insertion text is the marker. Otherwise
    /// at least one marker must occur inside the insertion text, so text the
    /// rule produced always trips its own precondition.
    pub fn new(
        name: impl Into<String>,
        matcher: Matcher,
        insertion: Insertion,
        markers: Vec<String>,
    ) -> Result<Self, RuleError> {
        let name = name.into();

        if insertion.text.trim().is_empty() {
            return Err(RuleError::EmptyInsertion { rule: name });
        }
        if !insertion.at.fits(&matcher) {
            return Err(RuleError::IncompatiblePosition {
                rule: name,
                at: insertion.at,
                matcher: matcher.kind(),
            });
        }

        let markers: Vec<String> = markers.into_iter().filter(|m| !m.is_empty()).collect();
        let markers = if markers.is_empty() {
            vec![insertion.text.trim().to_string()]
        } else if markers.iter().any(|m| insertion.text.contains(m.as_str())) {
            markers
        } else {
            return Err(RuleError::MarkerNotInInsertion { rule: name });
        };

        Ok(Self {
            summary: name.clone(),
            name,
            matcher,
            precondition: Precondition { markers },
            requires: Vec::new(),
            insertion,
        })
    }

    /// Only apply when at least one of `requires` occurs in the text.
    pub fn requiring(mut self, requires: Vec<String>) -> Self {
        self.requires = requires.into_iter().filter(|r| !r.is_empty()).collect();
        self
    }

    /// Human-readable description used in reports.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn precondition(&self) -> &Precondition {
        &self.precondition
    }

    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    pub fn insertion(&self) -> &Insertion {
        &self.insertion
    }
}
