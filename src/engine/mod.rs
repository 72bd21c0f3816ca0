//! Text patch engine - decides whether a rule applies and computes new text
//!
//! The engine is pure: it takes the current text of one file and one
//! [`PatchRule`] and returns a [`PatchResult`]. Reading and writing files is
//! the caller's business (see [`crate::edit`]).
//!
//! Evaluation order for a single rule:
//! 1. Precondition: any marker present means the rule was already applied.
//! 2. Requirements: when listed, at least one must be present.
//! 3. Matcher: the first match in file order is the anchor. Later matches are
//!    never touched, so applying a rule inserts text at most once.

pub mod matcher;
pub mod rule;
pub mod scanner;

pub use matcher::{BlockMatcher, BlockSpan, LineAnchor, LinePick, LineSpan, MatchSpan, Matcher};
pub use rule::{InsertAt, Insertion, PatchRule, Precondition, RuleError};

use serde::Serialize;
use std::fmt;

/// Outcome category of applying one rule to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    Applied,
    SkippedAlreadyPresent,
    SkippedNoMatch,
    SkippedNotFound,
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatchStatus::Applied => "applied",
            PatchStatus::SkippedAlreadyPresent => "skipped_already_present",
            PatchStatus::SkippedNoMatch => "skipped_no_match",
            PatchStatus::SkippedNotFound => "skipped_not_found",
        };
        f.write_str(s)
    }
}

/// Why a rule reported `SkippedNoMatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchCause {
    /// The matcher found no anchor: the file's shape differs from the rule's
    Anchor,
    /// None of the rule's required substrings occur in the file
    Requirement,
}

/// Result of applying one rule to one text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked and written with write_if_applied"]
pub struct PatchResult {
    pub rule: String,
    pub summary: String,
    pub status: PatchStatus,
    pub original_text: String,
    /// Present only when `status` is `Applied`
    pub new_text: Option<String>,
    /// Marker that tripped the precondition
    pub found_marker: Option<String>,
    pub no_match: Option<NoMatchCause>,
}

impl PatchResult {
    fn skipped(rule: &PatchRule, status: PatchStatus, text: &str) -> Self {
        Self {
            rule: rule.name().to_string(),
            summary: rule.summary().to_string(),
            status,
            original_text: text.to_string(),
            new_text: None,
            found_marker: None,
            no_match: None,
        }
    }

    /// Result for a target file that does not exist.
    pub fn not_found(rule: &PatchRule) -> Self {
        Self::skipped(rule, PatchStatus::SkippedNotFound, "")
    }

    pub fn is_applied(&self) -> bool {
        self.status == PatchStatus::Applied
    }

    /// Text after the rule: the new text when applied, the original otherwise.
    pub fn resulting_text(&self) -> &str {
        self.new_text.as_deref().unwrap_or(&self.original_text)
    }
}

/// Apply a single rule to `text` without side effects.
pub fn apply_rule(text: &str, rule: &PatchRule) -> PatchResult {
    if let Some(marker) = rule.precondition().find_in(text) {
        let mut result = PatchResult::skipped(rule, PatchStatus::SkippedAlreadyPresent, text);
        result.found_marker = Some(marker.to_string());
        return result;
    }

    if !rule.requires().is_empty() && !rule.requires().iter().any(|r| text.contains(r.as_str())) {
        let mut result = PatchResult::skipped(rule, PatchStatus::SkippedNoMatch, text);
        result.no_match = Some(NoMatchCause::Requirement);
        return result;
    }

    let new_text = rule
        .matcher()
        .find(text)
        .and_then(|span| rule.insertion().splice(text, span));

    match new_text {
        Some(new_text) => {
            let mut result = PatchResult::skipped(rule, PatchStatus::Applied, text);
            result.new_text = Some(new_text);
            result
        }
        None => {
            let mut result = PatchResult::skipped(rule, PatchStatus::SkippedNoMatch, text);
            result.no_match = Some(NoMatchCause::Anchor);
            result
        }
    }
}

/// Apply rules in order, each one seeing the text produced by the previous.
pub fn apply_rules(text: &str, rules: &[PatchRule]) -> Vec<PatchResult> {
    let mut current = text.to_string();
    let mut results = Vec::with_capacity(rules.len());

    for rule in rules {
        let result = apply_rule(&current, rule);
        if let Some(new_text) = &result.new_text {
            current = new_text.clone();
        }
        results.push(result);
    }

    results
}
