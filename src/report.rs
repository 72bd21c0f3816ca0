//! Per-run migration report.
//!
//! The report is an append-only accumulator: entries are pushed while a run
//! walks its targets and the whole thing is rendered once at the end. It is
//! never persisted.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

/// Default cap on update lines printed per section.
pub const DEFAULT_RENDER_LIMIT: usize = 10;

/// Which update list a change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Data model declarations (fields, constructors)
    #[default]
    Model,
    /// Services, providers and anything else that queries the backend
    Service,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub subject: String,
    pub detail: String,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.detail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Targeted file does not exist
    NotFound,
    /// Precondition matched; the change is already in place
    AlreadyMigrated,
    /// Matcher found no anchor; the file was left unmigrated
    NoMatch,
    /// A file to generate already exists and may not be overwritten
    Exists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub subject: String,
    pub detail: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.detail)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    model_updates: Vec<Entry>,
    service_updates: Vec<Entry>,
    warnings: Vec<Warning>,
    errors: Vec<Entry>,
}

impl MigrationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_model_update(&mut self, subject: impl Into<String>, detail: impl Into<String>) {
        self.model_updates.push(entry(subject, detail));
    }

    pub fn add_service_update(&mut self, subject: impl Into<String>, detail: impl Into<String>) {
        self.service_updates.push(entry(subject, detail));
    }

    pub fn add_update(
        &mut self,
        category: Category,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) {
        match category {
            Category::Model => self.add_model_update(subject, detail),
            Category::Service => self.add_service_update(subject, detail),
        }
    }

    pub fn add_warning(
        &mut self,
        kind: WarningKind,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.warnings.push(Warning {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        });
    }

    pub fn add_error(&mut self, subject: impl Into<String>, detail: impl Into<String>) {
        self.errors.push(entry(subject, detail));
    }

    pub fn model_updates(&self) -> &[Entry] {
        &self.model_updates
    }

    pub fn service_updates(&self) -> &[Entry] {
        &self.service_updates
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn errors(&self) -> &[Entry] {
        &self.errors
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }

    /// Number of rules that found no anchor in an existing file.
    pub fn no_match_count(&self) -> usize {
        self.warnings_of(WarningKind::NoMatch).count()
    }

    pub fn update_count(&self) -> usize {
        self.model_updates.len() + self.service_updates.len()
    }

    /// Render the human-readable summary.
    ///
    /// Update sections list at most `limit` entries followed by an
    /// "... and N more" line. Warnings and errors are always listed in full.
    pub fn render(&self, limit: usize) -> String {
        let rule = "=".repeat(60);
        let mut out = String::new();

        let _ = writeln!(out, "\n{rule}");
        let _ = writeln!(out, "{}", "MIGRATION REPORT".bold());
        let _ = writeln!(out, "{rule}");

        render_updates(&mut out, "Model Updates", &self.model_updates, limit);
        render_updates(&mut out, "Service Updates", &self.service_updates, limit);

        if !self.warnings.is_empty() {
            let _ = writeln!(
                out,
                "\n{}",
                format!("Warnings ({}):", self.warnings.len()).yellow()
            );
            for warning in &self.warnings {
                let marker = match warning.kind {
                    // the file was left untouched
                    WarningKind::NoMatch => "✗ NO MATCH".red().bold(),
                    WarningKind::NotFound => "⊘".cyan(),
                    WarningKind::AlreadyMigrated | WarningKind::Exists => "⊙".yellow(),
                };
                let _ = writeln!(out, "  {marker} {warning}");
            }
        }

        if !self.errors.is_empty() {
            let _ = writeln!(
                out,
                "\n{}",
                format!("Errors ({}):", self.errors.len()).red()
            );
            for error in &self.errors {
                let _ = writeln!(out, "  {} {error}", "✗".red());
            }
        }

        let _ = writeln!(out, "\n{rule}");
        out
    }
}

fn entry(subject: impl Into<String>, detail: impl Into<String>) -> Entry {
    Entry {
        subject: subject.into(),
        detail: detail.into(),
    }
}

fn render_updates(out: &mut String, title: &str, entries: &[Entry], limit: usize) {
    let _ = writeln!(out, "\n{}", format!("{title} ({}):", entries.len()).bold());
    for entry in entries.iter().take(limit) {
        let _ = writeln!(out, "  {} {entry}", "✓".green());
    }
    if entries.len() > limit {
        let _ = writeln!(out, "  ... and {} more", entries.len() - limit);
    }
}
