//! Report-only probes.
//!
//! An audit searches one file for a pattern instantiated once per item (a
//! table name, a method name) and reports each hit for manual follow-up. It
//! never changes the file. This is how queries that need a tenant filter get
//! surfaced without attempting a risky automated rewrite.

use crate::engine::RuleError;
use regex::Regex;

/// Placeholder substituted with each (regex-escaped) item.
pub const ITEM_PLACEHOLDER: &str = "{item}";

#[derive(Debug, Clone)]
pub struct Audit {
    id: String,
    probes: Vec<(String, Regex)>,
    unless: Option<String>,
    detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditHit {
    pub item: String,
    pub detail: String,
}

impl Audit {
    /// Compile one regex per item from `pattern`.
    ///
    /// `unless`, when set, suppresses a hit whose matched text contains it
    /// (e.g. a method signature that already takes `organizationId`).
    pub fn new(
        id: impl Into<String>,
        pattern: &str,
        items: &[String],
        unless: Option<String>,
        detail: impl Into<String>,
    ) -> Result<Self, RuleError> {
        let probes = items
            .iter()
            .map(|item| {
                let source = pattern.replace(ITEM_PLACEHOLDER, &regex::escape(item));
                Regex::new(&source)
                    .map(|re| (item.clone(), re))
                    .map_err(|source| RuleError::InvalidPattern {
                        pattern: pattern.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: id.into(),
            probes,
            unless: unless.filter(|u| !u.is_empty()),
            detail: detail.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Items whose pattern occurs in `text`, in item order.
    pub fn scan(&self, text: &str) -> Vec<AuditHit> {
        self.probes
            .iter()
            .filter(|(_, re)| {
                re.find_iter(text).any(|m| match &self.unless {
                    Some(unless) => !m.as_str().contains(unless.as_str()),
                    None => true,
                })
            })
            .map(|(item, _)| AuditHit {
                item: item.clone(),
                detail: self.detail.clone(),
            })
            .collect()
    }
}
