use crate::engine::InsertAt;
use crate::report::Category;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Default directory (root-relative) snapshots are written under.
pub const DEFAULT_BACKUP_DIR: &str = "migration_backup";

/// A rule file as written on disk.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RuleFile {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub targets: Vec<TargetDefinition>,
    #[serde(default)]
    pub audits: Vec<AuditDefinition>,
    #[serde(default)]
    pub generate: Vec<GenerateDefinition>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Directory that must exist under the project root (e.g. `lib`)
    #[serde(default)]
    pub source_dir: Option<String>,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    /// Manual steps printed after the report
    #[serde(default)]
    pub follow_up: Option<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            source_dir: None,
            backup_dir: default_backup_dir(),
            follow_up: None,
        }
    }
}

fn default_backup_dir() -> String {
    DEFAULT_BACKUP_DIR.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetDefinition {
    pub id: String,
    #[serde(default)]
    pub category: Category,
    /// Root-relative directory the file names are resolved against
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub scan: Option<ScanDefinition>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

/// Pick up every file in `dir` (not recursive) with a given extension.
#[derive(Debug, Deserialize, Clone)]
pub struct ScanDefinition {
    pub extension: String,
    #[serde(default)]
    pub exclude_suffixes: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleDefinition {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub matcher: MatcherDefinition,
    pub insert: InsertDefinition,
    /// Markers meaning "already applied"; defaults to the insertion text
    #[serde(default)]
    pub already_present: Vec<String>,
    /// Apply only when one of these occurs in the file
    #[serde(default)]
    pub requires: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MatcherDefinition {
    Block {
        prefix: String,
        #[serde(default = "default_open")]
        open: String,
        #[serde(default)]
        suffix: Option<String>,
    },
    Line {
        pattern: String,
        #[serde(default)]
        last: bool,
    },
}

fn default_open() -> String {
    "{".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct InsertDefinition {
    pub text: String,
    pub at: InsertAt,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditDefinition {
    pub id: String,
    /// Root-relative file to scan
    pub file: String,
    /// Regex with an `{item}` placeholder
    pub pattern: String,
    pub items: Vec<String>,
    #[serde(default)]
    pub unless: Option<String>,
    pub detail: String,
    #[serde(default = "service_category")]
    pub category: Category,
}

fn service_category() -> Category {
    Category::Service
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerateDefinition {
    pub id: String,
    /// Root-relative path of the file to create
    pub path: String,
    pub template: String,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "service_category")]
    pub category: Category,
}

impl RuleFile {
    /// Structural checks that need no compilation. Pattern and template
    /// errors are caught when the file is compiled.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.targets.is_empty() && self.audits.is_empty() && self.generate.is_empty() {
            issues.push(ValidationIssue::EmptyRuleFile);
        }
        if self.meta.backup_dir.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                id: None,
                field: "meta.backup_dir",
            });
        }

        let mut seen = HashSet::new();
        let ids = self
            .targets
            .iter()
            .map(|t| &t.id)
            .chain(self.audits.iter().map(|a| &a.id))
            .chain(self.generate.iter().map(|g| &g.id));
        for id in ids {
            if id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    id: None,
                    field: "id",
                });
            } else if !seen.insert(id.as_str()) {
                issues.push(ValidationIssue::DuplicateId(id.clone()));
            }
        }

        for target in &self.targets {
            let id = Some(target.id.clone());
            if target.files.is_empty() && target.scan.is_none() {
                issues.push(ValidationIssue::InvalidCombo {
                    id: id.clone(),
                    message: "target needs `files` or `scan`".to_string(),
                });
            }
            if let Some(scan) = &target.scan {
                if scan.extension.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        id: id.clone(),
                        field: "scan.extension",
                    });
                }
            }
            if target.rules.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    id: id.clone(),
                    field: "rules",
                });
            }

            let mut rule_ids = HashSet::new();
            for rule in &target.rules {
                let rule_id = Some(format!("{}/{}", target.id, rule.id));
                if rule.id.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        id: id.clone(),
                        field: "rules.id",
                    });
                } else if !rule_ids.insert(rule.id.as_str()) {
                    issues.push(ValidationIssue::DuplicateId(format!(
                        "{}/{}",
                        target.id, rule.id
                    )));
                }
                if let MatcherDefinition::Block { open, .. } = &rule.matcher {
                    if open.chars().count() != 1 {
                        issues.push(ValidationIssue::InvalidCombo {
                            id: rule_id.clone(),
                            message: format!("block `open` must be one character, got {open:?}"),
                        });
                    }
                }
            }
        }

        for audit in &self.audits {
            let id = Some(audit.id.clone());
            if audit.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    id: id.clone(),
                    field: "file",
                });
            }
            if audit.items.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    id: id.clone(),
                    field: "items",
                });
            }
            if !audit.pattern.contains(crate::audit::ITEM_PLACEHOLDER) {
                issues.push(ValidationIssue::InvalidCombo {
                    id,
                    message: "audit pattern has no `{item}` placeholder".to_string(),
                });
            }
        }

        for generated in &self.generate {
            let id = Some(generated.id.clone());
            if generated.path.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    id: id.clone(),
                    field: "path",
                });
            }
            if generated.template.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    id,
                    field: "template",
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyRuleFile,
    DuplicateId(String),
    MissingField {
        id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        id: Option<String>,
        message: String,
    },
    /// A pattern or template failed to compile
    Compile { id: String, message: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyRuleFile => {
                write!(f, "rule file contains no targets, audits or generated files")
            }
            ValidationIssue::DuplicateId(id) => write!(f, "duplicate id '{id}'"),
            ValidationIssue::MissingField { id, field } => match id {
                Some(id) => write!(f, "'{id}' missing required field '{field}'"),
                None => write!(f, "missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { id, message } => match id {
                Some(id) => write!(f, "'{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid configuration: {message}"),
            },
            ValidationIssue::Compile { id, message } => write!(f, "'{id}': {message}"),
        }
    }
}
