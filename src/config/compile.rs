//! Turns a validated [`RuleFile`] into engine rules, audits and rendered
//! files.

use crate::audit::Audit;
use crate::config::schema::{
    MatcherDefinition, Metadata, RuleDefinition, RuleFile, ScanDefinition, ValidationError,
    ValidationIssue,
};
use crate::engine::{Insertion, Matcher, PatchRule};
use crate::report::Category;
use crate::template;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A rule file ready to run.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub meta: Metadata,
    pub targets: Vec<Target>,
    pub audits: Vec<AuditTarget>,
    pub generated: Vec<GeneratedFile>,
}

/// A set of files and the rules applied, in order, to each of them.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: String,
    pub category: Category,
    pub dir: PathBuf,
    pub files: Vec<String>,
    pub scan: Option<ScanDefinition>,
    pub rules: Vec<PatchRule>,
}

#[derive(Debug, Clone)]
pub struct AuditTarget {
    pub file: PathBuf,
    pub category: Category,
    pub audit: Audit,
}

/// A file created from a template; `content` is already rendered.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub id: String,
    pub path: PathBuf,
    pub content: String,
    pub overwrite: bool,
    pub category: Category,
}

impl MigrationConfig {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn backup_dir(&self) -> &Path {
        Path::new(&self.meta.backup_dir)
    }

    pub fn rule_count(&self) -> usize {
        self.targets.iter().map(|t| t.rules.len()).sum()
    }
}

impl Target {
    /// Root-relative paths this target covers: listed files first, then
    /// scanned files in name order. A scan of a missing directory yields
    /// nothing.
    pub fn resolve_files(&self, root: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
        let mut files: Vec<PathBuf> = self.files.iter().map(|f| self.dir.join(f)).collect();

        let Some(scan) = &self.scan else {
            return Ok(files);
        };
        let scan_dir = root.join(&self.dir);
        if !scan_dir.is_dir() {
            return Ok(files);
        }

        let extension = scan.extension.trim_start_matches('.');
        let walker = WalkDir::new(&scan_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            let matches_ext = entry
                .path()
                .extension()
                .is_some_and(|e| e.to_string_lossy() == extension);
            if !matches_ext
                || scan.exclude_suffixes.iter().any(|s| name.ends_with(s.as_str()))
                || scan.exclude.iter().any(|e| e == name.as_ref())
            {
                continue;
            }
            let relative = self.dir.join(name.as_ref());
            if !files.contains(&relative) {
                files.push(relative);
            }
        }
        Ok(files)
    }
}

/// Compile every rule, audit and template, collecting all failures.
pub fn compile(file: RuleFile) -> Result<MigrationConfig, ValidationError> {
    let mut issues = Vec::new();

    let mut targets = Vec::with_capacity(file.targets.len());
    for def in file.targets {
        let mut rules = Vec::with_capacity(def.rules.len());
        for rule in &def.rules {
            match compile_rule(rule) {
                Ok(rule) => rules.push(rule),
                Err(message) => issues.push(ValidationIssue::Compile {
                    id: format!("{}/{}", def.id, rule.id),
                    message,
                }),
            }
        }
        targets.push(Target {
            id: def.id,
            category: def.category,
            dir: PathBuf::from(def.dir),
            files: def.files,
            scan: def.scan,
            rules,
        });
    }

    let mut audits = Vec::with_capacity(file.audits.len());
    for def in file.audits {
        match Audit::new(
            def.id.clone(),
            &def.pattern,
            &def.items,
            def.unless,
            def.detail,
        ) {
            Ok(audit) => audits.push(AuditTarget {
                file: PathBuf::from(def.file),
                category: def.category,
                audit,
            }),
            Err(err) => issues.push(ValidationIssue::Compile {
                id: def.id,
                message: err.to_string(),
            }),
        }
    }

    let mut generated = Vec::with_capacity(file.generate.len());
    for def in file.generate {
        match template::render(&def.id, &def.template, &def.vars) {
            Ok(content) => generated.push(GeneratedFile {
                id: def.id,
                path: PathBuf::from(def.path),
                content,
                overwrite: def.overwrite,
                category: def.category,
            }),
            Err(err) => issues.push(ValidationIssue::Compile {
                id: def.id,
                message: err.to_string(),
            }),
        }
    }

    if !issues.is_empty() {
        return Err(ValidationError { issues });
    }

    Ok(MigrationConfig {
        meta: file.meta,
        targets,
        audits,
        generated,
    })
}

fn compile_rule(def: &RuleDefinition) -> Result<PatchRule, String> {
    let matcher = match &def.matcher {
        MatcherDefinition::Block {
            prefix,
            open,
            suffix,
        } => {
            let open = open.chars().next().unwrap_or('{');
            Matcher::block(prefix, open, suffix.as_deref())
        }
        MatcherDefinition::Line {
            pattern,
            last: false,
        } => Matcher::first_line(pattern),
        MatcherDefinition::Line {
            pattern,
            last: true,
        } => Matcher::last_line(pattern),
    }
    .map_err(|e| e.to_string())?;

    let insertion = Insertion::new(def.insert.text.clone(), def.insert.at);
    let rule = PatchRule::new(
        def.id.clone(),
        matcher,
        insertion,
        def.already_present.clone(),
    )
    .map_err(|e| e.to_string())?
    .requiring(def.requires.clone());

    Ok(match &def.summary {
        Some(summary) => rule.with_summary(summary.clone()),
        None => rule,
    })
}
