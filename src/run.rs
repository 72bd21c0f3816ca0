//! One preview or apply run over a set of rule files.
//!
//! A run has two phases. Planning reads each targeted file once, applies the
//! rules against an in-memory copy and records warnings; nothing is written.
//! Applying then snapshots every file about to change and only afterwards
//! writes, in plan order. Preview stops after planning and records the
//! intended changes as "would apply".

use crate::backup::{self, BackupError, BackupSnapshot};
use crate::config::MigrationConfig;
use crate::edit::{self, WriteOutcome};
use crate::engine::{apply_rule, NoMatchCause, PatchResult, PatchStatus};
use crate::report::{Category, MigrationReport, WarningKind};
use crate::safety::{SafetyError, WorkspaceGuard};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Compute and report, write nothing
    Preview,
    /// Snapshot, then write
    Apply,
}

impl Mode {
    pub fn is_dry_run(self) -> bool {
        self == Mode::Preview
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Preview => f.write_str("preview"),
            Mode::Apply => f.write_str("apply"),
        }
    }
}

/// Errors that abort a run before anything is written.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("project root not found: {0}")]
    MissingRoot(PathBuf),

    #[error("source directory not found: {0} (is this the project root?)")]
    MissingSourceDir(PathBuf),

    #[error(transparent)]
    Guard(#[from] SafetyError),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Status of one rule against one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub file: PathBuf,
    pub rule: String,
    pub status: PatchStatus,
}

/// Net change to one file over the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Root-relative path
    pub file: PathBuf,
    pub before: String,
    pub after: String,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub mode: Mode,
    pub report: MigrationReport,
    /// Present only when an apply run changed existing files
    pub snapshot: Option<BackupSnapshot>,
    pub outcomes: Vec<RuleOutcome>,
    pub changes: Vec<FileChange>,
}

impl RunOutcome {
    pub fn count(&self, status: PatchStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// A file read during planning. `current` accumulates applied rules.
struct Planned {
    relative: PathBuf,
    original: String,
    current: String,
}

struct PendingPatch {
    file: PathBuf,
    subject: String,
    category: Category,
    result: PatchResult,
}

struct PendingFile {
    file: PathBuf,
    subject: String,
    category: Category,
    content: String,
    replaces: bool,
}

struct Plan {
    report: MigrationReport,
    outcomes: Vec<RuleOutcome>,
    files: BTreeMap<PathBuf, Planned>,
    patches: Vec<PendingPatch>,
    generated: Vec<PendingFile>,
}

/// Run every config against the project at `root`.
///
/// Fails only for a missing root or source directory, an unusable root, or
/// a failed snapshot. Per-file problems end up in the report.
pub fn run(configs: &[MigrationConfig], root: &Path, mode: Mode) -> Result<RunOutcome, RunError> {
    if !root.is_dir() {
        return Err(RunError::MissingRoot(root.to_path_buf()));
    }
    for config in configs {
        if let Some(source_dir) = &config.meta.source_dir {
            let dir = root.join(source_dir);
            if !dir.is_dir() {
                return Err(RunError::MissingSourceDir(dir));
            }
        }
    }

    let forbidden = configs.iter().map(|c| c.backup_dir().to_path_buf()).collect();
    let guard = WorkspaceGuard::new(root, forbidden)?;
    info!(root = %guard.root().display(), %mode, configs = configs.len(), "starting run");

    let mut plan = Plan {
        report: MigrationReport::new(),
        outcomes: Vec::new(),
        files: BTreeMap::new(),
        patches: Vec::new(),
        generated: Vec::new(),
    };

    for config in configs {
        plan_targets(config, &guard, &mut plan);
    }
    for config in configs {
        plan_audits(config, &guard, &mut plan);
    }
    for config in configs {
        plan_generated(config, &guard, &mut plan);
    }

    let snapshot = match mode {
        Mode::Apply => take_snapshot(configs, &guard, &plan)?,
        Mode::Preview => None,
    };

    let Plan {
        mut report,
        outcomes,
        files,
        patches,
        generated,
    } = plan;

    for patch in &patches {
        let written = edit::write_if_applied(
            &patch.file,
            &patch.result,
            mode.is_dry_run(),
            &mut report,
            patch.category,
            &patch.subject,
        );
        match written {
            Ok(WriteOutcome::Written { bytes_changed, .. }) => {
                debug!(file = %patch.subject, bytes_changed, "rule written");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(file = %patch.subject, error = %err, "write failed");
                report.add_error(patch.subject.clone(), err.to_string());
            }
        }
    }

    let mut changes: Vec<FileChange> = files
        .into_values()
        .filter(|f| f.current != f.original)
        .map(|f| FileChange {
            file: f.relative,
            before: f.original,
            after: f.current,
        })
        .collect();

    for pending in generated {
        let before = if pending.replaces {
            fs::read_to_string(&pending.file).unwrap_or_default()
        } else {
            String::new()
        };
        if mode == Mode::Apply {
            if let Err(err) = edit::write_generated(&pending.file, &pending.content) {
                warn!(file = %pending.subject, error = %err, "generate failed");
                report.add_error(pending.subject, err.to_string());
                continue;
            }
        }
        let verb = match (mode, pending.replaces) {
            (Mode::Preview, false) => "would create",
            (Mode::Preview, true) => "would overwrite",
            (Mode::Apply, false) => "created",
            (Mode::Apply, true) => "overwritten",
        };
        report.add_update(pending.category, pending.subject.clone(), verb);
        changes.push(FileChange {
            file: PathBuf::from(pending.subject),
            before,
            after: pending.content,
        });
    }

    info!(
        updates = report.update_count(),
        warnings = report.warnings().len(),
        errors = report.errors().len(),
        "run complete"
    );

    Ok(RunOutcome {
        mode,
        report,
        snapshot,
        outcomes,
        changes,
    })
}

/// Current text of `path`: the planned text if already read, else from disk.
/// `Ok(None)` means the file does not exist.
fn current_text<'a>(
    plan: &'a mut Plan,
    guard: &WorkspaceGuard,
    path: &Path,
) -> Result<Option<&'a mut Planned>, std::io::Error> {
    if !plan.files.contains_key(path) {
        if !path.is_file() {
            return Ok(None);
        }
        let original = fs::read_to_string(path)?;
        plan.files.insert(
            path.to_path_buf(),
            Planned {
                relative: guard.relative(path).to_path_buf(),
                current: original.clone(),
                original,
            },
        );
    }
    Ok(plan.files.get_mut(path))
}

fn plan_targets(config: &MigrationConfig, guard: &WorkspaceGuard, plan: &mut Plan) {
    for target in &config.targets {
        if target.scan.is_some() && !guard.root().join(&target.dir).is_dir() {
            plan.report.add_warning(
                WarningKind::NotFound,
                target.dir.display().to_string(),
                format!("directory for '{}' not found", target.id),
            );
        }

        let files = match target.resolve_files(guard.root()) {
            Ok(files) => files,
            Err(err) => {
                plan.report.add_error(target.id.clone(), err.to_string());
                continue;
            }
        };
        debug!(target = %target.id, files = files.len(), "planning target");

        for relative in files {
            let subject = relative.display().to_string();
            let path = match guard.resolve(&relative) {
                Ok(path) => path,
                Err(err) => {
                    plan.report.add_error(subject, err.to_string());
                    continue;
                }
            };

            let text = match current_text(plan, guard, &path) {
                Ok(Some(planned)) => planned.current.clone(),
                Ok(None) => {
                    for rule in &target.rules {
                        let result = PatchResult::not_found(rule);
                        plan.outcomes.push(RuleOutcome {
                            file: relative.clone(),
                            rule: result.rule,
                            status: result.status,
                        });
                    }
                    plan.report
                        .add_warning(WarningKind::NotFound, subject, "file not found");
                    continue;
                }
                Err(err) => {
                    plan.report
                        .add_error(subject, format!("could not read file: {err}"));
                    continue;
                }
            };

            let mut text = text;
            for rule in &target.rules {
                let result = apply_rule(&text, rule);
                plan.outcomes.push(RuleOutcome {
                    file: relative.clone(),
                    rule: result.rule.clone(),
                    status: result.status,
                });

                match result.status {
                    PatchStatus::Applied => {
                        text = result.resulting_text().to_string();
                        plan.patches.push(PendingPatch {
                            file: path.clone(),
                            subject: subject.clone(),
                            category: target.category,
                            result,
                        });
                    }
                    PatchStatus::SkippedAlreadyPresent => {
                        let marker = result.found_marker.as_deref().unwrap_or_default();
                        plan.report.add_warning(
                            WarningKind::AlreadyMigrated,
                            subject.clone(),
                            format!("{} (found '{}')", result.summary, marker.trim()),
                        );
                    }
                    PatchStatus::SkippedNoMatch => match result.no_match {
                        Some(NoMatchCause::Requirement) => {
                            debug!(file = %subject, rule = %result.rule, "requirement absent");
                        }
                        _ => {
                            plan.report.add_warning(
                                WarningKind::NoMatch,
                                subject.clone(),
                                format!(
                                    "{}: no {} anchor found, file left unmigrated",
                                    result.summary,
                                    rule.matcher().kind()
                                ),
                            );
                        }
                    },
                    PatchStatus::SkippedNotFound => {}
                }
            }

            if let Some(planned) = plan.files.get_mut(&path) {
                planned.current = text;
            }
        }
    }
}

/// Audits read the text as it is on disk, not the planned text, so they
/// never count what this run inserts.
fn plan_audits(config: &MigrationConfig, guard: &WorkspaceGuard, plan: &mut Plan) {
    for target in &config.audits {
        let subject = target.file.display().to_string();
        let path = match guard.resolve(&target.file) {
            Ok(path) => path,
            Err(err) => {
                plan.report.add_error(subject, err.to_string());
                continue;
            }
        };
        let hits = match current_text(plan, guard, &path) {
            Ok(Some(planned)) => target.audit.scan(&planned.original),
            Ok(None) => {
                plan.report.add_warning(
                    WarningKind::NotFound,
                    subject,
                    format!("file for audit '{}' not found", target.audit.id()),
                );
                continue;
            }
            Err(err) => {
                plan.report
                    .add_error(subject, format!("could not read file: {err}"));
                continue;
            }
        };
        debug!(audit = %target.audit.id(), hits = hits.len(), "audit scanned");
        for hit in hits {
            plan.report.add_update(
                target.category,
                subject.clone(),
                format!("{}: {}", hit.item, hit.detail),
            );
        }
    }
}

fn plan_generated(config: &MigrationConfig, guard: &WorkspaceGuard, plan: &mut Plan) {
    for generated in &config.generated {
        let subject = generated.path.display().to_string();
        let path = match guard.resolve(&generated.path) {
            Ok(path) => path,
            Err(err) => {
                plan.report.add_error(subject, err.to_string());
                continue;
            }
        };
        // A later rule file may supersede a file an earlier one generates
        if let Some(pending) = plan.generated.iter_mut().find(|p| p.file == path) {
            if generated.overwrite {
                debug!(file = %subject, id = %generated.id, "superseding generated file");
                pending.content = generated.content.clone();
                pending.category = generated.category;
            } else {
                plan.report.add_warning(
                    WarningKind::Exists,
                    subject,
                    format!("'{}' not generated: already generated in this run", generated.id),
                );
            }
            continue;
        }

        let replaces = path.exists();
        if replaces {
            if !generated.overwrite {
                plan.report.add_warning(
                    WarningKind::Exists,
                    subject,
                    format!("'{}' not generated: file already exists", generated.id),
                );
                continue;
            }
            if fs::read_to_string(&path).is_ok_and(|existing| existing == generated.content) {
                plan.report.add_warning(
                    WarningKind::AlreadyMigrated,
                    subject,
                    format!("'{}' is already up to date", generated.id),
                );
                continue;
            }
        }

        plan.generated.push(PendingFile {
            file: path,
            subject,
            category: generated.category,
            content: generated.content.clone(),
            replaces,
        });
    }
}

/// Snapshot every existing file the plan will change. Newly generated files
/// have no prior content, so a plan that only creates files takes none.
fn take_snapshot(
    configs: &[MigrationConfig],
    guard: &WorkspaceGuard,
    plan: &Plan,
) -> Result<Option<BackupSnapshot>, RunError> {
    let mut files: Vec<PathBuf> = plan.patches.iter().map(|p| p.file.clone()).collect();
    files.extend(
        plan.generated
            .iter()
            .filter(|g| g.replaces)
            .map(|g| g.file.clone()),
    );
    if files.is_empty() {
        debug!("no existing file changes; no snapshot taken");
        return Ok(None);
    }

    let backup_dir = configs
        .first()
        .map(|c| c.backup_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(crate::config::DEFAULT_BACKUP_DIR));
    let snapshot = backup::create_snapshot(guard.root(), &guard.root().join(backup_dir), &files)?;
    Ok(Some(snapshot))
}
