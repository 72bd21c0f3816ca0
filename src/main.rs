use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tenant_patcher::config::{load_from_path, MigrationConfig};
use tenant_patcher::engine::PatchStatus;
use tenant_patcher::logging::init_logging;
use tenant_patcher::report::{MigrationReport, DEFAULT_RENDER_LIMIT};
use tenant_patcher::run::{self, FileChange, Mode, RuleOutcome, RunError, RunOutcome};
use walkdir::WalkDir;

/// Environment variable naming the project root.
const ROOT_ENV: &str = "TENANT_PATCHER_ROOT";

#[derive(Parser)]
#[command(name = "tenant-patcher")]
#[command(about = "Idempotent source patching for multi-tenant migrations", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (defaults to $TENANT_PATCHER_ROOT, then the current directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Rule file to run; repeat for several (otherwise every *.toml in
    /// <root>/tenant-rules, then ./rules)
    #[arg(long, global = true)]
    rules: Vec<PathBuf>,

    /// Show a unified diff of every change
    #[arg(short, long, global = true)]
    diff: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    /// Exit with status 2 when any rule found no anchor
    #[arg(long, global = true)]
    strict: bool,

    /// Entries listed per update section
    #[arg(long, default_value_t = DEFAULT_RENDER_LIMIT, global = true)]
    limit: usize,

    /// More diagnostics on stderr (-vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only errors on stderr
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Also write diagnostics to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every rule and report what would change, without writing
    Preview,

    /// Back up the targeted files, then write the changes
    Apply,

    /// Read-only summary (preview without diffs)
    Report,

    /// List discovered rule files and what they target
    List,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet, cli.log_file.clone())?;

    let root = resolve_root(cli.root.clone());
    let rule_files = if cli.rules.is_empty() {
        discover_rule_files(&root)?
    } else {
        cli.rules.clone()
    };

    match cli.command {
        Commands::Preview => cmd_run(&cli, &root, &rule_files, Mode::Preview, cli.diff),
        Commands::Apply => cmd_run(&cli, &root, &rule_files, Mode::Apply, cli.diff),
        Commands::Report => cmd_run(&cli, &root, &rule_files, Mode::Preview, false),
        Commands::List => cmd_list(&rule_files),
    }
}

/// Resolve the project root.
///
/// Priority order:
/// 1. Explicit --root flag
/// 2. TENANT_PATCHER_ROOT environment variable
/// 3. Current directory
///
/// The root is not required to exist here; the run reports a missing root.
fn resolve_root(cli_root: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_root {
        return path;
    }

    if let Ok(env_path) = env::var(ROOT_ENV) {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }

    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Discover all .toml rule files.
///
/// Discovery order:
/// 1. `<root>/tenant-rules` (rules kept alongside the project).
/// 2. `./rules` relative to the current working directory (the bundled
///    presets when running from this repository).
fn discover_rule_files(root: &Path) -> Result<Vec<PathBuf>> {
    let cwd_rules_dir = env::current_dir().ok().map(|cwd| cwd.join("rules"));
    let root_rules_dir = root.join("tenant-rules");

    let candidate_dirs: Vec<PathBuf> = std::iter::once(root_rules_dir)
        .chain(cwd_rules_dir)
        .collect();

    for rules_dir in candidate_dirs {
        if !rules_dir.is_dir() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&rules_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .toml rule files found in {}/tenant-rules or ./rules (use --rules <file>)",
        root.display()
    )
}

fn load_configs(rule_files: &[PathBuf]) -> Result<Vec<MigrationConfig>> {
    rule_files
        .iter()
        .map(|path| load_from_path(path).map_err(anyhow::Error::from))
        .collect()
}

/// Show unified diff between original and modified content
fn display_diff(change: &FileChange) {
    println!(
        "\n{}",
        format!("--- {} (original)", change.file.display()).dimmed()
    );
    println!(
        "{}",
        format!("+++ {} (migrated)", change.file.display()).dimmed()
    );

    let diff = TextDiff::from_lines(&change.before, &change.after);

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    mode: String,
    root: &'a Path,
    rule_files: &'a [PathBuf],
    snapshot: Option<&'a Path>,
    outcomes: &'a [RuleOutcome],
    report: &'a MigrationReport,
    follow_up: Vec<&'a str>,
}

fn cmd_run(
    cli: &Cli,
    root: &Path,
    rule_files: &[PathBuf],
    mode: Mode,
    show_diff: bool,
) -> Result<ExitCode> {
    let configs = load_configs(rule_files)?;

    let outcome = match run::run(&configs, root, mode) {
        Ok(outcome) => outcome,
        Err(err @ (RunError::MissingRoot(_) | RunError::MissingSourceDir(_))) => {
            eprintln!("{} {}", "✗".red(), err.to_string().red());
            eprintln!("  Run from the project root or pass --root <dir>.");
            return Ok(ExitCode::from(1));
        }
        Err(err) => return Err(err.into()),
    };

    let follow_up: Vec<&str> = configs
        .iter()
        .filter_map(|c| c.meta.follow_up.as_deref())
        .collect();

    match cli.format {
        Format::Json => {
            let output = JsonOutput {
                mode: mode.to_string(),
                root,
                rule_files,
                snapshot: outcome.snapshot.as_ref().map(|s| s.location()),
                outcomes: &outcome.outcomes,
                report: &outcome.report,
                follow_up,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Format::Text => print_text(&configs, root, &outcome, show_diff, cli.limit, &follow_up),
    }

    if cli.strict && outcome.report.no_match_count() > 0 {
        eprintln!(
            "{}",
            format!(
                "{} rule(s) found no anchor (--strict)",
                outcome.report.no_match_count()
            )
            .red()
        );
        return Ok(ExitCode::from(2));
    }

    Ok(ExitCode::SUCCESS)
}

fn print_text(
    configs: &[MigrationConfig],
    root: &Path,
    outcome: &RunOutcome,
    show_diff: bool,
    limit: usize,
    follow_up: &[&str],
) {
    println!("Project root: {}", root.display());
    for config in configs {
        let name = if config.name().is_empty() {
            "(unnamed)"
        } else {
            config.name()
        };
        println!("Rules: {} ({} rules)", name, config.rule_count());
    }
    println!();

    if outcome.mode == Mode::Preview {
        println!("{}", "[DRY RUN - no files were modified]".cyan());
        println!();
    }

    if let Some(snapshot) = &outcome.snapshot {
        println!(
            "{} Backup: {} ({} files)",
            "✓".green(),
            snapshot.location().display(),
            snapshot.files().len()
        );
        println!();
    }

    if show_diff {
        for change in &outcome.changes {
            display_diff(change);
        }
        if !outcome.changes.is_empty() {
            println!();
        }
    }

    println!("{}", outcome.report.render(limit));

    println!("{}", "Summary:".bold());
    println!(
        "  {} applied",
        format!("{}", outcome.count(PatchStatus::Applied)).green()
    );
    println!(
        "  {} already present",
        format!("{}", outcome.count(PatchStatus::SkippedAlreadyPresent)).yellow()
    );
    println!(
        "  {} no match",
        format!("{}", outcome.count(PatchStatus::SkippedNoMatch)).cyan()
    );
    println!(
        "  {} not found",
        format!("{}", outcome.count(PatchStatus::SkippedNotFound)).cyan()
    );

    for note in follow_up {
        println!();
        println!("{}", "Next steps:".bold());
        println!("{}", note.trim_end());
    }
}

fn cmd_list(rule_files: &[PathBuf]) -> Result<ExitCode> {
    for path in rule_files {
        let config = load_from_path(path)?;
        println!("{} {}", "●".cyan(), path.display());
        if !config.name().is_empty() {
            println!("  name: {}", config.name().bold());
        }
        if let Some(description) = &config.meta.description {
            println!("  {}", description.dimmed());
        }
        for target in &config.targets {
            let mut files = target.files.clone();
            if let Some(scan) = &target.scan {
                files.push(format!("*.{}", scan.extension.trim_start_matches('.')));
            }
            println!(
                "  target {} -> {}/{{{}}}",
                target.id,
                target.dir.display(),
                files.join(", ")
            );
            for rule in &target.rules {
                println!("    - {}: {}", rule.name(), rule.summary().dimmed());
            }
        }
        for audit in &config.audits {
            println!("  audit {} -> {}", audit.audit.id(), audit.file.display());
        }
        for generated in &config.generated {
            let mode = if generated.overwrite { "overwrite" } else { "create" };
            println!(
                "  generate {} -> {} ({})",
                generated.id,
                generated.path.display(),
                mode
            );
        }
        println!();
    }
    Ok(ExitCode::SUCCESS)
}
