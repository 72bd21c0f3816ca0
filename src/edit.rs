use crate::engine::PatchResult;
use crate::report::{Category, MigrationReport};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// Check that the file on disk still holds the text a result was computed
/// from, so a concurrent edit is reported instead of overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentCheck {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large files)
    Hash(u64),
}

impl ContentCheck {
    /// Check if the provided text matches.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            ContentCheck::ExactMatch(expected) => text == expected,
            ContentCheck::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create a check from text, using a hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            ContentCheck::Hash(xxh3_64(text.as_bytes()))
        } else {
            ContentCheck::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("{0} changed on disk since it was read; not overwriting")]
    StaleContent(PathBuf),

    #[error("path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What `write_if_applied` did.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "WriteOutcome reports whether anything was written"]
pub enum WriteOutcome {
    /// New text was written
    Written { file: PathBuf, bytes_changed: usize },
    /// Dry run: the change was recorded but not written
    WouldWrite { file: PathBuf },
    /// The result was not `applied`; nothing to do
    NotApplied,
}

/// Write an applied result back to `file`, or record it on a dry run.
///
/// Results that are not `applied` are a no-op. On a dry run the intended
/// change goes into `report` and the file system is not touched. Otherwise
/// the on-disk text is checked against `result.original_text`, the new text
/// is written atomically as UTF-8 and the change is recorded.
///
/// Callers in mutating mode must have taken the backup snapshot first.
pub fn write_if_applied(
    file: &Path,
    result: &PatchResult,
    dry_run: bool,
    report: &mut MigrationReport,
    category: Category,
    subject: &str,
) -> Result<WriteOutcome, EditError> {
    let Some(new_text) = result.new_text.as_deref().filter(|_| result.is_applied()) else {
        return Ok(WriteOutcome::NotApplied);
    };

    if dry_run {
        report.add_update(category, subject, format!("would apply: {}", result.summary));
        return Ok(WriteOutcome::WouldWrite {
            file: file.to_path_buf(),
        });
    }

    let on_disk = fs::read(file)?;
    let check = ContentCheck::from_text(&result.original_text);
    let unchanged = std::str::from_utf8(&on_disk).is_ok_and(|text| check.matches(text));
    if !unchanged {
        return Err(EditError::StaleContent(file.to_path_buf()));
    }

    atomic_write(file, new_text.as_bytes())?;

    // Code generators and watchers key off mtime
    filetime::set_file_mtime(file, filetime::FileTime::now())?;

    info!(file = %file.display(), rule = %result.rule, "applied");
    report.add_update(category, subject, format!("applied: {}", result.summary));

    Ok(WriteOutcome::Written {
        file: file.to_path_buf(),
        bytes_changed: new_text.len().saturating_sub(result.original_text.len()),
    })
}

/// Write a generated file, creating parent directories as needed.
pub fn write_generated(file: &Path, content: &str) -> Result<(), EditError> {
    let parent = file
        .parent()
        .ok_or_else(|| EditError::NoParent(file.to_path_buf()))?;
    fs::create_dir_all(parent)?;
    atomic_write(file, content.as_bytes())?;
    debug!(file = %file.display(), bytes = content.len(), "generated");
    Ok(())
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the file keeps its previous content.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = path
        .parent()
        .ok_or_else(|| EditError::NoParent(path.to_path_buf()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    // keep the mode of the file being replaced
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{apply_rule, Insertion, Matcher, PatchRule};

    fn import_rule() -> PatchRule {
        PatchRule::new(
            "org-import",
            Matcher::first_line("^import ").unwrap(),
            Insertion::before_line("import 'organization_provider.dart';\n"),
            vec![],
        )
        .unwrap()
        .with_summary("add organization provider import")
    }

    #[test]
    fn test_content_check_exact_and_hash() {
        let small = ContentCheck::from_text("small");
        assert!(matches!(small, ContentCheck::ExactMatch(_)));
        assert!(small.matches("small"));
        assert!(!small.matches("smaller"));

        let big_text = "x".repeat(2000);
        let big = ContentCheck::from_text(&big_text);
        assert!(matches!(big, ContentCheck::Hash(_)));
        assert!(big.matches(&big_text));
        assert!(!big.matches("x"));
    }

    #[test]
    fn test_dry_run_records_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("menu_provider.dart");
        let original = "import 'a.dart';\n";
        fs::write(&file, original).unwrap();

        let result = apply_rule(original, &import_rule());
        let mut report = MigrationReport::new();
        let outcome =
            write_if_applied(&file, &result, true, &mut report, Category::Service, "menu").unwrap();

        assert!(matches!(outcome, WriteOutcome::WouldWrite { .. }));
        assert_eq!(fs::read_to_string(&file).unwrap(), original);
        assert_eq!(
            report.service_updates()[0].detail,
            "would apply: add organization provider import"
        );
    }

    #[test]
    fn test_write_applied_result() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("menu_provider.dart");
        let original = "import 'a.dart';\n// Città\n";
        fs::write(&file, original).unwrap();

        let result = apply_rule(original, &import_rule());
        let mut report = MigrationReport::new();
        let outcome =
            write_if_applied(&file, &result, false, &mut report, Category::Service, "menu")
                .unwrap();

        assert!(matches!(outcome, WriteOutcome::Written { .. }));
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "import 'organization_provider.dart';\nimport 'a.dart';\n// Città\n"
        );
        assert_eq!(report.service_updates().len(), 1);
    }

    #[test]
    fn test_not_applied_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.dart");
        fs::write(&file, "void main() {}\n").unwrap();

        let result = apply_rule("void main() {}\n", &import_rule());
        let mut report = MigrationReport::new();
        let outcome =
            write_if_applied(&file, &result, false, &mut report, Category::Model, "x").unwrap();

        assert_eq!(outcome, WriteOutcome::NotApplied);
        assert_eq!(report.update_count(), 0);
    }

    #[test]
    fn test_stale_content_refused() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.dart");
        fs::write(&file, "import 'a.dart';\n").unwrap();

        let result = apply_rule("import 'a.dart';\n", &import_rule());
        fs::write(&file, "import 'b.dart';\n").unwrap();

        let mut report = MigrationReport::new();
        let err = write_if_applied(&file, &result, false, &mut report, Category::Model, "x")
            .unwrap_err();
        assert!(matches!(err, EditError::StaleContent(_)));
        assert_eq!(fs::read_to_string(&file).unwrap(), "import 'b.dart';\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_write_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("menu_provider.dart");
        let original = "import 'a.dart';\n";
        fs::write(&file, original).unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();

        let result = apply_rule(original, &import_rule());
        let mut report = MigrationReport::new();
        let _ = write_if_applied(&file, &result, false, &mut report, Category::Service, "menu")
            .unwrap();

        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_write_generated_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib/core/utils/org_aware_helpers.dart");
        write_generated(&file, "extension X on Y {}\n").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "extension X on Y {}\n");
    }
}
