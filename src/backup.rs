//! Timestamped backup snapshots taken before any file is written.
//!
//! A snapshot is a plain directory `<backup_root>/<YYYYMMDD_HHMMSS>/` holding
//! byte-for-byte copies of the targeted files at their root-relative paths.
//! There is no manifest; the directory is the record. Snapshots are never
//! read back or deleted by this crate.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// `chrono` format of snapshot directory names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Error, Debug)]
pub enum BackupError {
    /// Two runs started within the same second. The second run refuses to
    /// reuse the first run's snapshot.
    #[error("backup snapshot already exists: {0}")]
    SnapshotExists(PathBuf),

    #[error("backup I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup copy of {0} does not match the original")]
    CopyMismatch(PathBuf),
}

/// Handle to a created snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "the snapshot handle proves the backup was taken"]
pub struct BackupSnapshot {
    location: PathBuf,
    files: Vec<PathBuf>,
}

impl BackupSnapshot {
    /// Snapshot directory.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Root-relative paths of the files copied into the snapshot.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn contains(&self, relative: &Path) -> bool {
        self.files.iter().any(|f| f == relative)
    }
}

/// Create a snapshot named after the current local time.
pub fn create_snapshot(
    root: &Path,
    backup_root: &Path,
    files: &[PathBuf],
) -> Result<BackupSnapshot, BackupError> {
    let stamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
    create_snapshot_named(root, backup_root, files, &stamp)
}

/// Create a snapshot in `backup_root/name`.
///
/// `files` may be absolute paths under `root` or paths relative to it. Files
/// that do not exist are skipped. Fails with [`BackupError::SnapshotExists`]
/// if the snapshot directory is already present.
pub fn create_snapshot_named(
    root: &Path,
    backup_root: &Path,
    files: &[PathBuf],
    name: &str,
) -> Result<BackupSnapshot, BackupError> {
    fs::create_dir_all(backup_root).map_err(|source| BackupError::Io {
        path: backup_root.to_path_buf(),
        source,
    })?;

    let location = backup_root.join(name);
    match fs::create_dir(&location) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(BackupError::SnapshotExists(location));
        }
        Err(source) => {
            return Err(BackupError::Io {
                path: location,
                source,
            })
        }
    }

    info!(location = %location.display(), "creating backup snapshot");

    let mut copied = Vec::new();
    for file in files {
        let (absolute, relative) = split_path(root, file);
        if !absolute.is_file() {
            debug!(file = %absolute.display(), "not backed up: file does not exist");
            continue;
        }
        if copied.contains(&relative) {
            continue;
        }

        let dest = location.join(&relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| BackupError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        copy_verified(&absolute, &dest)?;
        debug!(file = %relative.display(), "backed up");
        copied.push(relative);
    }

    info!(files = copied.len(), "backup snapshot complete");

    Ok(BackupSnapshot {
        location,
        files: copied,
    })
}

/// Resolve `file` into (absolute, root-relative) form.
fn split_path(root: &Path, file: &Path) -> (PathBuf, PathBuf) {
    if file.is_absolute() {
        let relative = file
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| file.file_name().map(PathBuf::from).unwrap_or_default());
        (file.to_path_buf(), relative)
    } else {
        (root.join(file), file.to_path_buf())
    }
}

/// Copy `src` to `dest` and confirm the bytes match.
fn copy_verified(src: &Path, dest: &Path) -> Result<(), BackupError> {
    let original = fs::read(src).map_err(|source| BackupError::Io {
        path: src.to_path_buf(),
        source,
    })?;
    fs::copy(src, dest).map_err(|source| BackupError::Io {
        path: dest.to_path_buf(),
        source,
    })?;
    let copy = fs::read(dest).map_err(|source| BackupError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    if xxh3_64(&original) != xxh3_64(&copy) {
        return Err(BackupError::CopyMismatch(src.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_copies_bytes_and_structure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib/models")).unwrap();
        let bytes = "factory Città({String? nome,}) = _Città;\n".as_bytes();
        fs::write(root.join("lib/models/city.dart"), bytes).unwrap();

        let backup_root = root.join("migration_backup");
        let snapshot = create_snapshot_named(
            root,
            &backup_root,
            &[root.join("lib/models/city.dart")],
            "20260101_120000",
        )
        .unwrap();

        assert_eq!(snapshot.location(), backup_root.join("20260101_120000"));
        assert!(snapshot.contains(Path::new("lib/models/city.dart")));
        let copy = fs::read(snapshot.location().join("lib/models/city.dart")).unwrap();
        assert_eq!(copy, bytes);
    }

    #[test]
    fn test_missing_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("present.dart"), "x").unwrap();

        let snapshot = create_snapshot_named(
            root,
            &root.join("bk"),
            &[PathBuf::from("present.dart"), PathBuf::from("absent.dart")],
            "s1",
        )
        .unwrap();

        assert_eq!(snapshot.files(), [PathBuf::from("present.dart")]);
        assert!(!snapshot.location().join("absent.dart").exists());
    }

    #[test]
    fn test_duplicate_entries_copied_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.dart"), "x").unwrap();

        let snapshot = create_snapshot_named(
            root,
            &root.join("bk"),
            &[PathBuf::from("a.dart"), root.join("a.dart")],
            "s1",
        )
        .unwrap();
        assert_eq!(snapshot.files().len(), 1);
    }

    #[test]
    fn test_same_name_collision_errors() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let backup_root = root.join("bk");

        create_snapshot_named(root, &backup_root, &[], "20260101_120000").unwrap();
        let err = create_snapshot_named(root, &backup_root, &[], "20260101_120000").unwrap_err();
        assert!(matches!(err, BackupError::SnapshotExists(_)));
    }

    #[test]
    fn test_timestamped_snapshot_name() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = create_snapshot(dir.path(), &dir.path().join("bk"), &[]).unwrap();
        let name = snapshot.location().file_name().unwrap().to_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(name, TIMESTAMP_FORMAT).is_ok());
    }
}
