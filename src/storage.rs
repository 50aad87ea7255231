//! Project file access with backup-before-overwrite
//!
//! [`FileStore`] is the only way the apply step touches the filesystem.
//! [`ProjectFiles`] implements it for a real project directory and keeps
//! timestamped backups under a hidden directory in the project root.

use crate::error::StoreError;
use crate::util::{resolve_repo_path_allow_new, RepoPath};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Hidden directory (relative to the project root) holding backups.
pub const DEFAULT_BACKUP_DIR: &str = ".draftsman_backups";

/// `<name>.<YYYYMMDD_HHMMSS_micro>.bak`
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const BACKUP_EXTENSION: &str = "bak";
const MAX_BACKUP_NAME_ATTEMPTS: usize = 10_000;
const GIT_DIR: &str = ".git";

/// What a successful write left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Copy of the previous content, when one was taken.
    pub backup: Option<PathBuf>,
}

/// Storage capabilities the apply step relies on.
pub trait FileStore {
    /// Current content, or `None` when the file is missing or unreadable.
    fn read(&self, path: &str) -> Option<String>;

    /// Overwrite (or create) `path`, backing up the old file first when asked.
    fn write(&self, path: &str, content: &str, want_backup: bool) -> Result<WriteReceipt, StoreError>;

    /// Create `path`; fails with [`StoreError::AlreadyExists`] if it is present.
    fn create(&self, path: &str, content: &str) -> Result<WriteReceipt, StoreError>;
}

#[derive(Debug, Clone)]
pub struct ProjectFiles {
    root: PathBuf,
    backup_dir: PathBuf,
    backups_enabled: bool,
}

impl ProjectFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            backup_dir: root.join(DEFAULT_BACKUP_DIR),
            root,
            backups_enabled: true,
        }
    }

    /// Keep backups in `dir_name` (relative to the root) instead of the default.
    pub fn with_backup_dir(mut self, dir_name: &str) -> Self {
        self.backup_dir = self.root.join(dir_name);
        self
    }

    /// When disabled, `want_backup` is ignored and no copies are made.
    pub fn with_backups(mut self, enabled: bool) -> Self {
        self.backups_enabled = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn resolve(&self, path: &str) -> Result<RepoPath, StoreError> {
        let resolved = resolve_repo_path_allow_new(&self.root, Path::new(path)).map_err(|reason| {
            StoreError::InvalidPath {
                path: path.to_string(),
                reason,
            }
        })?;
        if self.is_reserved(&resolved.relative) {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "repository metadata and backups cannot be edited".to_string(),
            });
        }
        Ok(resolved)
    }

    /// Paths under `.git` or the backup directory.
    fn is_reserved(&self, relative: &Path) -> bool {
        let is_git = match relative.components().next() {
            Some(Component::Normal(first)) => first.to_string_lossy().eq_ignore_ascii_case(GIT_DIR),
            _ => false,
        };
        is_git
            || self
                .backup_dir
                .strip_prefix(&self.root)
                .is_ok_and(|backups| relative.starts_with(backups))
    }

    fn ensure_parent(&self, path: &str, resolved: &RepoPath) -> Result<(), StoreError> {
        if let Some(parent) = resolved.absolute.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io("create directory for", path, e))?;
        }
        Ok(())
    }

    fn backup_if_requested(
        &self,
        path: &str,
        resolved: &RepoPath,
        want_backup: bool,
    ) -> Result<Option<PathBuf>, StoreError> {
        if !want_backup || !self.backups_enabled || !resolved.absolute.is_file() {
            return Ok(None);
        }
        self.create_backup(path, resolved).map(Some)
    }

    /// Copy the file into the backup tree, mirroring its relative directory.
    fn create_backup(&self, path: &str, resolved: &RepoPath) -> Result<PathBuf, StoreError> {
        let file_name = resolved
            .relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| StoreError::InvalidPath {
                path: path.to_string(),
                reason: "path has no file name".to_string(),
            })?;
        let subdir = match resolved.relative.parent() {
            Some(parent) => self.backup_dir.join(parent),
            None => self.backup_dir.clone(),
        };

        fs::create_dir_all(&subdir).map_err(|source| StoreError::Backup {
            path: path.to_string(),
            backup: subdir.clone(),
            source,
        })?;

        let mut target = None;
        for _ in 0..MAX_BACKUP_NAME_ATTEMPTS {
            let stamp = Local::now().format(BACKUP_TIMESTAMP_FORMAT);
            let candidate = subdir.join(format!("{}.{}.{}", file_name, stamp, BACKUP_EXTENSION));
            if !candidate.exists() {
                target = Some(candidate);
                break;
            }
            std::thread::yield_now();
        }
        let target = target.ok_or_else(|| StoreError::Backup {
            path: path.to_string(),
            backup: subdir.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no unused backup name available",
            ),
        })?;

        fs::copy(&resolved.absolute, &target).map_err(|source| StoreError::Backup {
            path: path.to_string(),
            backup: target.clone(),
            source,
        })?;

        tracing::debug!(path, backup = %target.display(), "backup created");
        Ok(target)
    }

    /// Remove a file, backing it up first when asked.
    pub fn delete(&self, path: &str, want_backup: bool) -> Result<WriteReceipt, StoreError> {
        let resolved = self.resolve(path)?;
        if !resolved.absolute.is_file() {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        let backup = self.backup_if_requested(path, &resolved, want_backup)?;
        fs::remove_file(&resolved.absolute).map_err(|e| StoreError::io("delete", path, e))?;
        Ok(WriteReceipt { backup })
    }

    /// Append to an existing file.
    pub fn append(&self, path: &str, content: &str, want_backup: bool) -> Result<WriteReceipt, StoreError> {
        let resolved = self.resolve(path)?;
        if !resolved.absolute.is_file() {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        let backup = self.backup_if_requested(path, &resolved, want_backup)?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&resolved.absolute)
            .map_err(|e| StoreError::io("open", path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| StoreError::io("append to", path, e))?;
        Ok(WriteReceipt { backup })
    }

    /// Replace every occurrence of `old` with `new`. Fails if `old` is absent.
    pub fn replace(
        &self,
        path: &str,
        old: &str,
        new: &str,
        want_backup: bool,
    ) -> Result<WriteReceipt, StoreError> {
        let current = self.read(path).ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
        })?;
        if old.is_empty() || !current.contains(old) {
            return Err(StoreError::TextNotFound {
                path: path.to_string(),
            });
        }
        self.write(path, &current.replace(old, new), want_backup)
    }

    /// Every backup file, sorted by path.
    pub fn list_backups(&self) -> Vec<PathBuf> {
        if !self.backup_dir.is_dir() {
            return Vec::new();
        }
        let mut backups: Vec<PathBuf> = WalkDir::new(&self.backup_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == BACKUP_EXTENSION))
            .collect();
        backups.sort();
        backups
    }

    /// Copy a backup over `path`. Relative backup paths are taken from the root.
    pub fn restore_from_backup(&self, backup: &Path, path: &str) -> Result<(), StoreError> {
        let source = if backup.is_absolute() {
            backup.to_path_buf()
        } else {
            self.root.join(backup)
        };
        if !source.is_file() {
            return Err(StoreError::NotFound {
                path: source.display().to_string(),
            });
        }
        let resolved = self.resolve(path)?;
        self.ensure_parent(path, &resolved)?;
        fs::copy(&source, &resolved.absolute).map_err(|e| StoreError::io("restore", path, e))?;
        tracing::info!(path, backup = %source.display(), "restored from backup");
        Ok(())
    }
}

impl FileStore for ProjectFiles {
    fn read(&self, path: &str) -> Option<String> {
        let resolved = self.resolve(path).ok()?;
        let bytes = fs::read(&resolved.absolute).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn write(&self, path: &str, content: &str, want_backup: bool) -> Result<WriteReceipt, StoreError> {
        let resolved = self.resolve(path)?;
        let backup = self.backup_if_requested(path, &resolved, want_backup)?;
        self.ensure_parent(path, &resolved)?;
        fs::write(&resolved.absolute, content).map_err(|e| StoreError::io("write", path, e))?;
        Ok(WriteReceipt { backup })
    }

    fn create(&self, path: &str, content: &str) -> Result<WriteReceipt, StoreError> {
        let resolved = self.resolve(path)?;
        if resolved.absolute.exists() {
            return Err(StoreError::AlreadyExists {
                path: path.to_string(),
            });
        }
        self.ensure_parent(path, &resolved)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&resolved.absolute)
            .map_err(|e| StoreError::io("create", path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| StoreError::io("write", path, e))?;
        Ok(WriteReceipt::default())
    }
}
