//! Configuration management for draftsman
//!
//! Stores settings in ~/.config/draftsman/config.json

use crate::proposal::DEFAULT_PREVIEW_CHARS;
use crate::storage::DEFAULT_BACKUP_DIR;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Take a backup before overwriting an existing file
    pub backups_enabled: bool,
    /// Backup directory, relative to the project root
    pub backup_dir: String,
    /// Characters shown per side when previewing a proposal
    pub preview_chars: usize,
    /// Default number of commits shown by `history`
    pub history_limit: usize,
    /// Commit the files that were written after an approval
    pub auto_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backups_enabled: true,
            backup_dir: DEFAULT_BACKUP_DIR.to_string(),
            preview_chars: DEFAULT_PREVIEW_CHARS,
            history_limit: 10,
            auto_commit: true,
        }
    }
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("draftsman"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from the user config directory, or return defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load config from `path`. A file that fails to parse is moved aside
    /// and defaults are returned.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Config>(&content) {
            Ok(config) => config.with_valid_backup_dir(),
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    /// Replace an unusable `backup_dir` with the default.
    fn with_valid_backup_dir(mut self) -> Self {
        if !is_valid_backup_dir(&self.backup_dir) {
            tracing::warn!(
                backup_dir = %self.backup_dir,
                "backup_dir must be a relative path inside the project; using the default"
            );
            self.backup_dir = DEFAULT_BACKUP_DIR.to_string();
        }
        self
    }

    /// Save config to the user config directory
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).context("Failed to create config directory")?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    tracing::warn!(error = %e, "failed to set config directory permissions");
                }
            }
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        write_config_atomic(path, &content).context("Failed to write config")
    }

    /// Config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/draftsman/config.json".to_string())
    }
}

/// A backup directory is a plain relative path inside the project, outside `.git`.
pub fn is_valid_backup_dir(dir: &str) -> bool {
    let mut components = Path::new(dir).components();
    match components.next() {
        Some(Component::Normal(first)) if !first.eq_ignore_ascii_case(".git") => {}
        _ => return false,
    }
    components.all(|c| matches!(c, Component::Normal(_)))
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}
