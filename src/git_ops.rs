//! Git operations for approved batches
//!
//! Provides bootstrap, commit, history, snapshot, and hard-reset operations.

use crate::apply::ApplyOutcome;
use crate::error::RevertError;
use crate::storage::DEFAULT_BACKUP_DIR;
use crate::util::resolve_repo_path_allow_new;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use git2::{
    Commit, ErrorCode, Index, IndexAddOption, Repository, ResetType, Signature, StatusOptions,
};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const BOOTSTRAP_MESSAGE: &str = "Initial commit - Project created";
pub const SNAPSHOT_PREFIX: &str = "Snapshot: ";
const SHORT_HASH_LEN: usize = 8;

const DEFAULT_IGNORES: &[&str] = &[
    "__pycache__/",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    ".Python",
    "env/",
    "venv/",
    ".env",
    "*.egg-info/",
    "dist/",
    "build/",
    "target/",
    "node_modules/",
];

/// Message for a batch commit covering `count` files.
pub fn batch_message(count: usize) -> String {
    format!("Applied changes to {} file(s)", count)
}

/// One entry of the commit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub short_hash: String,
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl CommitRecord {
    fn from_commit(commit: &Commit<'_>) -> Self {
        let id = commit.id().to_string();
        let timestamp = DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0)
            .map(|utc| utc.with_timezone(&Local))
            .unwrap_or_else(Local::now);
        Self {
            short_hash: id[..SHORT_HASH_LEN.min(id.len())].to_string(),
            timestamp,
            message: commit.message().unwrap_or("").trim().to_string(),
        }
    }
}

impl fmt::Display for CommitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.short_hash,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitRecord),
    /// Staged tree matched HEAD; no commit was created.
    NothingToCommit,
}

/// Version-control side of an approval: one commit per batch, plus the
/// history and reset primitives used for undo.
#[derive(Debug, Clone)]
pub struct CommitGate {
    root: PathBuf,
    backup_dir: String,
}

impl CommitGate {
    /// Open the repository at `root`, creating it (with a bootstrap commit)
    /// when the directory is not a repository yet.
    pub fn open_or_init(root: &Path) -> Result<Self> {
        Self::open_or_init_with_backup_dir(root, DEFAULT_BACKUP_DIR)
    }

    pub fn open_or_init_with_backup_dir(root: &Path, backup_dir: &str) -> Result<Self> {
        let gate = Self {
            root: root.to_path_buf(),
            backup_dir: backup_dir.trim_end_matches('/').to_string(),
        };

        match Repository::open(root) {
            Ok(_) => {}
            Err(err) if err.code() == ErrorCode::NotFound => {
                let repo = Repository::init(root).with_context(|| {
                    format!("Failed to initialize repository at '{}'", root.display())
                })?;
                gate.bootstrap(&repo)?;
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to open repository at '{}'", root.display())
                })
            }
        }

        Ok(gate)
    }

    fn open_repo(&self) -> Result<Repository> {
        Repository::open(&self.root).with_context(|| {
            format!("Failed to open repository at '{}'", self.root.display())
        })
    }

    /// Write `.gitignore` and record the root commit.
    fn bootstrap(&self, repo: &Repository) -> Result<()> {
        let gitignore = self.root.join(".gitignore");
        if !gitignore.exists() {
            let mut content = String::new();
            for pattern in DEFAULT_IGNORES {
                content.push_str(pattern);
                content.push('\n');
            }
            content.push_str(&format!("{}/\n", self.backup_dir));
            fs::write(&gitignore, content).context("Failed to write .gitignore")?;
        }

        let mut index = repo.index()?;
        index.add_path(Path::new(".gitignore"))?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = signature(repo)?;
        repo.commit(Some("HEAD"), &sig, &sig, BOOTSTRAP_MESSAGE, &tree, &[])?;

        tracing::info!(root = %self.root.display(), "initialized repository");
        Ok(())
    }

    /// Stage exactly `paths` and commit them together.
    pub fn commit_paths(&self, paths: &[String], message: &str) -> Result<CommitOutcome> {
        if paths.is_empty() {
            return Ok(CommitOutcome::NothingToCommit);
        }

        let repo = self.open_repo()?;
        let mut index = repo.index()?;

        for path in paths {
            let resolved = resolve_repo_path_allow_new(&self.root, Path::new(path))
                .map_err(|e| anyhow::anyhow!("Invalid path '{}': {}", path, e))?;
            if resolved.absolute.exists() {
                index
                    .add_path(&resolved.relative)
                    .with_context(|| format!("Failed to stage {}", path))?;
            } else {
                let _ = index.remove_path(&resolved.relative);
            }
        }
        index.write()?;

        commit_index(&repo, &mut index, message)
    }

    /// Commit the files that made it to disk in one approval.
    pub fn commit_batch(&self, outcome: &ApplyOutcome) -> Result<CommitOutcome> {
        let succeeded = outcome.succeeded_paths();
        self.commit_paths(&succeeded, &batch_message(succeeded.len()))
    }

    /// Stage every change in the working tree (backups excluded) and commit.
    pub fn snapshot(&self, description: &str) -> Result<CommitOutcome> {
        let repo = self.open_repo()?;
        let mut index = repo.index()?;
        let backup_prefix = format!("{}/", self.backup_dir);

        let skip_backups = &mut |path: &Path, _matched: &[u8]| -> i32 {
            if path.to_string_lossy().starts_with(&backup_prefix) {
                1
            } else {
                0
            }
        };
        index.add_all(
            ["*"].iter(),
            IndexAddOption::DEFAULT,
            Some(skip_backups as &mut git2::IndexMatchedPath),
        )?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        commit_index(
            &repo,
            &mut index,
            &format!("{}{}", SNAPSHOT_PREFIX, description),
        )
    }

    /// Most recent commits first, at most `limit` of them.
    pub fn history(&self, limit: usize) -> Result<Vec<CommitRecord>> {
        let repo = self.open_repo()?;
        if head_commit(&repo)?.is_none() {
            return Ok(Vec::new());
        }

        let mut walk = repo.revwalk()?;
        walk.push_head()?;
        walk.set_sorting(git2::Sort::TIME | git2::Sort::TOPOLOGICAL)?;

        let mut records = Vec::new();
        for oid in walk.take(limit) {
            let commit = repo.find_commit(oid?)?;
            records.push(CommitRecord::from_commit(&commit));
        }
        Ok(records)
    }

    /// Hard-reset tracked files to `reference` (hash, tag, branch, `HEAD~n`).
    pub fn revert_to(&self, reference: &str) -> Result<(), RevertError> {
        let repo = Repository::open(&self.root)?;
        let commit = repo
            .revparse_single(reference)
            .and_then(|object| object.peel_to_commit())
            .map_err(|_| RevertError::InvalidReference(reference.to_string()))?;

        repo.reset(commit.as_object(), ResetType::Hard, None)?;
        tracing::info!(reference, "reset working tree");
        Ok(())
    }

    /// Hard-reset to the parent of HEAD. Refused on the root commit.
    pub fn undo_last(&self) -> Result<(), RevertError> {
        let repo = Repository::open(&self.root)?;
        let head = repo.head()?.peel_to_commit()?;
        let parent = head.parent(0).map_err(|_| RevertError::NoParent)?;

        repo.reset(parent.as_object(), ResetType::Hard, None)?;
        tracing::info!(from = %head.id(), to = %parent.id(), "undid last commit");
        Ok(())
    }

    /// Modified and untracked files, backups excluded.
    pub fn modified_files(&self) -> Result<Vec<String>> {
        let repo = self.open_repo()?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        opts.recurse_untracked_dirs(true);
        opts.include_ignored(false);
        opts.exclude_submodules(true);

        let backup_prefix = format!("{}/", self.backup_dir);
        let statuses = repo.statuses(Some(&mut opts))?;
        let files = statuses
            .iter()
            .filter(|entry| !entry.status().is_ignored())
            .filter_map(|entry| entry.path().map(str::to_string))
            .filter(|path| !path.starts_with(&backup_prefix))
            .collect();
        Ok(files)
    }
}

fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn signature(repo: &Repository) -> Result<Signature<'static>> {
    let config = repo.config()?;
    let name = config
        .get_string("user.name")
        .unwrap_or_else(|_| "draftsman".to_string());
    let email = config
        .get_string("user.email")
        .unwrap_or_else(|_| "draftsman@local".to_string());
    Ok(Signature::now(&name, &email)?)
}

fn commit_index(repo: &Repository, index: &mut Index, message: &str) -> Result<CommitOutcome> {
    let tree_id = index.write_tree()?;
    let parent = head_commit(repo)?;

    let unchanged = match &parent {
        Some(parent) => parent.tree_id() == tree_id,
        None => index.is_empty(),
    };
    if unchanged {
        tracing::debug!(message, "nothing to commit");
        return Ok(CommitOutcome::NothingToCommit);
    }

    let tree = repo.find_tree(tree_id)?;
    let sig = signature(repo)?;
    let parents: Vec<&Commit<'_>> = parent.iter().collect();
    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
    let commit = repo.find_commit(oid)?;

    tracing::info!(hash = %oid, message, "committed");
    Ok(CommitOutcome::Committed(CommitRecord::from_commit(&commit)))
}
