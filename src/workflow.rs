//! Session controller for the propose/approve cycle
//!
//! A [`Session`] owns the pending proposals for one project. Model output is
//! ingested into the queue; approval applies the whole queue and commits the
//! files that were written, rejection discards it untouched.

use crate::apply::{self, ApplyOutcome};
use crate::config::{is_valid_backup_dir, Config};
use crate::error::{RevertError, StoreError};
use crate::git_ops::{CommitGate, CommitOutcome, CommitRecord};
use crate::proposal::{Proposal, ProposalQueue};
use crate::resolve::{is_valid_filename, resolve_filename, README_FILENAME};
use crate::scan::scan;
use crate::storage::{FileStore, ProjectFiles};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const README_COMMIT_MESSAGE: &str = "Initial project setup with README";

fn readme_content(description: &str) -> String {
    format!(
        "# Project\n\n## Description\n{}\n\n## Notes\nThis project was created and is managed by draftsman.\n",
        description
    )
}

/// What happened to the blocks of one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Queue positions of the proposals added, in order.
    pub proposed: Vec<usize>,
    /// Blocks no filename could be inferred for.
    pub unresolved: usize,
    /// Filenames that were inferred but failed validation.
    pub invalid: Vec<String>,
    /// Blocks with nothing to write.
    pub empty: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchCommit {
    Committed(CommitRecord),
    NothingToCommit,
    /// Auto-commit is off, or every proposal failed.
    Skipped,
    /// Files stay written; the commit itself did not happen.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub outcome: ApplyOutcome,
    pub commit: BatchCommit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Approval {
    NothingPending,
    Applied(BatchReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NothingToReject,
    /// Paths of the discarded proposals, in queue order.
    Rejected(Vec<String>),
}

/// One interactive session over a project directory.
pub struct Session {
    files: ProjectFiles,
    gate: CommitGate,
    queue: ProposalQueue,
    config: Config,
}

impl Session {
    /// Open an existing directory, initializing a repository if it has none.
    pub fn open(root: &Path, config: Config) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("{} is not a directory", root.display());
        }
        if !is_valid_backup_dir(&config.backup_dir) {
            anyhow::bail!("Invalid backup directory '{}'", config.backup_dir);
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", root.display()))?;

        let gate = CommitGate::open_or_init_with_backup_dir(&root, &config.backup_dir)?;
        let files = ProjectFiles::new(root)
            .with_backup_dir(&config.backup_dir)
            .with_backups(config.backups_enabled);

        Ok(Self {
            files,
            gate,
            queue: ProposalQueue::new(),
            config,
        })
    }

    /// Create `root` (if needed) as a fresh project with a README. An
    /// existing README is left as it is.
    pub fn create_project(root: &Path, description: &str, config: Config) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create project directory {}", root.display()))?;
        let session = Self::open(root, config)?;

        match session.files.create(README_FILENAME, &readme_content(description)) {
            Ok(_) => {
                session
                    .gate
                    .commit_paths(&[README_FILENAME.to_string()], README_COMMIT_MESSAGE)?;
            }
            Err(StoreError::AlreadyExists { .. }) => {
                tracing::info!(root = %session.root().display(), "keeping existing README");
            }
            Err(err) => return Err(err).context("Failed to write README"),
        }

        tracing::info!(root = %session.root().display(), "created project");
        Ok(session)
    }

    pub fn root(&self) -> &Path {
        self.files.root()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn files(&self) -> &ProjectFiles {
        &self.files
    }

    pub fn pending(&self) -> &[Proposal] {
        self.queue.peek()
    }

    /// Scan a model response and queue a proposal for every block that
    /// resolves to a valid filename.
    pub fn ingest(&mut self, response: &str, user_message: &str) -> IngestReport {
        let blocks = scan(response);
        let block_count = blocks.len();
        let mut report = IngestReport::default();

        for block in &blocks {
            if block.content.is_empty() {
                report.empty += 1;
                continue;
            }

            let Some(filename) = resolve_filename(block, block_count, user_message) else {
                tracing::debug!(language = %block.language, "no filename for block");
                report.unresolved += 1;
                continue;
            };

            if !is_valid_filename(&filename) {
                tracing::debug!(filename = %filename, "rejected filename");
                report.invalid.push(filename);
                continue;
            }

            let proposal = match self.files.read(&filename) {
                Some(current) => Proposal::update(filename, current, block.content.clone()),
                None => Proposal::create(filename, block.content.clone()),
            };
            report.proposed.push(self.queue.push(proposal));
        }

        report
    }

    /// Apply every pending proposal, then commit what was written.
    pub fn approve(&mut self) -> Approval {
        if self.queue.is_empty() {
            return Approval::NothingPending;
        }

        let outcome = apply::apply(&self.files, self.queue.drain());

        let commit = if !self.config.auto_commit || outcome.succeeded.is_empty() {
            BatchCommit::Skipped
        } else {
            match self.gate.commit_batch(&outcome) {
                Ok(CommitOutcome::Committed(record)) => BatchCommit::Committed(record),
                Ok(CommitOutcome::NothingToCommit) => BatchCommit::NothingToCommit,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to commit applied changes");
                    BatchCommit::Failed(format!("{:#}", err))
                }
            }
        };

        Approval::Applied(BatchReport { outcome, commit })
    }

    /// Discard every pending proposal without touching the filesystem.
    pub fn reject(&mut self) -> Rejection {
        if self.queue.is_empty() {
            return Rejection::NothingToReject;
        }
        let paths = self
            .queue
            .drain()
            .into_iter()
            .map(|p| p.file_path)
            .collect();
        Rejection::Rejected(paths)
    }

    pub fn history(&self, limit: usize) -> Result<Vec<CommitRecord>> {
        self.gate.history(limit)
    }

    pub fn undo_last(&self) -> Result<(), RevertError> {
        self.gate.undo_last()
    }

    pub fn revert_to(&self, reference: &str) -> Result<(), RevertError> {
        self.gate.revert_to(reference)
    }

    pub fn snapshot(&self, description: &str) -> Result<CommitOutcome> {
        self.gate.snapshot(description)
    }

    /// Modified and untracked files.
    pub fn status(&self) -> Result<Vec<String>> {
        self.gate.modified_files()
    }

    pub fn backups(&self) -> Vec<PathBuf> {
        self.files.list_backups()
    }

    pub fn restore(&self, backup: &Path, path: &str) -> Result<(), StoreError> {
        self.files.restore_from_backup(backup, path)
    }
}
