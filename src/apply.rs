//! Best-effort application of a proposal batch
//!
//! Proposals are applied one at a time, in queue order. A failure is
//! recorded against its path and the batch keeps going; nothing is rolled
//! back.

use crate::error::{FailureKind, StoreError};
use crate::proposal::Proposal;
use crate::storage::FileStore;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    /// New file written.
    Created,
    /// Creation raced with an existing file; overwritten without a backup.
    Overwrote,
    /// Existing file replaced (backed up first when backups are on).
    Updated,
}

impl ApplyAction {
    pub fn verb(&self) -> &'static str {
        match self {
            ApplyAction::Created => "Created",
            ApplyAction::Overwrote => "Overwrote",
            ApplyAction::Updated => "Updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub path: String,
    pub action: ApplyAction,
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedChange {
    pub path: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Per-path result of one approval. `succeeded` and `failed` never share a
/// path: the last proposal for a path decides where it lands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub succeeded: Vec<AppliedChange>,
    pub failed: Vec<FailedChange>,
}

impl ApplyOutcome {
    pub fn succeeded_paths(&self) -> Vec<String> {
        self.succeeded.iter().map(|c| c.path.clone()).collect()
    }

    pub fn failed_paths(&self) -> Vec<String> {
        self.failed.iter().map(|c| c.path.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }

    fn forget(&mut self, path: &str) {
        self.succeeded.retain(|c| c.path != path);
        self.failed.retain(|c| c.path != path);
    }

    fn record_success(&mut self, change: AppliedChange) {
        self.forget(&change.path);
        self.succeeded.push(change);
    }

    fn record_failure(&mut self, path: &str, err: &StoreError) {
        self.forget(path);
        self.failed.push(FailedChange {
            path: path.to_string(),
            kind: err.kind(),
            reason: err.to_string(),
        });
    }
}

/// Apply `proposals` in order against `store`.
pub fn apply<S: FileStore + ?Sized>(store: &S, proposals: Vec<Proposal>) -> ApplyOutcome {
    proposals
        .into_iter()
        .fold(ApplyOutcome::default(), |mut outcome, proposal| {
            match apply_one(store, &proposal) {
                Ok(change) => {
                    tracing::info!(path = %change.path, action = change.action.verb(), "applied change");
                    outcome.record_success(change);
                }
                Err(err) => {
                    tracing::warn!(path = %proposal.file_path, error = %err, "failed to apply change");
                    outcome.record_failure(&proposal.file_path, &err);
                }
            }
            outcome
        })
}

fn apply_one<S: FileStore + ?Sized>(store: &S, proposal: &Proposal) -> Result<AppliedChange, StoreError> {
    let path = proposal.file_path.as_str();

    if proposal.is_creation() {
        return match store.create(path, &proposal.new_content) {
            Ok(receipt) => Ok(AppliedChange {
                path: path.to_string(),
                action: ApplyAction::Created,
                backup: receipt.backup,
            }),
            Err(StoreError::AlreadyExists { .. }) => {
                let receipt = store.write(path, &proposal.new_content, false)?;
                Ok(AppliedChange {
                    path: path.to_string(),
                    action: ApplyAction::Overwrote,
                    backup: receipt.backup,
                })
            }
            Err(err) => Err(err),
        };
    }

    let receipt = store.write(path, &proposal.new_content, true)?;
    Ok(AppliedChange {
        path: path.to_string(),
        action: ApplyAction::Updated,
        backup: receipt.backup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ProjectFiles, WriteReceipt};
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    /// In-memory store that can be told to refuse writes to some paths.
    #[derive(Default)]
    struct MemoryStore {
        files: RefCell<HashMap<String, String>>,
        refuse: HashSet<String>,
        backups: RefCell<Vec<(String, String)>>,
        log: RefCell<Vec<String>>,
    }

    impl MemoryStore {
        fn with_file(self, path: &str, content: &str) -> Self {
            self.files.borrow_mut().insert(path.to_string(), content.to_string());
            self
        }

        fn refusing(mut self, path: &str) -> Self {
            self.refuse.insert(path.to_string());
            self
        }

        fn denied(path: &str) -> StoreError {
            StoreError::io(
                "write",
                path,
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            )
        }
    }

    impl FileStore for MemoryStore {
        fn read(&self, path: &str) -> Option<String> {
            self.files.borrow().get(path).cloned()
        }

        fn write(&self, path: &str, content: &str, want_backup: bool) -> Result<WriteReceipt, StoreError> {
            self.log.borrow_mut().push(format!("write:{path}:{want_backup}"));
            if self.refuse.contains(path) {
                return Err(Self::denied(path));
            }
            let previous = self.files.borrow_mut().insert(path.to_string(), content.to_string());
            let backup = match previous {
                Some(old) if want_backup => {
                    self.backups.borrow_mut().push((path.to_string(), old));
                    Some(PathBuf::from(format!("{path}.bak")))
                }
                _ => None,
            };
            Ok(WriteReceipt { backup })
        }

        fn create(&self, path: &str, content: &str) -> Result<WriteReceipt, StoreError> {
            self.log.borrow_mut().push(format!("create:{path}"));
            if self.refuse.contains(path) {
                return Err(Self::denied(path));
            }
            if self.files.borrow().contains_key(path) {
                return Err(StoreError::AlreadyExists {
                    path: path.to_string(),
                });
            }
            self.files.borrow_mut().insert(path.to_string(), content.to_string());
            Ok(WriteReceipt::default())
        }
    }

    #[test]
    fn test_creation_and_update_paths() {
        let store = MemoryStore::default().with_file("old.py", "v1");
        let outcome = apply(
            &store,
            vec![
                Proposal::create("new.py", "fresh"),
                Proposal::update("old.py", "v1", "v2"),
            ],
        );

        assert_eq!(outcome.succeeded_paths(), vec!["new.py", "old.py"]);
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.succeeded[0].action, ApplyAction::Created);
        assert_eq!(outcome.succeeded[1].action, ApplyAction::Updated);
        assert!(outcome.succeeded[1].backup.is_some());
        assert_eq!(
            *store.log.borrow(),
            vec!["create:new.py".to_string(), "write:old.py:true".to_string()]
        );
        assert_eq!(*store.backups.borrow(), vec![("old.py".to_string(), "v1".to_string())]);
    }

    #[test]
    fn test_creation_race_falls_back_to_plain_overwrite() {
        let store = MemoryStore::default().with_file("race.txt", "appeared meanwhile");
        let outcome = apply(&store, vec![Proposal::create("race.txt", "mine")]);

        assert_eq!(outcome.succeeded[0].action, ApplyAction::Overwrote);
        assert!(outcome.succeeded[0].backup.is_none());
        assert_eq!(store.read("race.txt").as_deref(), Some("mine"));
        assert_eq!(
            *store.log.borrow(),
            vec!["create:race.txt".to_string(), "write:race.txt:false".to_string()]
        );
    }

    #[test]
    fn test_failure_does_not_abort_batch() {
        let store = MemoryStore::default().refusing("locked.txt");
        let outcome = apply(
            &store,
            vec![
                Proposal::create("a.txt", "a"),
                Proposal::create("locked.txt", "nope"),
                Proposal::create("b.txt", "b"),
            ],
        );

        assert_eq!(outcome.succeeded_paths(), vec!["a.txt", "b.txt"]);
        assert_eq!(outcome.failed_paths(), vec!["locked.txt"]);
        assert_eq!(outcome.failed[0].kind, FailureKind::Io);
        assert_eq!(store.read("b.txt").as_deref(), Some("b"));
    }

    #[test]
    fn test_later_proposal_for_same_path_wins() {
        let store = MemoryStore::default();
        let outcome = apply(
            &store,
            vec![
                Proposal::create("dup.txt", "first"),
                Proposal::create("dup.txt", "second"),
            ],
        );

        assert_eq!(outcome.succeeded_paths(), vec!["dup.txt"]);
        assert_eq!(outcome.succeeded[0].action, ApplyAction::Overwrote);
        assert_eq!(store.read("dup.txt").as_deref(), Some("second"));
    }

    #[test]
    fn test_succeeded_and_failed_stay_disjoint() {
        let store = MemoryStore::default().with_file("x.txt", "0").refusing("x.txt");
        let outcome = apply(&store, vec![Proposal::update("x.txt", "0", "1")]);
        assert!(outcome.succeeded.is_empty());
        assert_eq!(outcome.failed_paths(), vec!["x.txt"]);

        let mut outcome = ApplyOutcome::default();
        outcome.record_failure("y.txt", &MemoryStore::denied("y.txt"));
        outcome.record_success(AppliedChange {
            path: "y.txt".to_string(),
            action: ApplyAction::Created,
            backup: None,
        });
        assert_eq!(outcome.succeeded_paths(), vec!["y.txt"]);
        assert!(outcome.failed.is_empty());
    }

    #[test]
    fn test_action_verbs_name_what_happened() {
        assert_eq!(ApplyAction::Created.verb(), "Created");
        assert_eq!(ApplyAction::Overwrote.verb(), "Overwrote");
        assert_eq!(ApplyAction::Updated.verb(), "Updated");
    }

    #[test]
    fn test_empty_batch_is_empty_outcome() {
        let store = MemoryStore::default();
        assert!(apply(&store, Vec::new()).is_empty());
    }

    #[test]
    fn test_apply_against_project_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let files = ProjectFiles::new(temp_dir.path());
        std::fs::write(temp_dir.path().join("keep.md"), "before").unwrap();

        let outcome = apply(
            &files,
            vec![
                Proposal::update("keep.md", "before", "after"),
                Proposal::create("../outside.txt", "nope"),
            ],
        );

        assert_eq!(outcome.succeeded_paths(), vec!["keep.md"]);
        assert_eq!(outcome.failed[0].kind, FailureKind::InvalidPath);
        let backup = outcome.succeeded[0].backup.clone().unwrap();
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "before");
    }
}
