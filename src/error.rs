//! Typed failures for the storage and revert seams
//!
//! Orchestration code uses `anyhow`; these enums exist where callers branch
//! on the reason (per-file apply bookkeeping, revert reporting).

use std::io;
use std::path::PathBuf;

/// Why a single file operation did not happen.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{path} already exists")]
    AlreadyExists { path: String },

    #[error("{path} does not exist")]
    NotFound { path: String },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("could not back up {path} to {}: {source}", .backup.display())]
    Backup {
        path: String,
        backup: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("text not found in {path}")]
    TextNotFound { path: String },

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Coarse classification of a [`StoreError`], cheap to copy into reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AlreadyExists,
    NotFound,
    InvalidPath,
    Backup,
    TextNotFound,
    Io,
}

impl StoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StoreError::AlreadyExists { .. } => FailureKind::AlreadyExists,
            StoreError::NotFound { .. } => FailureKind::NotFound,
            StoreError::InvalidPath { .. } => FailureKind::InvalidPath,
            StoreError::Backup { .. } => FailureKind::Backup,
            StoreError::TextNotFound { .. } => FailureKind::TextNotFound,
            StoreError::Io { .. } => FailureKind::Io,
        }
    }

    pub(crate) fn io(action: &'static str, path: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::AlreadyExists {
            return StoreError::AlreadyExists {
                path: path.to_string(),
            };
        }
        if source.kind() == io::ErrorKind::NotFound {
            return StoreError::NotFound {
                path: path.to_string(),
            };
        }
        StoreError::Io {
            action,
            path: path.to_string(),
            source,
        }
    }
}

/// Why a hard reset was refused. The working tree is untouched in every case.
#[derive(Debug, thiserror::Error)]
pub enum RevertError {
    #[error("'{0}' does not name a commit")]
    InvalidReference(String),

    #[error("no previous commit to revert to")]
    NoParent,

    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_maps_existing_and_missing() {
        let err = StoreError::io("create", "a.txt", io::Error::from(io::ErrorKind::AlreadyExists));
        assert_eq!(err.kind(), FailureKind::AlreadyExists);

        let err = StoreError::io("read", "a.txt", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), FailureKind::NotFound);

        let err = StoreError::io("write", "a.txt", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind(), FailureKind::Io);
        assert!(err.to_string().starts_with("failed to write a.txt"));
    }
}
