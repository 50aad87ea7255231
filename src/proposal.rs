//! Staged file changes awaiting approval
//!
//! A response produces zero or more proposals. They sit in the queue, in
//! the order they were found, until the user approves or rejects the whole
//! batch.

use crate::util::preview;

/// Default number of characters shown for each side of a proposal.
pub const DEFAULT_PREVIEW_CHARS: usize = 500;

const BANNER_WIDTH: usize = 70;

/// A full-file replacement (or creation) that has not been applied yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub file_path: String,
    pub description: String,
    /// Empty when the proposal creates the file.
    pub current_content: String,
    pub new_content: String,
}

impl Proposal {
    pub fn create(file_path: impl Into<String>, new_content: impl Into<String>) -> Self {
        let file_path = file_path.into();
        Self {
            description: format!("Create new file {}", file_path),
            file_path,
            current_content: String::new(),
            new_content: new_content.into(),
        }
    }

    pub fn update(
        file_path: impl Into<String>,
        current_content: impl Into<String>,
        new_content: impl Into<String>,
    ) -> Self {
        let file_path = file_path.into();
        Self {
            description: format!("Update {} with new code", file_path),
            file_path,
            current_content: current_content.into(),
            new_content: new_content.into(),
        }
    }

    pub fn is_creation(&self) -> bool {
        self.current_content.is_empty()
    }

    /// Human-facing preview block, numbered from 1.
    pub fn render(&self, position: usize, preview_chars: usize) -> String {
        let rule = "=".repeat(BANNER_WIDTH);
        let thin = "-".repeat(BANNER_WIDTH);
        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!("PROPOSED CHANGE #{}\n", position));
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!("File: {}\n", self.file_path));
        out.push_str(&format!("Description: {}\n", self.description));
        out.push_str("\nCurrent content preview:\n");
        out.push_str(&thin);
        out.push('\n');
        out.push_str(&preview(&self.current_content, preview_chars));
        out.push_str("\n\nNew content preview:\n");
        out.push_str(&thin);
        out.push('\n');
        out.push_str(&preview(&self.new_content, preview_chars));
        out.push('\n');
        out.push_str(&rule);
        out
    }
}

/// Ordered staging area. Same-path proposals are kept as separate entries.
#[derive(Debug, Default)]
pub struct ProposalQueue {
    entries: Vec<Proposal>,
}

impl ProposalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append and return the 1-based position of the new entry.
    pub fn push(&mut self, proposal: Proposal) -> usize {
        self.entries.push(proposal);
        self.entries.len()
    }

    /// Take every entry in insertion order, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<Proposal> {
        std::mem::take(&mut self.entries)
    }

    pub fn peek(&self) -> &[Proposal] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
