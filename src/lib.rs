//! draftsman library crate
//!
//! Turns fenced code in model responses into file proposals, applies an
//! approved batch with backups, and records it as one git commit.

pub mod apply;
pub mod config;
pub mod error;
pub mod git_ops;
pub mod proposal;
pub mod resolve;
pub mod scan;
pub mod storage;
pub mod util;
pub mod workflow;
