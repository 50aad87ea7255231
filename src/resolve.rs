//! Filename inference and validation for scanned blocks
//!
//! A block that did not name its own file may still be targeted by the
//! user's request ("update README.md", "write main.py"). These heuristics
//! only ever pick a name; they never invent content.

use crate::scan::CodeBlock;
use regex::Regex;
use std::sync::OnceLock;

/// Longest filename accepted by [`is_valid_filename`], in characters.
pub const MAX_FILENAME_CHARS: usize = 200;

/// Fallback name for markdown blocks when the user asked about a readme.
pub const README_FILENAME: &str = "README.md";

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', '|', ':', '*', '?', '"'];

fn file_mention_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z0-9_-]+(?:/[A-Za-z0-9_-]+)*\.[A-Za-z0-9]+)\b").ok())
        .as_ref()
}

/// Filename-shaped tokens in `text`, in order of appearance.
///
/// Duplicates are kept: "main.py ... main.py" yields two entries.
pub fn extract_file_mentions(text: &str) -> Vec<String> {
    let Some(re) = file_mention_regex() else {
        return Vec::new();
    };
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Decide which file a block targets.
///
/// The block's own comment filename wins. Otherwise:
/// 1. a lone block takes the first file the user mentioned;
/// 2. a markdown block takes the first file the user mentioned;
/// 3. a markdown block becomes `README.md` when the user said "readme";
/// 4. anything else stays unresolved.
pub fn resolve_filename(block: &CodeBlock, block_count: usize, user_message: &str) -> Option<String> {
    if let Some(filename) = &block.filename {
        return Some(filename.clone());
    }

    let mentioned = extract_file_mentions(user_message);

    if block_count == 1 {
        if let Some(first) = mentioned.first() {
            return Some(first.clone());
        }
    }

    if block.is_markdown() {
        if let Some(first) = mentioned.into_iter().next() {
            return Some(first);
        }
        if user_message.to_lowercase().contains("readme") {
            return Some(README_FILENAME.to_string());
        }
    }

    None
}

/// Reject names that are obviously not files. Deliberately permissive.
pub fn is_valid_filename(filename: &str) -> bool {
    if !filename.contains('.') && !filename.contains('/') {
        return false;
    }
    if filename.contains(' ') {
        return false;
    }
    if filename.chars().count() > MAX_FILENAME_CHARS {
        return false;
    }
    !filename.contains(INVALID_FILENAME_CHARS)
}
