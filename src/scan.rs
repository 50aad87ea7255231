//! Code block extraction from assistant responses
//!
//! Walks free-form markdown-ish text and pulls out every fenced block.
//! Markdown blocks are allowed to contain fenced examples of their own, so
//! they are scanned with a nesting counter instead of stopping at the first
//! fence. Nothing here fails: an unterminated fence simply runs to the end
//! of the text.

const FENCE: &str = "```";

/// Language recorded when the opening fence carries no tag.
pub const DEFAULT_LANGUAGE: &str = "text";

/// A fenced block lifted out of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    /// Body with fences stripped and surrounding whitespace trimmed.
    pub content: String,
    /// Target path named by a leading comment line, if there was one.
    pub filename: Option<String>,
}

impl CodeBlock {
    pub fn new(language: impl Into<String>, content: impl Into<String>) -> Self {
        let language = language.into();
        Self {
            language: if language.is_empty() {
                DEFAULT_LANGUAGE.to_string()
            } else {
                language
            },
            content: content.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename;
        self
    }

    /// Markdown blocks get the nesting-aware scan and the README fallback.
    pub fn is_markdown(&self) -> bool {
        is_markdown_language(&self.language)
    }
}

pub fn is_markdown_language(language: &str) -> bool {
    language.eq_ignore_ascii_case("markdown") || language.eq_ignore_ascii_case("md")
}

/// Extract every fenced block from `text`, in order of appearance.
pub fn scan(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(FENCE) {
        let tag_start = cursor + offset + FENCE.len();
        let (tag, body_start) = match text[tag_start..].find('\n') {
            Some(nl) => (&text[tag_start..tag_start + nl], tag_start + nl + 1),
            // A fence on the last line opens nothing.
            None => break,
        };
        let language = tag.trim();

        if is_markdown_language(language) {
            let (body, next) = nested_body(text, body_start);
            blocks.push(CodeBlock::new(language, body.trim()));
            cursor = next;
        } else {
            let (body, next) = flat_body(text, body_start);
            let (filename, body) = split_filename_comment(body);
            blocks.push(CodeBlock::new(language, body.trim()).with_filename(filename));
            cursor = next;
        }
    }

    blocks
}

/// Body of a non-markdown block: everything up to the next fence that
/// starts a line. Returns the body and the offset of the line after the
/// closing fence (or end of text).
fn flat_body(text: &str, body_start: usize) -> (&str, usize) {
    match find_line_fence(text, body_start) {
        Some(close) => (&text[body_start..close], next_line(text, close)),
        None => (&text[body_start..], text.len()),
    }
}

/// Offset of the line following the one containing `from`.
fn next_line(text: &str, from: usize) -> usize {
    text[from..].find('\n').map_or(text.len(), |nl| from + nl + 1)
}

fn find_line_fence(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut pos = from;
    while let Some(offset) = text[pos..].find(FENCE) {
        let at = pos + offset;
        if at == from || bytes[at - 1] == b'\n' {
            return Some(at);
        }
        pos = at + 1;
    }
    None
}

/// Body of a markdown block, honouring fenced blocks nested inside it.
///
/// A fence line is an opening fence when its tag starts with a letter and a
/// closing fence otherwise. Closing fences first unwind inner blocks; the
/// first one seen at depth zero ends the outer block. A language-less
/// opening fence is therefore read as a close.
fn nested_body(text: &str, body_start: usize) -> (&str, usize) {
    let mut depth = 0usize;
    let mut line_start = body_start;

    while line_start < text.len() {
        let line_end = text[line_start..]
            .find('\n')
            .map_or(text.len(), |nl| line_start + nl);
        let line = &text[line_start..line_end];

        if let Some(after_ticks) = line.strip_prefix(FENCE) {
            if is_opening_fence(after_ticks) {
                depth += 1;
            } else if depth > 0 {
                depth -= 1;
            } else {
                return (&text[body_start..line_start], next_line(text, line_start));
            }
        }

        line_start = line_end + 1;
    }

    (&text[body_start..], text.len())
}

/// Classify what follows the ticks on a fence line inside a markdown block.
pub fn is_opening_fence(after_ticks: &str) -> bool {
    after_ticks
        .trim()
        .chars()
        .next()
        .is_some_and(char::is_alphabetic)
}

/// If the first body line is a filename comment, lift it out.
fn split_filename_comment(body: &str) -> (Option<String>, &str) {
    let (first_line, rest) = body.split_once('\n').unwrap_or((body, ""));
    match filename_from_comment(first_line) {
        Some(filename) => (Some(filename), rest),
        None => (None, body),
    }
}

/// (opening marker, optional closing marker)
const COMMENT_MARKERS: &[(&str, Option<&str>)] = &[
    ("<!--", Some("-->")),
    ("/*", Some("*/")),
    ("//", None),
    ("--", None),
    ("#", None),
];

const FILENAME_LABELS: &[&str] = &["filename:", "file:", "path:"];

/// Heuristic: does this line look like `# src/app.py` or `// main.rs`?
///
/// Matches a comment marker followed by a single path-like token containing
/// a `.` or `/`. An optional `file:`/`filename:`/`path:` label is skipped.
/// Shebangs never match.
pub fn filename_from_comment(line: &str) -> Option<String> {
    let line = line.trim();
    if line.starts_with("#!") {
        return None;
    }

    let (open, close) = COMMENT_MARKERS
        .iter()
        .find(|(open, _)| line.starts_with(open))?;

    let mut rest = &line[open.len()..];
    rest = match *open {
        "#" => rest.trim_start_matches('#'),
        "//" => rest.strip_prefix(['/', '!']).unwrap_or(rest),
        _ => rest,
    };
    if let Some(close) = close {
        rest = rest.trim_end().strip_suffix(close).unwrap_or(rest);
    }
    let mut candidate = rest.trim();

    for label in FILENAME_LABELS {
        if candidate.len() >= label.len()
            && candidate.is_char_boundary(label.len())
            && candidate[..label.len()].eq_ignore_ascii_case(label)
        {
            candidate = candidate[label.len()..].trim_start();
            break;
        }
    }

    let looks_like_path = !candidate.is_empty()
        && (candidate.contains('.') || candidate.contains('/'))
        && !candidate.chars().any(char::is_whitespace);

    looks_like_path.then(|| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Flat Blocks
    // ========================================================================

    #[test]
    fn test_single_block_with_filename_comment() {
        let blocks = scan("```python\n# main.py\nprint(1)\n```");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "python");
        assert_eq!(blocks[0].filename.as_deref(), Some("main.py"));
        assert_eq!(blocks[0].content, "print(1)");
    }

    #[test]
    fn test_comment_path_round_trip() {
        let text = "Here you go:\n\n```python\n# src/app.py\nimport os\n\ndef run():\n    pass\n```\n";
        let blocks = scan(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].filename.as_deref(), Some("src/app.py"));
        assert!(!blocks[0].content.contains("src/app.py"));
        assert!(blocks[0].content.starts_with("import os"));
        assert!(blocks[0].content.ends_with("pass"));
    }

    #[test]
    fn test_missing_language_defaults_to_text() {
        let blocks = scan("```\nplain words\n```");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, DEFAULT_LANGUAGE);
        assert_eq!(blocks[0].content, "plain words");
    }

    #[test]
    fn test_consecutive_blocks_extracted_in_order() {
        let text = "intro\n```rust\n// src/lib.rs\npub fn a() {}\n```\nbetween\n```js\n// app.js\nlet x = 1;\n```\noutro";
        let blocks = scan(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].filename.as_deref(), Some("src/lib.rs"));
        assert_eq!(blocks[0].content, "pub fn a() {}");
        assert_eq!(blocks[1].filename.as_deref(), Some("app.js"));
        assert_eq!(blocks[1].content, "let x = 1;");
    }

    #[test]
    fn test_text_outside_fences_is_ignored() {
        assert!(scan("no code here, just words.").is_empty());
        assert!(scan("").is_empty());
    }

    #[test]
    fn test_empty_fence_pair_yields_empty_block() {
        let blocks = scan("```python\n```");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "python");
        assert_eq!(blocks[0].content, "");
        assert!(blocks[0].filename.is_none());
    }

    #[test]
    fn test_unterminated_block_runs_to_end() {
        let blocks = scan("```python\n# tool.py\nx = 1\ny = 2\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].filename.as_deref(), Some("tool.py"));
        assert_eq!(blocks[0].content, "x = 1\ny = 2");
    }

    #[test]
    fn test_opening_fence_at_end_of_text() {
        assert!(scan("trailing ```python").is_empty());
        let blocks = scan("```rust\nfn a() {}\n```\nthen ```");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "fn a() {}");
    }

    #[test]
    fn test_tagged_closing_fence_does_not_open_a_block() {
        let blocks = scan("```a\nx\n```b\ny\n```");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "a");
        assert_eq!(blocks[0].content, "x");
    }

    #[test]
    fn test_inline_ticks_do_not_close_flat_block() {
        let blocks = scan("```sh\necho ```not a fence```\n```");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "echo ```not a fence```");
    }

    #[test]
    fn test_block_count_matches_balanced_pairs() {
        let text = "```a\n1\n```\n```b\n2\n```\n```\n3\n```\n```markdown\n# t\n```c\n4\n```\n```";
        assert_eq!(scan(text).len(), 4);
    }

    // ========================================================================
    // Nested Markdown Blocks
    // ========================================================================

    #[test]
    fn test_markdown_block_keeps_nested_fences() {
        let text = "```markdown\n# README\nThis is a readme file.\n\n## Installation\n```bash\npip install requests\n```\n\n## Usage\n```bash\npython main.py\n```\n\n## More info\nSome more content here.\n```";
        let blocks = scan(text);
        assert_eq!(blocks.len(), 1);
        let content = &blocks[0].content;
        assert_eq!(blocks[0].language, "markdown");
        assert!(blocks[0].filename.is_none());
        assert!(content.starts_with("# README"));
        assert!(content.contains("## Installation"));
        assert!(content.contains("## Usage"));
        assert!(content.ends_with("Some more content here."));
        assert_eq!(content.matches("```bash").count(), 2);
        assert!(content.contains("```bash\npip install requests\n```"));
        assert!(content.contains("```bash\npython main.py\n```"));
    }

    #[test]
    fn test_md_alias_uses_nesting() {
        let text = "```md\nintro\n```python\nx = 1\n```\nend\n```\nafter";
        let blocks = scan(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "intro\n```python\nx = 1\n```\nend");
    }

    #[test]
    fn test_block_after_markdown_block_is_scanned() {
        let text = "```markdown\n# Doc\n```\n\n```toml\n# Cargo.toml\n[package]\n```";
        let blocks = scan(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].content, "# Doc");
        assert_eq!(blocks[1].language, "toml");
        assert_eq!(blocks[1].filename.as_deref(), Some("Cargo.toml"));
        assert_eq!(blocks[1].content, "[package]");
    }

    #[test]
    fn test_unterminated_markdown_takes_rest() {
        let text = "```markdown\n# Title\n```rust\nfn main() {}\n```\nstill inside";
        let blocks = scan(text);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].content.ends_with("still inside"));
    }

    #[test]
    fn test_bare_inner_opening_fence_closes_outer_block() {
        // A language-less inner fence is read as the outer close.
        let text = "```markdown\nbefore\n```\ninner\n```\nafter";
        let blocks = scan(text);
        assert_eq!(blocks[0].content, "before");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].language, DEFAULT_LANGUAGE);
        assert_eq!(blocks[1].content, "after");
    }

    #[test]
    fn test_opening_fence_classification() {
        assert!(is_opening_fence("python"));
        assert!(is_opening_fence("  bash  "));
        assert!(!is_opening_fence(""));
        assert!(!is_opening_fence("   "));
        assert!(!is_opening_fence("{r}"));
        assert!(!is_opening_fence("`"));
    }

    // ========================================================================
    // Filename Comment Heuristic
    // ========================================================================

    #[test]
    fn test_filename_from_comment_markers() {
        assert_eq!(filename_from_comment("# main.py").as_deref(), Some("main.py"));
        assert_eq!(filename_from_comment("## main.py").as_deref(), Some("main.py"));
        assert_eq!(filename_from_comment("// src/app.js").as_deref(), Some("src/app.js"));
        assert_eq!(filename_from_comment("-- db/schema.sql").as_deref(), Some("db/schema.sql"));
        assert_eq!(filename_from_comment("/* style.css */").as_deref(), Some("style.css"));
        assert_eq!(filename_from_comment("<!-- index.html -->").as_deref(), Some("index.html"));
        assert_eq!(filename_from_comment("# File: lib/util.rb").as_deref(), Some("lib/util.rb"));
    }

    #[test]
    fn test_filename_from_comment_rejects_prose_and_code() {
        assert_eq!(filename_from_comment("# This is a heading."), None);
        assert_eq!(filename_from_comment("#!/usr/bin/env python"), None);
        assert_eq!(filename_from_comment("#!/bin/sh"), None);
        assert_eq!(filename_from_comment("# no path here"), None);
        assert_eq!(filename_from_comment("print('a.b')"), None);
        assert_eq!(filename_from_comment("#"), None);
    }

    #[test]
    fn test_non_path_comment_stays_in_content() {
        let blocks = scan("```python\n# compute the answer\nx = 42\n```");
        assert!(blocks[0].filename.is_none());
        assert_eq!(blocks[0].content, "# compute the answer\nx = 42");
    }
}
