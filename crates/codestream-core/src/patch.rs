//! Minimal unified diff parser and applier.
//!
//! Used to recover the previous version of a file when an event only carries
//! `current_code` and a `diff`, and to check that a diff agrees with the
//! content it was sent with.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("invalid hunk header `{0}`")]
    InvalidHeader(String),
    #[error("hunk body ended early: expected {expected_old} old and {expected_new} new lines")]
    TruncatedHunk {
        expected_old: usize,
        expected_new: usize,
    },
    #[error("diff contains no hunks")]
    NoHunks,
    #[error("hunk does not match content at line {line}")]
    Mismatch { line: usize },
    #[error("hunk starts at line {line} beyond end of content")]
    OutOfRange { line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Added(String),
    Removed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    /// Line texts keep their `\n` unless a "No newline" marker followed them.
    pub lines: Vec<HunkLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// old → new
    Forward,
    /// new → old
    Reverse,
}

fn parse_range(raw: &str) -> Option<(usize, usize)> {
    let mut parts = raw.splitn(2, ',');
    let start = parts.next()?.parse().ok()?;
    let len = match parts.next() {
        Some(len) => len.parse().ok()?,
        None => 1,
    };
    Some((start, len))
}

/// Reads `@@ -a,b +c,d @@` into `(a, b, c, d)`; missing lengths default to 1.
pub fn parse_hunk_header(line: &str) -> Result<(usize, usize, usize, usize), PatchError> {
    let invalid = || PatchError::InvalidHeader(line.to_string());
    let body = line
        .strip_prefix("@@ ")
        .and_then(|rest| rest.split(" @@").next())
        .ok_or_else(invalid)?;
    let mut fields = body.split_whitespace();
    let old = fields
        .next()
        .and_then(|field| field.strip_prefix('-'))
        .and_then(parse_range)
        .ok_or_else(invalid)?;
    let new = fields
        .next()
        .and_then(|field| field.strip_prefix('+'))
        .and_then(parse_range)
        .ok_or_else(invalid)?;
    Ok((old.0, old.1, new.0, new.1))
}

/// Parses every hunk of a unified diff. File headers and git metadata lines
/// between hunks are skipped; hunk bodies are read by their declared lengths so
/// a removed line starting with `--` is never taken for a header.
pub fn parse_unified(diff: &str) -> Result<Vec<Hunk>, PatchError> {
    let mut hunks = Vec::new();
    let mut lines = diff.split_inclusive('\n').peekable();
    while let Some(line) = lines.next() {
        if !line.starts_with("@@") {
            continue;
        }
        let (old_start, old_len, new_start, new_len) = parse_hunk_header(line.trim_end())?;
        let mut hunk = Hunk {
            old_start,
            old_len,
            new_start,
            new_len,
            lines: Vec::new(),
        };
        let (mut seen_old, mut seen_new) = (0, 0);
        while seen_old < old_len || seen_new < new_len {
            let Some(raw) = lines.next() else {
                return Err(PatchError::TruncatedHunk {
                    expected_old: old_len,
                    expected_new: new_len,
                });
            };
            if raw.starts_with('\\') {
                strip_last_newline(&mut hunk.lines);
                continue;
            }
            let (marker, text) = match raw.chars().next() {
                Some(marker @ (' ' | '+' | '-')) => (marker, &raw[1..]),
                // some generators drop the space of blank context lines
                _ => (' ', raw),
            };
            let text = text.to_string();
            match marker {
                '+' => {
                    seen_new += 1;
                    hunk.lines.push(HunkLine::Added(text));
                }
                '-' => {
                    seen_old += 1;
                    hunk.lines.push(HunkLine::Removed(text));
                }
                _ => {
                    seen_old += 1;
                    seen_new += 1;
                    hunk.lines.push(HunkLine::Context(text));
                }
            }
        }
        if lines.peek().is_some_and(|next| next.starts_with('\\')) {
            lines.next();
            strip_last_newline(&mut hunk.lines);
        }
        hunks.push(hunk);
    }
    if hunks.is_empty() {
        return Err(PatchError::NoHunks);
    }
    Ok(hunks)
}

fn strip_last_newline(lines: &mut [HunkLine]) {
    if let Some(last) = lines.last_mut() {
        let text = match last {
            HunkLine::Context(text) | HunkLine::Added(text) | HunkLine::Removed(text) => text,
        };
        if text.ends_with('\n') {
            text.pop();
        }
    }
}

/// Applies parsed hunks to `source` in the given direction.
pub fn apply_hunks(source: &str, hunks: &[Hunk], direction: Direction) -> Result<String, PatchError> {
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0usize;
    for hunk in hunks {
        let (start, len) = match direction {
            Direction::Forward => (hunk.old_start, hunk.old_len),
            Direction::Reverse => (hunk.new_start, hunk.new_len),
        };
        // a zero-length range names the line after which the hunk applies
        let begin = if len == 0 { start } else { start.saturating_sub(1) };
        if begin < cursor || begin > lines.len() {
            return Err(PatchError::OutOfRange { line: start });
        }
        for line in &lines[cursor..begin] {
            out.push_str(line);
        }
        cursor = begin;
        for hunk_line in &hunk.lines {
            let (expected, emitted) = match (hunk_line, direction) {
                (HunkLine::Context(text), _) => (Some(text), Some(text)),
                (HunkLine::Removed(text), Direction::Forward)
                | (HunkLine::Added(text), Direction::Reverse) => (Some(text), None),
                (HunkLine::Added(text), Direction::Forward)
                | (HunkLine::Removed(text), Direction::Reverse) => (None, Some(text)),
            };
            if let Some(expected) = expected {
                match lines.get(cursor) {
                    Some(actual) if *actual == expected.as_str() => cursor += 1,
                    _ => return Err(PatchError::Mismatch { line: cursor + 1 }),
                }
            }
            if let Some(emitted) = emitted {
                out.push_str(emitted);
            }
        }
    }
    for line in &lines[cursor..] {
        out.push_str(line);
    }
    Ok(out)
}

pub fn apply_unified(source: &str, diff: &str) -> Result<String, PatchError> {
    apply_hunks(source, &parse_unified(diff)?, Direction::Forward)
}

/// Recovers the old version from the new one.
pub fn reverse_unified(current: &str, diff: &str) -> Result<String, PatchError> {
    apply_hunks(current, &parse_unified(diff)?, Direction::Reverse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_diff::unified_diff;

    #[test]
    fn generated_diff_applies_both_ways() {
        let old = "use std::io;\n\nfn main() {\n    let x = 1;\n    println!(\"{x}\");\n}\n";
        let new = "use std::io;\n\nfn main() {\n    let x = 2;\n    let y = 3;\n    println!(\"{x} {y}\");\n}\n";
        let diff = unified_diff(old, new, "a/main.rs", "b/main.rs", 1);
        assert_eq!(apply_unified(old, &diff).as_deref(), Ok(new));
        assert_eq!(reverse_unified(new, &diff).as_deref(), Ok(old));
    }

    #[test]
    fn missing_trailing_newline_round_trips() {
        let old = "a\nb";
        let new = "a\nc";
        let diff = unified_diff(old, new, "a", "b", 3);
        assert!(diff.contains("\\ No newline at end of file"));
        assert_eq!(reverse_unified(new, &diff).as_deref(), Ok(old));
    }

    #[test]
    fn header_without_lengths_defaults_to_one() {
        let diff = "--- a/x\n+++ b/x\n@@ -1 +1 @@\n-old\n+new\n";
        assert_eq!(apply_unified("old\n", diff).as_deref(), Ok("new\n"));
    }

    #[test]
    fn removed_line_that_looks_like_a_header_is_body() {
        let diff = "--- a/x.sql\n+++ b/x.sql\n@@ -1,2 +1,1 @@\n--- comment\n select 1;\n";
        assert_eq!(
            apply_unified("-- comment\nselect 1;\n", diff).as_deref(),
            Ok("select 1;\n")
        );
    }

    #[test]
    fn mismatching_content_is_rejected() {
        let diff = "@@ -1,1 +1,1 @@\n-alpha\n+beta\n";
        assert_eq!(
            apply_unified("gamma\n", diff),
            Err(PatchError::Mismatch { line: 1 })
        );
    }

    #[test]
    fn diff_without_hunks_is_an_error() {
        assert_eq!(parse_unified("--- a\n+++ b\n"), Err(PatchError::NoHunks));
        assert!(matches!(
            parse_unified("@@ -1,2 +1,2 @@\n a\n"),
            Err(PatchError::TruncatedHunk { .. })
        ));
        assert!(matches!(
            parse_unified("@@ nonsense @@\n"),
            Err(PatchError::InvalidHeader(_))
        ));
    }
}
