//! Line and word level diffing between two versions of a file.
//!
//! Lines are compared first. Replaced hunks (deleted lines directly followed by
//! inserted lines) are refined token by token when small enough, which gives
//! word-level highlighting inside edited lines. The resulting spans are
//! coalesced into display blocks by [`coalesce_spans`].

use std::fmt::Write as _;

/// Above this many table cells the LCS falls back to delete-all/insert-all.
const MAX_LCS_CELLS: usize = 4_000_000;
/// Replaced hunks with more tokens than this on either side stay line level.
const MAX_REFINE_TOKENS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    Equal,
    Insert,
    Delete,
}

impl SpanKind {
    pub fn marker(&self) -> char {
        match self {
            SpanKind::Equal => ' ',
            SpanKind::Insert => '+',
            SpanKind::Delete => '-',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSpan {
    pub kind: SpanKind,
    pub text: String,
}

impl DiffSpan {
    pub fn new(kind: SpanKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal { old: usize, new: usize },
    Delete { old: usize },
    Insert { new: usize },
}

/// Edit script between two sequences, deletes ordered before inserts inside a
/// replaced region.
fn diff_sequences<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Op> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops = Vec::with_capacity(old.len().max(new.len()));
    for idx in 0..prefix {
        ops.push(Op::Equal { old: idx, new: idx });
    }

    let n = old_mid.len();
    let m = new_mid.len();
    if n > 0 && m > 0 && (n + 1).saturating_mul(m + 1) <= MAX_LCS_CELLS {
        // lcs[i][j] = LCS length of old_mid[i..] and new_mid[j..]
        let width = m + 1;
        let mut lcs = vec![0u32; (n + 1) * width];
        for i in (0..n).rev() {
            for j in (0..m).rev() {
                lcs[i * width + j] = if old_mid[i] == new_mid[j] {
                    lcs[(i + 1) * width + j + 1] + 1
                } else {
                    lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
                };
            }
        }
        let (mut i, mut j) = (0, 0);
        while i < n && j < m {
            if old_mid[i] == new_mid[j] {
                ops.push(Op::Equal {
                    old: prefix + i,
                    new: prefix + j,
                });
                i += 1;
                j += 1;
            } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
                ops.push(Op::Delete { old: prefix + i });
                i += 1;
            } else {
                ops.push(Op::Insert { new: prefix + j });
                j += 1;
            }
        }
        ops.extend((i..n).map(|i| Op::Delete { old: prefix + i }));
        ops.extend((j..m).map(|j| Op::Insert { new: prefix + j }));
    } else {
        ops.extend((0..n).map(|i| Op::Delete { old: prefix + i }));
        ops.extend((0..m).map(|j| Op::Insert { new: prefix + j }));
    }

    let old_tail = old.len() - suffix;
    let new_tail = new.len() - suffix;
    for offset in 0..suffix {
        ops.push(Op::Equal {
            old: old_tail + offset,
            new: new_tail + offset,
        });
    }
    ops
}

fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TokenClass {
    Word,
    Space,
    Newline,
    Other,
}

fn token_class(ch: char) -> TokenClass {
    if ch == '\n' {
        TokenClass::Newline
    } else if ch.is_whitespace() {
        TokenClass::Space
    } else if ch.is_alphanumeric() || ch == '_' {
        TokenClass::Word
    } else {
        TokenClass::Other
    }
}

/// Splits text into words, runs of horizontal whitespace, single newlines and
/// single punctuation characters. Concatenating the tokens gives the input.
pub fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut current: Option<TokenClass> = None;
    for (idx, ch) in text.char_indices() {
        let class = token_class(ch);
        let extends = matches!(
            (current, class),
            (Some(TokenClass::Word), TokenClass::Word) | (Some(TokenClass::Space), TokenClass::Space)
        );
        if !extends {
            if current.is_some() {
                tokens.push(&text[start..idx]);
            }
            start = idx;
            current = Some(class);
        }
    }
    if current.is_some() {
        tokens.push(&text[start..]);
    }
    tokens
}

fn refine_replacement(old: &str, new: &str, spans: &mut Vec<DiffSpan>) {
    let old_tokens = tokenize(old);
    let new_tokens = tokenize(new);
    if old_tokens.len() > MAX_REFINE_TOKENS || new_tokens.len() > MAX_REFINE_TOKENS {
        spans.push(DiffSpan::new(SpanKind::Delete, old));
        spans.push(DiffSpan::new(SpanKind::Insert, new));
        return;
    }
    for op in diff_sequences(&old_tokens, &new_tokens) {
        match op {
            Op::Equal { old, .. } => spans.push(DiffSpan::new(SpanKind::Equal, old_tokens[old])),
            Op::Delete { old } => spans.push(DiffSpan::new(SpanKind::Delete, old_tokens[old])),
            Op::Insert { new } => spans.push(DiffSpan::new(SpanKind::Insert, new_tokens[new])),
        }
    }
}

/// Raw spans before coalescing: whole-line runs for pure inserts, deletes and
/// unchanged regions, token spans inside replaced hunks.
pub fn diff_spans(old: &str, new: &str) -> Vec<DiffSpan> {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let ops = diff_sequences(&old_lines, &new_lines);

    let mut spans = Vec::new();
    let mut idx = 0;
    while idx < ops.len() {
        match ops[idx] {
            Op::Equal { .. } => {
                let mut text = String::new();
                while let Some(Op::Equal { old, .. }) = ops.get(idx) {
                    text.push_str(old_lines[*old]);
                    idx += 1;
                }
                spans.push(DiffSpan::new(SpanKind::Equal, text));
            }
            Op::Delete { .. } | Op::Insert { .. } => {
                let mut removed = String::new();
                let mut added = String::new();
                while let Some(Op::Delete { old }) = ops.get(idx) {
                    removed.push_str(old_lines[*old]);
                    idx += 1;
                }
                while let Some(Op::Insert { new }) = ops.get(idx) {
                    added.push_str(new_lines[*new]);
                    idx += 1;
                }
                match (removed.is_empty(), added.is_empty()) {
                    (false, false) => refine_replacement(&removed, &added, &mut spans),
                    (false, true) => spans.push(DiffSpan::new(SpanKind::Delete, removed)),
                    (true, false) => spans.push(DiffSpan::new(SpanKind::Insert, added)),
                    (true, true) => {}
                }
            }
        }
    }
    spans
}

/// Merges adjacent spans of the same kind into display blocks.
///
/// Equal spans always merge. Insert and delete spans merge only while neither
/// side contains a newline, so line-crossing edits start a block of their own.
pub fn coalesce_spans(spans: Vec<DiffSpan>) -> Vec<DiffSpan> {
    let mut blocks: Vec<DiffSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if span.text.is_empty() {
            continue;
        }
        if let Some(last) = blocks.last_mut() {
            let mergeable = last.kind == span.kind
                && (span.kind == SpanKind::Equal
                    || (!last.text.contains('\n') && !span.text.contains('\n')));
            if mergeable {
                last.text.push_str(&span.text);
                continue;
            }
        }
        blocks.push(span);
    }
    blocks
}

/// Coalesced diff blocks between two versions.
pub fn diff_blocks(old: &str, new: &str) -> Vec<DiffSpan> {
    coalesce_spans(diff_spans(old, new))
}

/// Renders a unified diff with `context` lines around each change. Returns an
/// empty string when both inputs are identical.
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str, context: usize) -> String {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let ops = diff_sequences(&old_lines, &new_lines);
    if ops.iter().all(|op| matches!(op, Op::Equal { .. })) {
        return String::new();
    }

    let mut out = String::new();
    let _ = writeln!(out, "--- {old_label}");
    let _ = writeln!(out, "+++ {new_label}");

    // positions[i] = (old lines consumed, new lines consumed) before ops[i]
    let mut positions = Vec::with_capacity(ops.len() + 1);
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    for op in &ops {
        positions.push((old_pos, new_pos));
        match op {
            Op::Equal { .. } => {
                old_pos += 1;
                new_pos += 1;
            }
            Op::Delete { .. } => old_pos += 1,
            Op::Insert { .. } => new_pos += 1,
        }
    }
    positions.push((old_pos, new_pos));

    let mut idx = 0;
    while idx < ops.len() {
        if matches!(ops[idx], Op::Equal { .. }) {
            idx += 1;
            continue;
        }
        let start = idx.saturating_sub(context);
        let mut end = idx;
        loop {
            while end < ops.len() && !matches!(ops[end], Op::Equal { .. }) {
                end += 1;
            }
            let mut gap = end;
            while gap < ops.len() && matches!(ops[gap], Op::Equal { .. }) {
                gap += 1;
            }
            if gap < ops.len() && gap - end <= context * 2 {
                end = gap;
            } else {
                break;
            }
        }
        let stop = (end + context).min(ops.len());

        let (old_start, new_start) = positions[start];
        let (old_end, new_end) = positions[stop];
        let old_len = old_end - old_start;
        let new_len = new_end - new_start;
        let _ = writeln!(
            out,
            "@@ -{} +{} @@",
            hunk_range(old_start, old_len),
            hunk_range(new_start, new_len)
        );
        for op in &ops[start..stop] {
            let (marker, line) = match *op {
                Op::Equal { old, .. } => (' ', old_lines[old]),
                Op::Delete { old } => ('-', old_lines[old]),
                Op::Insert { new } => ('+', new_lines[new]),
            };
            out.push(marker);
            out.push_str(line);
            if !line.ends_with('\n') {
                out.push_str("\n\\ No newline at end of file\n");
            }
        }
        idx = stop;
    }
    out
}

fn hunk_range(start: usize, len: usize) -> String {
    if len == 0 {
        format!("{start},0")
    } else {
        format!("{},{len}", start + 1)
    }
}
