use crate::diff_stats::{count_diff_lines, DiffCounts};
use crate::event::{FileChangeEvent, MessageKind};
use crate::language::{resolve_language, RenderTargetError};
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_TREE_SEPARATOR: char = '/';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventShape {
    Delta,
    Snapshot,
}

/// Latest known state of one file, keyed by `filepath`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub filepath: String,
    pub filename: String,
    pub extension: String,
    pub language: Option<String>,
    pub current_code: String,
    pub previous_code: Option<String>,
    pub diff: Option<String>,
    /// Shape of the most recently applied event.
    pub last_shape: EventShape,
    /// The most recent event carried `previous_code` itself.
    pub previous_is_fresh: bool,
    /// The most recent event carried a non-empty `diff` itself.
    pub diff_is_fresh: bool,
    /// Incremented on every applied event; the first event leaves it at 1.
    pub revision: u64,
    /// Store-wide sequence number of the last update to this record.
    pub updated_seq: u64,
}

impl FileRecord {
    fn new(filepath: &str) -> Self {
        Self {
            filepath: filepath.to_string(),
            filename: String::new(),
            extension: String::new(),
            language: None,
            current_code: String::new(),
            previous_code: None,
            diff: None,
            last_shape: EventShape::Snapshot,
            previous_is_fresh: false,
            diff_is_fresh: false,
            revision: 0,
            updated_seq: 0,
        }
    }

    pub fn diff_counts(&self) -> DiffCounts {
        self.diff
            .as_deref()
            .map(count_diff_lines)
            .unwrap_or_default()
    }

    pub fn resolved_language(&self) -> Result<String, RenderTargetError> {
        resolve_language(self.language.as_deref(), &self.extension, &self.filepath)
    }
}

/// Merges one event onto a record.
///
/// Precedence per field:
/// - `current_code` is always replaced.
/// - `filename`, `extension` are replaced when non-empty.
/// - `language` is replaced when present.
/// - `previous_code` is replaced when present.
/// - `diff` is replaced when present; an empty diff clears it.
/// - a `snapshot` event clears `diff` and `previous_code` first.
pub fn merge_event(record: &mut FileRecord, event: FileChangeEvent) {
    let shape = if event.has_delta() {
        EventShape::Delta
    } else {
        EventShape::Snapshot
    };
    if event.kind == MessageKind::Snapshot {
        record.diff = None;
        record.previous_code = None;
    }
    record.current_code = event.current_code;
    if !event.filename.is_empty() {
        record.filename = event.filename;
    }
    if !event.extension.is_empty() {
        record.extension = event.extension;
    }
    if let Some(language) = event.language {
        record.language = Some(language);
    }
    record.previous_is_fresh = event.previous_code.is_some();
    record.diff_is_fresh = event
        .diff
        .as_deref()
        .is_some_and(|diff| !diff.trim().is_empty());
    if let Some(previous) = event.previous_code {
        record.previous_code = Some(previous);
    }
    if let Some(diff) = event.diff {
        record.diff = if diff.trim().is_empty() { None } else { Some(diff) };
    }
    record.last_shape = shape;
    record.revision += 1;
}

#[derive(Debug)]
pub struct Applied<'a> {
    pub record: &'a FileRecord,
    pub is_new_file: bool,
}

/// Authoritative in-memory map of every file seen during the session.
#[derive(Debug, Default)]
pub struct FileStore {
    records: HashMap<String, FileRecord>,
    order: Vec<String>,
    seq: u64,
    latest: Option<String>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: FileChangeEvent) -> Applied<'_> {
        let path = event.filepath.clone();
        let is_new_file = !self.records.contains_key(&path);
        if is_new_file {
            self.order.push(path.clone());
        }
        self.seq += 1;
        let seq = self.seq;
        self.latest = Some(path.clone());
        let record = self
            .records
            .entry(path)
            .or_insert_with_key(|path| FileRecord::new(path));
        merge_event(record, event);
        record.updated_seq = seq;
        Applied {
            record,
            is_new_file,
        }
    }

    pub fn get(&self, filepath: &str) -> Option<&FileRecord> {
        self.records.get(filepath)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in first-seen order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.order.iter().filter_map(|path| self.records.get(path))
    }

    pub fn latest(&self) -> Option<&FileRecord> {
        self.latest.as_deref().and_then(|path| self.records.get(path))
    }

    pub fn build_tree(&self, separator: char) -> FileTree {
        let mut tree = FileTree::default();
        for record in self.records() {
            let parts: Vec<&str> = record
                .filepath
                .split(separator)
                .filter(|part| !part.is_empty())
                .collect();
            let Some((name, folders)) = parts.split_last() else {
                continue;
            };
            let mut current = &mut tree;
            for folder in folders {
                current = current.folders.entry((*folder).to_string()).or_default();
            }
            current.files.push(TreeFile {
                name: (*name).to_string(),
                filepath: record.filepath.clone(),
            });
        }
        tree
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    pub name: String,
    pub filepath: String,
}

/// Folder/file hierarchy used by the sidebar. Folders sort by name, files keep
/// first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    pub folders: BTreeMap<String, FileTree>,
    pub files: Vec<TreeFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeRowKind {
    Folder,
    File { filepath: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub depth: usize,
    pub label: String,
    pub kind: TreeRowKind,
}

impl FileTree {
    pub fn file_count(&self) -> usize {
        self.files.len()
            + self
                .folders
                .values()
                .map(FileTree::file_count)
                .sum::<usize>()
    }

    /// Depth-first flattening, folders before files at each level.
    pub fn rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        self.push_rows(0, &mut rows);
        rows
    }

    fn push_rows(&self, depth: usize, rows: &mut Vec<TreeRow>) {
        for (name, folder) in &self.folders {
            rows.push(TreeRow {
                depth,
                label: name.clone(),
                kind: TreeRowKind::Folder,
            });
            folder.push_rows(depth + 1, rows);
        }
        for file in &self.files {
            rows.push(TreeRow {
                depth,
                label: file.name.clone(),
                kind: TreeRowKind::File {
                    filepath: file.filepath.clone(),
                },
            });
        }
    }
}
