use codestream_core::{language_for_extension, unified_diff, FileChangeEvent};
use std::collections::BTreeMap;

pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Last known content of every streamed file, keyed by relative path.
#[derive(Debug, Clone)]
pub struct FileTracker {
    files: BTreeMap<String, String>,
    context_lines: usize,
}

impl Default for FileTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LINES)
    }
}

impl FileTracker {
    pub fn new(context_lines: usize) -> Self {
        Self {
            files: BTreeMap::new(),
            context_lines,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, rel_path: &str) -> Option<&str> {
        self.files.get(rel_path).map(String::as_str)
    }

    /// Records content found by the initial scan without producing an event.
    pub fn seed(&mut self, rel_path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(rel_path.into(), content.into());
    }

    /// Stores the new content and returns the change event, or `None` when the
    /// content did not change. Unknown files diff against empty content.
    pub fn observe(&mut self, rel_path: &str, content: String) -> Option<FileChangeEvent> {
        let previous = self.files.get(rel_path).map(String::as_str).unwrap_or("");
        if self.files.contains_key(rel_path) && previous == content {
            return None;
        }
        let diff = unified_diff(
            previous,
            &content,
            &format!("a/{rel_path}"),
            &format!("b/{rel_path}"),
            self.context_lines,
        );
        let event = with_language(FileChangeEvent::new(rel_path, content.clone()))
            .with_previous(previous)
            .with_diff(diff);
        self.files.insert(rel_path.to_string(), content);
        Some(event)
    }

    pub fn forget(&mut self, rel_path: &str) -> bool {
        self.files.remove(rel_path).is_some()
    }

    /// One snapshot-reset event per known file, in path order.
    pub fn snapshot(&self) -> Vec<FileChangeEvent> {
        self.files
            .iter()
            .map(|(path, content)| {
                with_language(FileChangeEvent::new(path.as_str(), content.as_str())).as_snapshot_reset()
            })
            .collect()
    }
}

fn with_language(event: FileChangeEvent) -> FileChangeEvent {
    match language_for_extension(&event.extension) {
        Some(language) => event.with_language(language),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codestream_core::{count_diff_lines, MessageKind};

    #[test]
    fn new_file_diffs_against_empty_content() {
        let mut tracker = FileTracker::default();
        let event = tracker
            .observe("src/lib.rs", "pub fn a() {}\n".to_string())
            .expect("event");
        assert_eq!(event.previous_code.as_deref(), Some(""));
        assert_eq!(event.language.as_deref(), Some("rust"));
        let counts = count_diff_lines(event.diff.as_deref().unwrap_or_default());
        assert_eq!((counts.additions, counts.deletions), (1, 0));
        assert_eq!(tracker.get("src/lib.rs"), Some("pub fn a() {}\n"));
    }

    #[test]
    fn unchanged_content_is_not_reported() {
        let mut tracker = FileTracker::default();
        tracker.seed("a.py", "x = 1\n");
        assert!(tracker.observe("a.py", "x = 1\n".to_string()).is_none());
        let event = tracker.observe("a.py", "x = 2\n".to_string()).expect("event");
        assert_eq!(event.previous_code.as_deref(), Some("x = 1\n"));
        let diff = event.diff.expect("diff");
        assert!(diff.starts_with("--- a/a.py\n+++ b/a.py\n"));
        assert!(diff.contains("-x = 1\n+x = 2\n"));
    }

    #[test]
    fn empty_new_file_is_still_reported_once() {
        let mut tracker = FileTracker::default();
        assert!(tracker.observe("empty.txt", String::new()).is_some());
        assert!(tracker.observe("empty.txt", String::new()).is_none());
    }

    #[test]
    fn snapshot_lists_every_file_as_a_reset() {
        let mut tracker = FileTracker::default();
        tracker.seed("z.go", "package z");
        tracker.seed("a/b.unknown", "data");
        let events = tracker.snapshot();
        let paths: Vec<_> = events.iter().map(|event| event.filepath.as_str()).collect();
        assert_eq!(paths, vec!["a/b.unknown", "z.go"]);
        assert!(events.iter().all(|event| event.kind == MessageKind::Snapshot));
        assert_eq!(events[0].language, None);
        assert_eq!(events[1].language.as_deref(), Some("go"));
        assert!(tracker.forget("z.go"));
        assert_eq!(tracker.len(), 1);
    }
}
