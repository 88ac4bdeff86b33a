//! The boundary the presentation talks to.
//!
//! A [`Session`] owns the decoder, the file store, the reveal scheduler and the
//! view state, and runs them in order for every inbound payload. It is driven
//! from a single task so events for one file are never reordered.

use crate::clock::{Clock, SystemClock};
use crate::connection::ConnectionStatus;
use crate::event::{DecodeError, EventDecoder, FileChangeEvent, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::language::DEFAULT_LANGUAGE;
use crate::patch::{apply_unified, reverse_unified};
use crate::reveal::{RevealConfig, RevealScheduler, RevealState, RevealTarget, RevealTick, StartOutcome};
use crate::store::{EventShape, FileRecord, FileStore, FileTree, DEFAULT_TREE_SEPARATOR};
use crate::view::{Retarget, ViewState};
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 50;
const RAW_PREVIEW_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub reveal: RevealConfig,
    pub max_payload_bytes: usize,
    pub tree_separator: char,
    pub error_log_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reveal: RevealConfig::default(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            tree_separator: DEFAULT_TREE_SEPARATOR,
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Decode,
    Transport,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSource::Decode => f.write_str("decode"),
            ErrorSource::Transport => f.write_str("transport"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub source: ErrorSource,
    pub message: String,
    /// Start of the offending payload, for decode errors.
    pub raw_preview: Option<String>,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.source, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSummary {
    pub filepath: String,
    pub is_new_file: bool,
    pub revision: u64,
    pub retarget: Retarget,
    pub reveal: Option<StartOutcome>,
}

/// Everything the presentation needs to draw the active file.
#[derive(Debug)]
pub struct ActiveView<'a> {
    pub record: &'a FileRecord,
    pub reveal: Option<&'a RevealState>,
    pub language: String,
    pub pinned: bool,
}

pub struct Session<C: Clock = SystemClock> {
    config: SessionConfig,
    decoder: EventDecoder,
    store: FileStore,
    reveal: RevealScheduler<C>,
    view: ViewState,
    status: ConnectionStatus,
    errors: VecDeque<SessionError>,
}

impl Session<SystemClock> {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Session<C> {
    pub fn with_clock(config: SessionConfig, clock: C) -> Self {
        Self {
            decoder: EventDecoder::new(config.max_payload_bytes),
            store: FileStore::new(),
            reveal: RevealScheduler::with_clock(config.reveal, clock),
            view: ViewState::new(),
            status: ConnectionStatus::Idle,
            errors: VecDeque::with_capacity(config.error_log_capacity.min(256)),
            config,
        }
    }

    /// Decodes one text frame and applies it. Decode failures are logged and
    /// recorded, and the session keeps going.
    pub fn ingest_raw(&mut self, raw: &str) -> Result<EventSummary, DecodeError> {
        match self.decoder.decode(raw) {
            Ok(event) => Ok(self.apply_event(event)),
            Err(err) => {
                self.record_decode_error(&err);
                Err(err)
            }
        }
    }

    /// Binary frames are accepted when they hold UTF-8 JSON.
    pub fn ingest_bytes(&mut self, raw: &[u8]) -> Result<EventSummary, DecodeError> {
        match self.decoder.decode_bytes(raw) {
            Ok(event) => Ok(self.apply_event(event)),
            Err(err) => {
                self.record_decode_error(&err);
                Err(err)
            }
        }
    }

    pub fn apply_event(&mut self, event: FileChangeEvent) -> EventSummary {
        let kind = event.kind;
        let applied = self.store.apply(event);
        let filepath = applied.record.filepath.clone();
        let is_new_file = applied.is_new_file;
        let revision = applied.record.revision;
        let counts = applied.record.diff_counts();

        let retarget = self.view.on_event(&filepath);
        let reveal = match retarget {
            Retarget::Switch | Retarget::Refresh => self.start_reveal(&filepath),
            Retarget::Unaffected => None,
        };
        info!(
            event = "file_event_applied",
            filepath = %filepath,
            kind = %kind,
            revision,
            is_new_file,
            additions = counts.additions,
            deletions = counts.deletions,
            retarget = ?retarget
        );
        EventSummary {
            filepath,
            is_new_file,
            revision,
            retarget,
            reveal,
        }
    }

    /// Advances every due reveal continuation.
    pub fn reveal_tick(&mut self) -> Vec<RevealTick> {
        self.reveal.run_due()
    }

    pub fn next_reveal_deadline(&mut self) -> Option<Instant> {
        self.reveal.next_deadline()
    }

    pub fn revealed(&self, filepath: &str) -> Option<&RevealState> {
        self.reveal.state(filepath)
    }

    /// Skips to the end of the active file's reveal.
    pub fn finish_active_reveal(&mut self) -> bool {
        match self.view.active_path().map(str::to_string) {
            Some(path) => self.reveal.finish(&path),
            None => false,
        }
    }

    /// Pins `path` (or unpins, see [`ViewState::select`]) and starts a reveal
    /// for whatever file becomes active.
    pub fn select(&mut self, path: Option<&str>) -> bool {
        let changed = self.view.select(path);
        debug!(
            event = "selection_changed",
            selected = ?self.view.selected(),
            active = ?self.view.active_path(),
            changed
        );
        if changed {
            if let Some(active) = self.view.active_path().map(str::to_string) {
                self.start_reveal(&active);
            }
        }
        changed
    }

    pub fn file_tree(&self) -> FileTree {
        self.store.build_tree(self.config.tree_separator)
    }

    pub fn selected_or_latest(&self) -> Option<&FileRecord> {
        self.view.active_path().and_then(|path| self.store.get(path))
    }

    pub fn active_view(&self) -> Option<ActiveView<'_>> {
        let record = self.selected_or_latest()?;
        Some(ActiveView {
            record,
            reveal: self.reveal.state(&record.filepath),
            language: display_language(record),
            pinned: self.view.is_pinned(),
        })
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn set_connection_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            debug!(event = "connection_status", from = %self.status.label(), to = %status);
            self.status = status;
        }
    }

    pub fn record_transport_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(event = "transport_error", error = %message);
        self.push_error(SessionError {
            source: ErrorSource::Transport,
            message,
            raw_preview: None,
        });
    }

    /// Most recent errors, oldest first.
    pub fn recent_errors(&self) -> impl DoubleEndedIterator<Item = &SessionError> {
        self.errors.iter()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.errors.back()
    }

    fn record_decode_error(&mut self, err: &DecodeError) {
        let preview = err.raw_preview(RAW_PREVIEW_CHARS);
        warn!(event = "decode_error", error = %err, raw = %preview);
        self.push_error(SessionError {
            source: ErrorSource::Decode,
            message: err.to_string(),
            raw_preview: Some(preview),
        });
    }

    fn push_error(&mut self, error: SessionError) {
        if self.config.error_log_capacity == 0 {
            return;
        }
        while self.errors.len() >= self.config.error_log_capacity {
            self.errors.pop_front();
        }
        self.errors.push_back(error);
    }

    fn start_reveal(&mut self, filepath: &str) -> Option<StartOutcome> {
        let target = reveal_target(self.store.get(filepath)?);
        Some(self.reveal.start(filepath, target))
    }
}

/// Language for highlighting, falling back to plain text.
pub fn display_language(record: &FileRecord) -> String {
    record.resolved_language().unwrap_or_else(|err| {
        debug!(event = "language_fallback", filepath = %record.filepath, reason = %err);
        DEFAULT_LANGUAGE.to_string()
    })
}

/// Builds the reveal target for a record. `current_code` is always the end
/// state; the base of a delta is `previous_code`, or the diff reverse-applied
/// to `current_code` when no previous content was sent. Only fields carried by
/// the latest event count; values kept from older events describe older
/// transitions.
pub fn reveal_target(record: &FileRecord) -> RevealTarget {
    if record.last_shape == EventShape::Snapshot {
        return RevealTarget::snapshot(&record.current_code);
    }
    let previous = record
        .previous_code
        .as_deref()
        .filter(|_| record.previous_is_fresh);
    let diff = record
        .diff
        .as_deref()
        .filter(|diff| record.diff_is_fresh && !diff.trim().is_empty());
    match (previous, diff) {
        (Some(previous), diff) => {
            if let Some(diff) = diff {
                check_diff(record, previous, diff);
            }
            RevealTarget::delta(previous, &record.current_code)
        }
        (None, Some(diff)) => match reverse_unified(&record.current_code, diff) {
            Ok(base) => RevealTarget::delta(&base, &record.current_code),
            Err(err) => {
                debug!(event = "delta_base_unavailable", filepath = %record.filepath, reason = %err);
                RevealTarget::snapshot(&record.current_code)
            }
        },
        (None, None) => RevealTarget::snapshot(&record.current_code),
    }
}

fn check_diff(record: &FileRecord, previous: &str, diff: &str) {
    let agrees = match apply_unified(previous, diff) {
        Ok(patched) => patched.trim_end() == record.current_code.trim_end(),
        Err(_) => false,
    };
    if !agrees {
        warn!(event = "diff_mismatch", filepath = %record.filepath, revision = record.revision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::text_diff::unified_diff;

    fn session() -> Session<ManualClock> {
        Session::with_clock(SessionConfig::default(), ManualClock::new())
    }

    #[test]
    fn delta_base_is_recovered_from_diff_alone() {
        let old = "a\nb\nc\n";
        let new = "a\nB\nc\n";
        let diff = unified_diff(old, new, "a/f", "b/f", 3);
        let mut session = session();
        session.apply_event(FileChangeEvent::new("f.txt", new).with_diff(diff));
        let record = session.selected_or_latest().expect("record");
        assert_eq!(reveal_target(record), RevealTarget::delta(old, new));
    }

    #[test]
    fn unusable_diff_falls_back_to_snapshot() {
        let mut session = session();
        session.apply_event(FileChangeEvent::new("f.txt", "x\n").with_diff("+not a hunk\n"));
        let record = session.selected_or_latest().expect("record");
        assert_eq!(reveal_target(record), RevealTarget::snapshot("x\n"));
    }

    #[test]
    fn mismatching_previous_still_targets_current() {
        let mut session = session();
        session.apply_event(
            FileChangeEvent::new("f.txt", "final\n")
                .with_previous("before\n")
                .with_diff("@@ -1 +1 @@\n-other\n+thing\n"),
        );
        let record = session.selected_or_latest().expect("record");
        assert_eq!(reveal_target(record).final_content(), "final\n");
    }

    #[test]
    fn delta_base_ignores_fields_kept_from_older_events() {
        let mut session = session();
        session.apply_event(
            FileChangeEvent::new("f.txt", "one\n")
                .with_previous("")
                .with_diff(unified_diff("", "one\n", "a/f.txt", "b/f.txt", 3)),
        );
        session.apply_event(
            FileChangeEvent::new("f.txt", "two\n")
                .with_diff(unified_diff("one\n", "two\n", "a/f.txt", "b/f.txt", 3)),
        );
        let record = session.selected_or_latest().expect("record");
        assert_eq!(record.previous_code.as_deref(), Some(""));
        assert_eq!(reveal_target(record), RevealTarget::delta("one\n", "two\n"));
        let state = session.revealed("f.txt").expect("reveal");
        assert_eq!(state.target(), &RevealTarget::delta("one\n", "two\n"));

        session.apply_event(FileChangeEvent::new("f.txt", "three\n").with_previous("two\n"));
        let record = session.selected_or_latest().expect("record");
        assert!(record.diff.is_some());
        assert_eq!(reveal_target(record), RevealTarget::delta("two\n", "three\n"));
    }

    #[test]
    fn error_log_is_bounded() {
        let config = SessionConfig {
            error_log_capacity: 3,
            ..SessionConfig::default()
        };
        let mut session = Session::with_clock(config, ManualClock::new());
        for n in 0..5 {
            assert!(session.ingest_raw(&format!("garbage {n}")).is_err());
        }
        let previews: Vec<_> = session
            .recent_errors()
            .filter_map(|err| err.raw_preview.clone())
            .collect();
        assert_eq!(previews, vec!["garbage 2", "garbage 3", "garbage 4"]);
    }

    #[test]
    fn unknown_extension_renders_as_text() {
        let mut session = session();
        session.apply_event(FileChangeEvent::new("build/Makefile", "all:\n"));
        let view = session.active_view().expect("view");
        assert_eq!(view.language, DEFAULT_LANGUAGE);
        assert!(!view.pinned);
    }
}
