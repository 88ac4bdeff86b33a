//! Paced, incremental disclosure of file content.
//!
//! Each revealed file owns one [`RevealState`]. Starting a new target replaces
//! the state and bumps its generation; continuations still queued for the old
//! generation are dropped when they come due instead of being cancelled.

use crate::clock::{Clock, SystemClock};
use crate::text_diff::{diff_blocks, DiffSpan, SpanKind};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_CADENCE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevealUnit {
    #[default]
    Line,
    /// One grapheme cluster at a time.
    Char,
    DiffBlock,
}

impl RevealUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevealUnit::Line => "line",
            RevealUnit::Char => "char",
            RevealUnit::DiffBlock => "diff-block",
        }
    }
}

impl fmt::Display for RevealUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevealUnit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "line" | "lines" => Ok(RevealUnit::Line),
            "char" | "chars" | "character" => Ok(RevealUnit::Char),
            "diff-block" | "diff_block" | "block" => Ok(RevealUnit::DiffBlock),
            other => Err(format!("unknown reveal unit `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealConfig {
    pub cadence: Duration,
    /// Unit used for snapshot targets. Deltas always reveal by diff block.
    pub snapshot_unit: RevealUnit,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            cadence: DEFAULT_CADENCE,
            snapshot_unit: RevealUnit::Line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealTarget {
    Snapshot { content: String },
    Delta { previous: String, current: String },
}

impl RevealTarget {
    pub fn snapshot(content: &str) -> Self {
        RevealTarget::Snapshot {
            content: content.to_string(),
        }
    }

    pub fn delta(previous: &str, current: &str) -> Self {
        RevealTarget::Delta {
            previous: previous.to_string(),
            current: current.to_string(),
        }
    }

    /// Content shown once the reveal completes.
    pub fn final_content(&self) -> &str {
        match self {
            RevealTarget::Snapshot { content } => content,
            RevealTarget::Delta { current, .. } => current,
        }
    }

    /// Equal once trailing whitespace is ignored on every side.
    pub fn same_content(&self, other: &RevealTarget) -> bool {
        match (self, other) {
            (RevealTarget::Snapshot { content: a }, RevealTarget::Snapshot { content: b }) => {
                a.trim_end() == b.trim_end()
            }
            (
                RevealTarget::Delta { previous: pa, current: ca },
                RevealTarget::Delta { previous: pb, current: cb },
            ) => pa.trim_end() == pb.trim_end() && ca.trim_end() == cb.trim_end(),
            _ => false,
        }
    }

    fn pieces(&self, snapshot_unit: RevealUnit) -> (RevealUnit, Vec<DiffSpan>) {
        let (unit, pieces) = match self {
            RevealTarget::Snapshot { content } => match snapshot_unit {
                RevealUnit::Char => (
                    RevealUnit::Char,
                    content
                        .graphemes(true)
                        .map(|g| DiffSpan::new(SpanKind::Equal, g))
                        .collect(),
                ),
                // a snapshot has nothing to diff against
                RevealUnit::Line | RevealUnit::DiffBlock => (RevealUnit::Line, line_pieces(content)),
            },
            RevealTarget::Delta { previous, current } => {
                (RevealUnit::DiffBlock, diff_blocks(previous, current))
            }
        };
        if pieces.is_empty() {
            return (unit, vec![DiffSpan::new(SpanKind::Equal, "")]);
        }
        (unit, pieces)
    }
}

/// `"a\nb"` becomes `["a", "\nb"]` so every prefix of pieces is a prefix of the
/// content without a dangling newline. A final newline rides on the last line.
fn line_pieces(content: &str) -> Vec<DiffSpan> {
    let body = content.strip_suffix('\n').unwrap_or(content);
    let mut pieces: Vec<DiffSpan> = body
        .split('\n')
        .enumerate()
        .map(|(idx, line)| {
            if idx == 0 {
                DiffSpan::new(SpanKind::Equal, line)
            } else {
                DiffSpan::new(SpanKind::Equal, format!("\n{line}"))
            }
        })
        .collect();
    if body.len() < content.len() {
        if let Some(last) = pieces.last_mut() {
            last.text.push('\n');
        }
    }
    pieces
}

#[derive(Debug, Clone)]
pub struct RevealState {
    filepath: String,
    target: RevealTarget,
    unit: RevealUnit,
    pieces: Vec<DiffSpan>,
    revealed_prefix: String,
    cursor: usize,
    generation: u64,
    next_due: Option<Instant>,
    complete: bool,
}

impl RevealState {
    fn new(filepath: &str, target: RevealTarget, config: &RevealConfig, generation: u64) -> Self {
        let (unit, pieces) = target.pieces(config.snapshot_unit);
        let mut state = Self {
            filepath: filepath.to_string(),
            target,
            unit,
            pieces,
            revealed_prefix: String::new(),
            cursor: 0,
            generation,
            next_due: None,
            complete: false,
        };
        state.advance();
        state
    }

    fn advance(&mut self) {
        if let Some(piece) = self.pieces.get(self.cursor) {
            if piece.kind != SpanKind::Delete {
                self.revealed_prefix.push_str(&piece.text);
            }
            self.cursor += 1;
        }
        self.complete = self.cursor >= self.pieces.len();
        if self.complete {
            self.next_due = None;
        }
    }

    pub fn filepath(&self) -> &str {
        &self.filepath
    }

    pub fn target(&self) -> &RevealTarget {
        &self.target
    }

    pub fn unit(&self) -> RevealUnit {
        self.unit
    }

    /// New-side text revealed so far. Deleted blocks are not part of it.
    pub fn revealed_prefix(&self) -> &str {
        &self.revealed_prefix
    }

    /// Revealed pieces including deletions, for diff-aware rendering.
    pub fn revealed_blocks(&self) -> &[DiffSpan] {
        &self.pieces[..self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total_units(&self) -> usize {
        self.pieces.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { generation: u64 },
    /// The requested target matches the current one; nothing restarted.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealTick {
    pub filepath: String,
    pub generation: u64,
    pub cursor: usize,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Continuation {
    due: Instant,
    order: u64,
    filepath: String,
    generation: u64,
}

pub struct RevealScheduler<C: Clock = SystemClock> {
    clock: C,
    config: RevealConfig,
    states: HashMap<String, RevealState>,
    queue: BinaryHeap<Reverse<Continuation>>,
    next_generation: u64,
    next_order: u64,
    stale_dropped: u64,
}

impl RevealScheduler<SystemClock> {
    pub fn new(config: RevealConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RevealScheduler<C> {
    pub fn with_clock(config: RevealConfig, clock: C) -> Self {
        Self {
            clock,
            config,
            states: HashMap::new(),
            queue: BinaryHeap::new(),
            next_generation: 0,
            next_order: 0,
            stale_dropped: 0,
        }
    }

    pub fn config(&self) -> &RevealConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Reveals the first unit of `target` now and queues the rest. A target
    /// equal to the current one (ignoring trailing whitespace) is left alone.
    pub fn start(&mut self, filepath: &str, target: RevealTarget) -> StartOutcome {
        if let Some(existing) = self.states.get(filepath) {
            if existing.target.same_content(&target) {
                return StartOutcome::Unchanged;
            }
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let mut state = RevealState::new(filepath, target, &self.config, generation);
        if !state.complete {
            let due = self.clock.now() + self.config.cadence;
            state.next_due = Some(due);
            self.schedule(filepath, generation, due);
        }
        tracing::trace!(
            event = "reveal_started",
            filepath = %filepath,
            generation,
            unit = %state.unit,
            units = state.pieces.len()
        );
        self.states.insert(filepath.to_string(), state);
        StartOutcome::Started { generation }
    }

    /// Drops the reveal for `filepath`; queued continuations become stale.
    pub fn cancel(&mut self, filepath: &str) -> bool {
        self.states.remove(filepath).is_some()
    }

    /// Jumps straight to the end of the current reveal.
    pub fn finish(&mut self, filepath: &str) -> bool {
        let Some(state) = self.states.get_mut(filepath) else {
            return false;
        };
        while !state.complete {
            state.advance();
        }
        true
    }

    /// Fires every continuation that is due, each at most once. Follow-up
    /// continuations are queued after the sweep so a zero cadence still
    /// reveals a single unit per call.
    pub fn run_due(&mut self) -> Vec<RevealTick> {
        let now = self.clock.now();
        let mut ticks = Vec::new();
        let mut follow_ups = Vec::new();
        while self.queue.peek().is_some_and(|Reverse(next)| next.due <= now) {
            let Some(Reverse(continuation)) = self.queue.pop() else {
                break;
            };
            match self.states.get_mut(&continuation.filepath) {
                Some(state) if state.generation == continuation.generation && !state.complete => {
                    state.advance();
                    ticks.push(RevealTick {
                        filepath: continuation.filepath.clone(),
                        generation: continuation.generation,
                        cursor: state.cursor,
                        complete: state.complete,
                    });
                    if !state.complete {
                        let due = now + self.config.cadence;
                        state.next_due = Some(due);
                        follow_ups.push((continuation.filepath, continuation.generation, due));
                    }
                }
                _ => self.stale_dropped += 1,
            }
        }
        for (filepath, generation, due) in follow_ups {
            self.schedule(&filepath, generation, due);
        }
        ticks
    }

    /// Earliest instant at which [`run_due`](Self::run_due) has work to do.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse(next)) = self.queue.peek() {
            if self.is_live(next) {
                return Some(next.due);
            }
            self.queue.pop();
            self.stale_dropped += 1;
        }
        None
    }

    pub fn state(&self, filepath: &str) -> Option<&RevealState> {
        self.states.get(filepath)
    }

    /// Continuations discarded because their reveal was superseded or cancelled.
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    fn is_live(&self, continuation: &Continuation) -> bool {
        self.states
            .get(&continuation.filepath)
            .is_some_and(|state| state.generation == continuation.generation && !state.complete)
    }

    fn schedule(&mut self, filepath: &str, generation: u64, due: Instant) {
        self.next_order += 1;
        self.queue.push(Reverse(Continuation {
            due,
            order: self.next_order,
            filepath: filepath.to_string(),
            generation,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn scheduler(unit: RevealUnit) -> (RevealScheduler<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let config = RevealConfig {
            cadence: Duration::from_millis(10),
            snapshot_unit: unit,
        };
        (RevealScheduler::with_clock(config, clock.clone()), clock)
    }

    fn drain(scheduler: &mut RevealScheduler<ManualClock>, clock: &ManualClock, path: &str) -> Vec<String> {
        let mut seen = vec![scheduler.state(path).map(|s| s.revealed_prefix().to_string()).unwrap_or_default()];
        for _ in 0..1000 {
            if scheduler.state(path).map_or(true, RevealState::is_complete) {
                break;
            }
            clock.advance(scheduler.config().cadence);
            scheduler.run_due();
            if let Some(state) = scheduler.state(path) {
                seen.push(state.revealed_prefix().to_string());
            }
        }
        seen
    }

    #[test]
    fn line_reveal_yields_growing_prefixes() {
        let (mut scheduler, clock) = scheduler(RevealUnit::Line);
        scheduler.start("f", RevealTarget::snapshot("a\nb\nc"));
        assert_eq!(drain(&mut scheduler, &clock, "f"), vec!["a", "a\nb", "a\nb\nc"]);
        assert!(scheduler.state("f").is_some_and(RevealState::is_complete));
    }

    #[test]
    fn nothing_is_revealed_before_cadence_elapses() {
        let (mut scheduler, clock) = scheduler(RevealUnit::Line);
        scheduler.start("f", RevealTarget::snapshot("a\nb"));
        clock.advance(Duration::from_millis(9));
        assert!(scheduler.run_due().is_empty());
        clock.advance(Duration::from_millis(1));
        let ticks = scheduler.run_due();
        assert_eq!(ticks.len(), 1);
        assert!(ticks[0].complete);
    }

    #[test]
    fn one_unit_per_due_continuation_even_after_long_pause() {
        let (mut scheduler, clock) = scheduler(RevealUnit::Line);
        scheduler.start("f", RevealTarget::snapshot("1\n2\n3\n4"));
        clock.advance(Duration::from_secs(5));
        scheduler.run_due();
        assert_eq!(scheduler.state("f").map(RevealState::cursor), Some(2));
    }

    #[test]
    fn new_target_supersedes_running_reveal() {
        let (mut scheduler, clock) = scheduler(RevealUnit::Line);
        let first = scheduler.start("f", RevealTarget::snapshot("a\nb\nc"));
        clock.advance(Duration::from_millis(10));
        scheduler.run_due();
        assert_eq!(scheduler.state("f").map(RevealState::revealed_prefix), Some("a\nb"));

        let second = scheduler.start("f", RevealTarget::snapshot("x\ny"));
        assert_ne!(first, second);
        let seen = drain(&mut scheduler, &clock, "f");
        assert_eq!(seen, vec!["x", "x\ny"]);
        assert!(seen.iter().all(|prefix| !prefix.contains('c')));
        assert!(scheduler.stale_dropped() >= 1 || scheduler.next_deadline().is_none());
    }

    #[test]
    fn trailing_whitespace_changes_do_not_restart() {
        let (mut scheduler, clock) = scheduler(RevealUnit::Line);
        scheduler.start("f", RevealTarget::snapshot("a\nb"));
        clock.advance(Duration::from_millis(10));
        scheduler.run_due();
        assert_eq!(
            scheduler.start("f", RevealTarget::snapshot("a\nb\n\n  ")),
            StartOutcome::Unchanged
        );
        assert!(matches!(
            scheduler.start("f", RevealTarget::snapshot("a\nb\nc")),
            StartOutcome::Started { .. }
        ));
    }

    #[test]
    fn single_unit_target_completes_immediately() {
        let (mut scheduler, _clock) = scheduler(RevealUnit::Line);
        scheduler.start("f", RevealTarget::snapshot("only line\n"));
        let state = scheduler.state("f").expect("state");
        assert!(state.is_complete());
        assert_eq!(state.revealed_prefix(), "only line\n");
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn completed_reveal_keeps_trailing_newlines() {
        let (mut scheduler, clock) = scheduler(RevealUnit::Line);
        scheduler.start("f", RevealTarget::snapshot("a\nb\n"));
        assert_eq!(drain(&mut scheduler, &clock, "f"), vec!["a", "a\nb\n"]);

        scheduler.start("g", RevealTarget::snapshot("x\n\n"));
        let seen = drain(&mut scheduler, &clock, "g");
        assert_eq!(seen.last().map(String::as_str), Some("x\n\n"));
        assert_eq!(
            scheduler.state("g").map(|state| state.target().final_content()),
            Some("x\n\n")
        );
    }

    #[test]
    fn char_mode_reveals_grapheme_clusters() {
        let (mut scheduler, clock) = scheduler(RevealUnit::Char);
        scheduler.start("f", RevealTarget::snapshot("e\u{301}x"));
        let seen = drain(&mut scheduler, &clock, "f");
        assert_eq!(seen, vec!["e\u{301}", "e\u{301}x"]);
    }

    #[test]
    fn delta_reveal_ends_on_current_content() {
        let (mut scheduler, clock) = scheduler(RevealUnit::Line);
        scheduler.start(
            "f",
            RevealTarget::delta("fn a() {}\nfn b() {}\n", "fn a() {}\nfn c() {}\nfn d() {}\n"),
        );
        assert_eq!(scheduler.state("f").map(RevealState::unit), Some(RevealUnit::DiffBlock));
        let seen = drain(&mut scheduler, &clock, "f");
        assert_eq!(seen.last().map(String::as_str), Some("fn a() {}\nfn c() {}\nfn d() {}\n"));
        let state = scheduler.state("f").expect("state");
        assert!(state
            .revealed_blocks()
            .iter()
            .any(|block| block.kind == SpanKind::Delete));
    }

    #[test]
    fn cancelled_reveal_leaves_only_stale_continuations() {
        let (mut scheduler, clock) = scheduler(RevealUnit::Line);
        scheduler.start("f", RevealTarget::snapshot("a\nb\nc"));
        assert!(scheduler.cancel("f"));
        assert_eq!(scheduler.next_deadline(), None);
        clock.advance(Duration::from_millis(50));
        assert!(scheduler.run_due().is_empty());
    }

    #[test]
    fn finish_reveals_remaining_units() {
        let (mut scheduler, _clock) = scheduler(RevealUnit::Line);
        scheduler.start("f", RevealTarget::snapshot("a\nb\nc"));
        assert!(scheduler.finish("f"));
        assert_eq!(scheduler.state("f").map(RevealState::revealed_prefix), Some("a\nb\nc"));
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn reveal_unit_parses_cli_spellings() {
        assert_eq!("Char".parse::<RevealUnit>(), Ok(RevealUnit::Char));
        assert_eq!("diff-block".parse::<RevealUnit>(), Ok(RevealUnit::DiffBlock));
        assert!("word".parse::<RevealUnit>().is_err());
    }
}
