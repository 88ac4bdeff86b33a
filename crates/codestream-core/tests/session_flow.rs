use codestream_core::{
    count_diff_lines, encode_event, unified_diff, CloseDecision, ConnectionStatus, FileChangeEvent,
    ManualClock, ReconnectTracker, Retarget, RevealConfig, RevealUnit, Session, SessionConfig,
    DEFAULT_MAX_PAYLOAD_BYTES,
};
use std::time::Duration;

fn session_with_cadence(cadence_ms: u64) -> (Session<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let config = SessionConfig {
        reveal: RevealConfig {
            cadence: Duration::from_millis(cadence_ms),
            snapshot_unit: RevealUnit::Line,
        },
        ..SessionConfig::default()
    };
    (Session::with_clock(config, clock.clone()), clock)
}

fn frame(filepath: &str, current_code: &str) -> String {
    encode_event(&FileChangeEvent::new(filepath, current_code), DEFAULT_MAX_PAYLOAD_BYTES)
        .expect("encode")
}

fn prefixes_until_complete(session: &mut Session<ManualClock>, clock: &ManualClock, path: &str, cadence_ms: u64) -> Vec<String> {
    let mut seen = Vec::new();
    for _ in 0..100 {
        let state = session.revealed(path).expect("reveal state");
        if seen.last().map(String::as_str) != Some(state.revealed_prefix()) {
            seen.push(state.revealed_prefix().to_string());
        }
        if state.is_complete() {
            break;
        }
        clock.advance(Duration::from_millis(cadence_ms));
        session.reveal_tick();
    }
    seen
}

#[test]
fn last_write_wins_per_path_with_one_record_each() {
    let (mut session, _clock) = session_with_cadence(10);
    let events = [
        ("src/a.rs", "a1"),
        ("src/b.rs", "b1"),
        ("src/a.rs", "a2"),
        ("lib/c.py", "c1"),
        ("src/b.rs", "b2"),
        ("src/a.rs", "a3"),
    ];
    for (path, code) in events {
        session.ingest_raw(&frame(path, code)).expect("ingest");
    }
    let store = session.store();
    assert_eq!(store.len(), 3);
    assert_eq!(store.get("src/a.rs").map(|r| r.current_code.as_str()), Some("a3"));
    assert_eq!(store.get("src/b.rs").map(|r| r.current_code.as_str()), Some("b2"));
    assert_eq!(store.get("lib/c.py").map(|r| r.current_code.as_str()), Some("c1"));
    assert_eq!(store.get("src/a.rs").map(|r| r.revision), Some(3));
    assert_eq!(session.file_tree().file_count(), 3);
}

#[test]
fn snapshot_for_one_path_leaves_other_paths_alone() {
    let (mut session, _clock) = session_with_cadence(10);
    let diff = unified_diff("x = 1\n", "x = 2\n", "a/a.py", "b/a.py", 3);
    session.apply_event(
        FileChangeEvent::new("a.py", "x = 2\n")
            .with_previous("x = 1\n")
            .with_diff(diff.clone()),
    );
    session.apply_event(
        FileChangeEvent::new("b.py", "y = 1\n")
            .with_diff(unified_diff("", "y = 1\n", "a/b.py", "b/b.py", 3)),
    );

    session.ingest_raw(&frame("b.py", "y = 2\n")).expect("ingest");

    let a = session.store().get("a.py").expect("a.py");
    assert_eq!(a.diff.as_deref(), Some(diff.as_str()));
    assert_eq!(a.previous_code.as_deref(), Some("x = 1\n"));
    assert_eq!(a.current_code, "x = 2\n");
    let b = session.store().get("b.py").expect("b.py");
    assert_eq!(b.current_code, "y = 2\n");
}

#[test]
fn reveal_prefixes_follow_lines_at_any_cadence() {
    for cadence in [1, 10, 250] {
        let (mut session, clock) = session_with_cadence(cadence);
        session.ingest_raw(&frame("notes.md", "a\nb\nc")).expect("ingest");
        let mut completions = Vec::new();
        let mut prefixes = vec![session
            .revealed("notes.md")
            .map(|state| state.revealed_prefix().to_string())
            .expect("started")];
        completions.push(session.revealed("notes.md").map(|s| s.is_complete()));
        while !session.revealed("notes.md").is_some_and(|s| s.is_complete()) {
            clock.advance(Duration::from_millis(cadence));
            for tick in session.reveal_tick() {
                let state = session.revealed(&tick.filepath).expect("state");
                prefixes.push(state.revealed_prefix().to_string());
                completions.push(Some(tick.complete));
            }
        }
        assert_eq!(prefixes, vec!["a", "a\nb", "a\nb\nc"]);
        assert_eq!(completions, vec![Some(false), Some(false), Some(true)]);
    }
}

#[test]
fn superseded_reveal_never_shows_old_remainder() {
    let (mut session, clock) = session_with_cadence(10);
    session
        .ingest_raw(&frame("main.go", "old-1\nold-2\nold-3\nold-4"))
        .expect("ingest");
    clock.advance(Duration::from_millis(10));
    session.reveal_tick();

    session
        .ingest_raw(&frame("main.go", "new-1\nnew-2"))
        .expect("ingest");
    let seen = prefixes_until_complete(&mut session, &clock, "main.go", 10);
    assert!(seen.iter().all(|prefix| !prefix.contains("old-3") && !prefix.contains("old-4")));
    assert_eq!(seen.last().map(String::as_str), Some("new-1\nnew-2"));

    for _ in 0..10 {
        clock.advance(Duration::from_millis(10));
        assert!(session.reveal_tick().is_empty());
    }
}

#[test]
fn diff_counts_exclude_headers() {
    let diff = "--- a/file.rs\n+++ b/file.rs\n@@ -1,1 +1,1 @@\n-removed line\n+added line\n";
    let counts = count_diff_lines(diff);
    assert_eq!((counts.additions, counts.deletions), (1, 1));

    let (mut session, _clock) = session_with_cadence(10);
    session.apply_event(FileChangeEvent::new("file.rs", "added line\n").with_diff(diff));
    let record = session.selected_or_latest().expect("record");
    assert_eq!(record.diff_counts(), counts);
}

#[test]
fn reconnect_backoff_caps_and_then_stops() {
    let mut tracker = ReconnectTracker::default();
    let mut delays = Vec::new();
    let mut terminal = None;
    for _ in 0..7 {
        match tracker.on_close() {
            CloseDecision::Retry { delay, .. } => delays.push(delay.as_millis() as u64),
            decision @ CloseDecision::GiveUp { .. } => {
                terminal = Some(decision.status());
                break;
            }
        }
    }
    assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000]);
    assert_eq!(terminal, Some(ConnectionStatus::GaveUp { attempts: 5 }));
}

#[test]
fn clicking_pinned_file_again_returns_to_latest() {
    let (mut session, _clock) = session_with_cadence(10);
    session.ingest_raw(&frame("a.ts", "const a = 1;")).expect("ingest");
    session.ingest_raw(&frame("b.ts", "const b = 1;")).expect("ingest");

    session.select(Some("a.ts"));
    let summary = session.ingest_raw(&frame("c.ts", "const c = 1;")).expect("ingest");
    assert_eq!(summary.retarget, Retarget::Unaffected);
    assert_eq!(session.selected_or_latest().map(|r| r.filepath.as_str()), Some("a.ts"));

    session.select(Some("a.ts"));
    assert_eq!(session.view().selected(), None);
    assert_eq!(session.selected_or_latest().map(|r| r.filepath.as_str()), Some("c.ts"));
    assert!(session.revealed("c.ts").is_some());
}

#[test]
fn bad_frames_are_reported_and_stream_continues() {
    let (mut session, _clock) = session_with_cadence(10);
    assert!(session.ingest_raw("{not json").is_err());
    assert!(session.ingest_raw(r#"{"filepath":"x.rs"}"#).is_err());
    assert!(session
        .ingest_raw(r#"{"filepath":"x.rs","current_code":"","type":"weird"}"#)
        .is_err());
    session.ingest_raw(&frame("x.rs", "fn x() {}")).expect("ingest");

    assert_eq!(session.recent_errors().count(), 3);
    assert_eq!(session.store().len(), 1);
    let last = session.last_error().expect("error");
    assert!(last.message.contains("weird"));
}
