use crate::filter::{PathFilter, GITIGNORE_FILE};
use crate::server::SourceState;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    collections::BTreeSet,
    io,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Path relative to the watch root with `/` separators, or `None` when the path
/// is outside the root.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Collects every streamable text file below `root`. Unreadable and non-UTF-8
/// files are skipped.
pub fn scan_folder(root: &Path, filter: &PathFilter) -> Vec<(String, String)> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(event = "scan_error", dir = %dir.display(), error = %err);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(rel) = relative_path(root, &path) else {
                continue;
            };
            if filter.is_ignored(&rel) {
                continue;
            }
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => found.push((rel, content)),
                    Err(err) => debug!(event = "scan_skip", filepath = %rel, error = %err),
                }
            }
        }
    }
    found.sort();
    found
}

/// Watches `root` until the notify channel closes, publishing one event per
/// changed file after each debounce window.
pub async fn watch_folder(
    root: PathBuf,
    mut filter: PathFilter,
    state: Arc<SourceState>,
    debounce: Duration,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if is_content_event(&event.kind) {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
            }
            Err(err) => warn!(event = "watch_error", error = %err),
        },
        notify::Config::default(),
    )
    .context("create file watcher")?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watch {}", root.display()))?;
    info!(event = "watch_start", root = %root.display(), rules = filter.rules().len());

    while let Some(first) = rx.recv().await {
        let mut batch = BTreeSet::from([first]);
        tokio::time::sleep(debounce).await;
        while let Ok(path) = rx.try_recv() {
            batch.insert(path);
        }
        for path in batch {
            handle_path(&root, &mut filter, &state, &path).await;
        }
    }
    Ok(())
}

fn is_content_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

async fn handle_path(root: &Path, filter: &mut PathFilter, state: &SourceState, path: &Path) {
    let Some(rel) = relative_path(root, path) else {
        return;
    };
    if rel == GITIGNORE_FILE {
        match filter.reload(root) {
            Ok(count) => info!(event = "gitignore_reloaded", rules = count),
            Err(err) => warn!(event = "gitignore_error", error = %err),
        }
    }
    if filter.is_ignored(&rel) {
        return;
    }

    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let change = state.tracker().write().await.observe(&rel, content);
            if let Some(change) = change {
                info!(event = "file_changed", filepath = %rel, bytes = change.current_code.len());
                state.publish(&change).await;
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if state.tracker().write().await.forget(&rel) {
                info!(event = "file_removed", filepath = %rel);
            }
        }
        // directories and binary files
        Err(err) => debug!(event = "read_skip", filepath = %rel, error = %err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse_gitignore;
    use crate::tracker::FileTracker;
    use codestream_core::DEFAULT_MAX_PAYLOAD_BYTES;

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/work/project");
        assert_eq!(
            relative_path(root, Path::new("/work/project/src/main.rs")).as_deref(),
            Some("src/main.rs")
        );
        assert_eq!(relative_path(root, Path::new("/work/project")), None);
        assert_eq!(relative_path(root, Path::new("/elsewhere/a.rs")), None);
    }

    #[test]
    fn scan_honours_filter_and_skips_binary_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).expect("mkdir");
        std::fs::create_dir_all(root.join("target/debug")).expect("mkdir");
        std::fs::write(root.join("src/main.rs"), "fn main() {}\n").expect("write");
        std::fs::write(root.join("target/debug/out.txt"), "built").expect("write");
        std::fs::write(root.join("yarn.lock"), "lock").expect("write");
        std::fs::write(root.join("app.log"), "noise").expect("write");
        std::fs::write(root.join("image.bin"), [0xff, 0xfe, 0x00]).expect("write");

        let filter = PathFilter::new(["yarn.lock"]).with_rules(parse_gitignore("target/\n*.log\n"));
        let found = scan_folder(root, &filter);
        assert_eq!(found, vec![("src/main.rs".to_string(), "fn main() {}\n".to_string())]);
    }

    #[tokio::test]
    async fn changed_files_update_the_tracker_and_removals_forget() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        let state = SourceState::new(FileTracker::default(), DEFAULT_MAX_PAYLOAD_BYTES);
        let mut filter = PathFilter::new(Vec::<String>::new());

        let file = root.join("notes.md");
        std::fs::write(&file, "# one\n").expect("write");
        handle_path(root, &mut filter, &state, &file).await;
        assert_eq!(state.tracker().read().await.get("notes.md"), Some("# one\n"));

        std::fs::remove_file(&file).expect("remove");
        handle_path(root, &mut filter, &state, &file).await;
        assert!(state.tracker().read().await.is_empty());
    }

    #[tokio::test]
    async fn gitignore_change_reloads_rules() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        let state = SourceState::new(FileTracker::default(), DEFAULT_MAX_PAYLOAD_BYTES);
        let mut filter = PathFilter::new(Vec::<String>::new());

        std::fs::write(root.join(GITIGNORE_FILE), "*.tmp\n").expect("write");
        handle_path(root, &mut filter, &state, &root.join(GITIGNORE_FILE)).await;
        assert_eq!(filter.rules().len(), 1);

        let scratch = root.join("scratch.tmp");
        std::fs::write(&scratch, "draft").expect("write");
        handle_path(root, &mut filter, &state, &scratch).await;
        assert_eq!(state.tracker().read().await.get("scratch.tmp"), None);
        assert!(state.tracker().read().await.get(GITIGNORE_FILE).is_some());
    }
}
