use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalChange {
    SnapshotWritten,
}

/// Watch the local snapshot document for writes by the records app.
/// The parent directory is watched because editors and atomic writers
/// replace the file rather than modifying it in place.
pub fn start_snapshot_watcher(
    file: &Path,
) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<LocalChange>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let target = file.to_path_buf();
    let watch_root = file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res
            && let Some(change) = map_event(&target, event)
        {
            let _ = tx.send(change);
        }
    })?;
    watcher.watch(&watch_root, RecursiveMode::NonRecursive)?;
    Ok((watcher, rx))
}

fn map_event(target: &Path, event: Event) -> Option<LocalChange> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .any(|path| path == target)
            .then_some(LocalChange::SnapshotWritten),
        _ => None,
    }
}
