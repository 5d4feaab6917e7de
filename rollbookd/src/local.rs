use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rollbook_core::Snapshot;

use crate::control::AppHooks;

/// File-backed stand-in for the application's own persistence layer:
/// the records app reads and writes one JSON document, and this store
/// bridges it to the sync hooks. Remembers the last document it wrote
/// itself so a watcher can tell an applied download from a real edit.
pub struct LocalSnapshotStore {
    path: PathBuf,
    last_applied: Mutex<Option<String>>,
}

impl LocalSnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_applied: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file currently on disk is the one this store wrote
    /// during the last `apply_remote_snapshot`.
    pub fn is_echo_of_apply(&self) -> bool {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return false;
        };
        self.last_applied
            .lock()
            .expect("last_applied lock poisoned")
            .as_deref()
            == Some(text.as_str())
    }

    fn read(&self) -> Snapshot {
        match fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    eprintln!(
                        "[rollbookd] local snapshot at {} is unreadable, starting empty: {err}",
                        self.path.display()
                    );
                    Snapshot::default()
                }
            },
            // Missing file is the new-device case.
            Err(_) => Snapshot::default(),
        }
    }

    fn write(&self, snapshot: &Snapshot) {
        let text = match serde_json::to_string_pretty(snapshot) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("[rollbookd] failed to serialize snapshot: {err}");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                eprintln!("[rollbookd] failed to create data directory: {err}");
                return;
            }
        }
        if let Err(err) = fs::write(&self.path, &text) {
            eprintln!(
                "[rollbookd] failed to write local snapshot at {}: {err}",
                self.path.display()
            );
            return;
        }
        *self
            .last_applied
            .lock()
            .expect("last_applied lock poisoned") = Some(text);
    }
}

impl AppHooks for LocalSnapshotStore {
    fn current_snapshot(&self) -> Snapshot {
        self.read()
    }

    fn apply_remote_snapshot(&self, snapshot: Snapshot) {
        self.write(&snapshot);
    }
}
