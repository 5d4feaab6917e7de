use std::sync::Arc;

use rollbook_core::Snapshot;

use crate::sync::service::{DownloadOutcome, SyncError, SyncService, SyncStatus, UploadOutcome};

/// Seam to the application that owns the records. The sync agent never
/// mutates application state itself: it pulls the current snapshot
/// through `current_snapshot` and hands downloaded state back through
/// `apply_remote_snapshot`.
pub trait AppHooks: Send + Sync {
    fn current_snapshot(&self) -> Snapshot;
    fn apply_remote_snapshot(&self, snapshot: Snapshot);
}

/// The surface the application layer talks to. Passive data-change
/// notifications never block or fail the caller; explicit user actions
/// return their outcome.
pub struct SyncControl {
    service: Arc<SyncService>,
    hooks: Arc<dyn AppHooks>,
}

impl SyncControl {
    pub fn new(service: Arc<SyncService>, hooks: Arc<dyn AppHooks>) -> Self {
        Self { service, hooks }
    }

    pub fn service(&self) -> &Arc<SyncService> {
        &self.service
    }

    /// Fire-and-forget upload after a successful local write. Failures
    /// degrade to the queued state; nothing propagates to the caller.
    pub fn on_local_data_changed(&self) {
        let service = Arc::clone(&self.service);
        let hooks = Arc::clone(&self.hooks);
        tokio::spawn(async move {
            if !service.is_configured() {
                return;
            }
            let snapshot = hooks.current_snapshot();
            match service.upload(snapshot).await {
                Ok(UploadOutcome::Synced { timestamp }) => {
                    eprintln!("[rollbookd] auto-sync complete at {timestamp}");
                }
                Ok(UploadOutcome::Queued { reason }) => {
                    eprintln!("[rollbookd] auto-sync queued for retry: {reason}");
                }
                // A user-driven sync is running; their change still
                // reaches the remote through that or the retry queue.
                Err(SyncError::InProgress) => {}
                Err(err) => eprintln!("[rollbookd] auto-sync error: {err}"),
            }
        });
    }

    pub async fn on_user_requested_upload(&self) -> Result<UploadOutcome, SyncError> {
        let snapshot = self.hooks.current_snapshot();
        self.service.upload(snapshot).await
    }

    /// Explicit download; replaces application state wholesale through
    /// the apply hook on success.
    pub async fn on_user_requested_download(&self) -> Result<DownloadOutcome, SyncError> {
        let outcome = self.service.download().await?;
        self.hooks.apply_remote_snapshot(outcome.snapshot.clone());
        Ok(outcome)
    }

    pub async fn status_snapshot(&self) -> Result<SyncStatus, SyncError> {
        self.service.status().await
    }

    /// One silent download at startup, skipped while an upload is owed:
    /// a queued local change takes precedence over remote state so
    /// unsynced edits are never silently discarded.
    pub async fn startup_sync(&self) -> Result<(), SyncError> {
        let status = self.service.status().await?;
        if !status.configured {
            return Ok(());
        }
        if status.pending_upload {
            eprintln!("[rollbookd] pending upload detected, skipping startup download");
            return Ok(());
        }
        match self.service.download().await {
            Ok(outcome) => {
                eprintln!(
                    "[rollbookd] applied remote snapshot from {}",
                    outcome.timestamp
                );
                self.hooks.apply_remote_snapshot(outcome.snapshot);
            }
            Err(SyncError::NoRemoteData) => {
                eprintln!("[rollbookd] no remote snapshot yet");
            }
            Err(err) => eprintln!("[rollbookd] startup download failed: {err}"),
        }
        Ok(())
    }
}
