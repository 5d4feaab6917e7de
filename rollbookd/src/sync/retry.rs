use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::control::AppHooks;
use crate::net::NetEvent;
use crate::sync::service::{SyncError, SyncService, UploadOutcome};

/// Delivers a queued upload without user action. Two triggers feed it:
/// the offline-to-online transition event and a fixed-interval timer.
/// Retries are unbounded; a queued snapshot stays queued until an
/// attempt lands.
pub struct RetryDriver {
    service: Arc<SyncService>,
    hooks: Arc<dyn AppHooks>,
    online: Arc<AtomicBool>,
    interval: Duration,
}

impl RetryDriver {
    pub fn new(
        service: Arc<SyncService>,
        hooks: Arc<dyn AppHooks>,
        online: Arc<AtomicBool>,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            hooks,
            online,
            interval,
        }
    }

    /// One retry pass. Skips silently unless an upload is owed, the
    /// service is configured, and no sync is already running; the
    /// in-progress guard makes a racing double trigger a no-op.
    /// Returns whether an upload attempt was made.
    pub async fn process_queue(&self) -> bool {
        let Ok(status) = self.service.status().await else {
            return false;
        };
        if !status.pending_upload || !status.configured || status.in_progress {
            return false;
        }

        let snapshot = self.hooks.current_snapshot();
        match self.service.upload(snapshot).await {
            Ok(UploadOutcome::Synced { timestamp }) => {
                eprintln!("[rollbookd] queued upload delivered at {timestamp}");
                true
            }
            Ok(UploadOutcome::Queued { reason }) => {
                eprintln!("[rollbookd] retry failed, upload stays queued: {reason}");
                true
            }
            // Another sync won the race between the guard check and the
            // upload call; the next trigger will try again.
            Err(SyncError::InProgress) => false,
            Err(err) => {
                eprintln!("[rollbookd] retry error: {err}");
                false
            }
        }
    }

    pub async fn run_timer(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.interval).await;
            if self.online.load(Ordering::SeqCst) {
                self.process_queue().await;
            }
        }
    }

    pub async fn run_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<NetEvent>) {
        while let Some(event) = events.recv().await {
            if event == NetEvent::Online {
                eprintln!("[rollbookd] network online, checking for pending uploads");
                self.process_queue().await;
            }
        }
    }
}
