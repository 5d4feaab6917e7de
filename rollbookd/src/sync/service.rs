use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use rollbook_core::{
    AccountInfo, ContentsClient, ContentsError, Snapshot, SnapshotError,
};

use crate::state::{StateError, StateStore};

/// Remote path of the single snapshot document.
pub const SNAPSHOT_PATH: &str = "rollbook-data.json";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cloud sync is not configured")]
    NotConfigured,
    #[error("a sync is already in progress")]
    InProgress,
    #[error("no snapshot exists in the remote store yet")]
    NoRemoteData,
    #[error("remote snapshot is malformed: {0}")]
    BadRemoteDocument(#[from] SnapshotError),
    #[error("remote store error: {0}")]
    Remote(#[from] ContentsError),
    #[error("state store error: {0}")]
    State(#[from] StateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Synced { timestamp: String },
    /// The attempt failed and the snapshot is owed to the remote; the
    /// retry driver will deliver it.
    Queued { reason: String },
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub snapshot: Snapshot,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub configured: bool,
    pub last_sync: Option<String>,
    pub in_progress: bool,
    pub pending_upload: bool,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub default_branch: String,
}

/// Upload/download orchestrator. The only component that knows the
/// snapshot is all-or-nothing: a full document goes up, a full document
/// comes down, and the durable pending/last-sync flags are written only
/// after the remote call has resolved.
pub struct SyncService {
    settings: RemoteSettings,
    pub(crate) state: StateStore,
    client: RwLock<Option<ContentsClient>>,
    in_progress: AtomicBool,
}

/// Releases the re-entrancy guard on every exit path.
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncService {
    /// Open the service, restoring the client from a stored credential
    /// when one exists.
    pub async fn open(settings: RemoteSettings, state: StateStore) -> Result<Self, SyncError> {
        let client = match state.credential().await? {
            Some(token) => Some(build_client(&settings, &token)?),
            None => None,
        };
        Ok(Self {
            settings,
            state,
            client: RwLock::new(client),
            in_progress: AtomicBool::new(false),
        })
    }

    pub async fn configure(&self, token: &str) -> Result<(), SyncError> {
        let client = build_client(&self.settings, token)?;
        self.state.set_credential(token).await?;
        *self.client.write().expect("client lock poisoned") = Some(client);
        Ok(())
    }

    /// Drop the credential. Keeps the pending-upload flag so unsynced
    /// local changes stay visible; no sync runs while unconfigured.
    pub async fn disconnect(&self) -> Result<(), SyncError> {
        self.state.disconnect().await?;
        *self.client.write().expect("client lock poisoned") = None;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.client.read().expect("client lock poisoned").is_some()
    }

    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        Ok(SyncStatus {
            configured: self.is_configured(),
            last_sync: self.state.last_sync().await?,
            in_progress: self.in_progress.load(Ordering::SeqCst),
            pending_upload: self.state.pending_upload().await?,
        })
    }

    pub async fn test_connection(&self) -> Result<AccountInfo, SyncError> {
        let client = self.client()?;
        Ok(client.test_connection().await?)
    }

    /// Push the whole snapshot to the remote store. Remote failures are
    /// not errors from the caller's point of view: the snapshot is
    /// queued durably and the outcome says so. Only not-configured,
    /// in-progress and state-store failures reject.
    pub async fn upload(&self, mut snapshot: Snapshot) -> Result<UploadOutcome, SyncError> {
        let client = self.client()?;
        let _guard = self.begin()?;

        snapshot.stamp(now_rfc3339());
        match self.push_snapshot(&client, &snapshot).await {
            Ok(()) => {
                self.state.record_last_sync(&snapshot.last_updated).await?;
                self.state.set_pending_upload(false).await?;
                Ok(UploadOutcome::Synced {
                    timestamp: snapshot.last_updated,
                })
            }
            Err(err) => {
                self.state.set_pending_upload(true).await?;
                Ok(UploadOutcome::Queued {
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Fetch the whole remote snapshot. A missing document is the
    /// distinct first-run condition, and a document that fails shape
    /// validation rejects without touching any local state.
    pub async fn download(&self) -> Result<DownloadOutcome, SyncError> {
        let client = self.client()?;
        let _guard = self.begin()?;

        let file = client.get_file(SNAPSHOT_PATH).await?;
        let Some(file) = file else {
            return Err(SyncError::NoRemoteData);
        };
        let snapshot = Snapshot::from_value(file.content)?;
        self.state.record_last_sync(&snapshot.last_updated).await?;
        Ok(DownloadOutcome {
            timestamp: snapshot.last_updated.clone(),
            snapshot,
        })
    }

    async fn push_snapshot(
        &self,
        client: &ContentsClient,
        snapshot: &Snapshot,
    ) -> Result<(), ContentsError> {
        client.ensure_branch_exists().await?;
        // An unreadable remote document yields no sha; the put then
        // decides whether the write is an update or a create.
        let sha = match client.get_file(SNAPSHOT_PATH).await {
            Ok(existing) => existing.map(|file| file.sha),
            Err(_) => None,
        };
        let value = snapshot.to_value().map_err(ContentsError::Json)?;
        client.put_file(SNAPSHOT_PATH, &value, sha.as_deref()).await?;
        Ok(())
    }

    fn client(&self) -> Result<ContentsClient, SyncError> {
        self.client
            .read()
            .expect("client lock poisoned")
            .clone()
            .ok_or(SyncError::NotConfigured)
    }

    fn begin(&self) -> Result<SyncGuard<'_>, SyncError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::InProgress);
        }
        Ok(SyncGuard(&self.in_progress))
    }
}

fn build_client(settings: &RemoteSettings, token: &str) -> Result<ContentsClient, ContentsError> {
    Ok(ContentsClient::with_base_url(
        &settings.api_base,
        token,
        &settings.owner,
        &settings.repo,
        &settings.branch,
    )?
    .with_default_branch(&settings.default_branch))
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "service_tests.rs"]
pub(crate) mod tests;
