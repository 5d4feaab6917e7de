use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use url::Url;

use crate::control::{AppHooks, SyncControl};
use crate::local::LocalSnapshotStore;
use crate::net::start_probe_watcher;
use crate::state::StateStore;
use crate::sync::retry::RetryDriver;
use crate::sync::service::{RemoteSettings, SyncService};
use crate::watch::start_snapshot_watcher;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_DATA_BRANCH: &str = "data";
const DEFAULT_BASE_BRANCH: &str = "main";
const DEFAULT_RETRY_SECS: u64 = 60;
const DEFAULT_PROBE_SECS: u64 = 15;
const DATA_FILE_NAME: &str = "rollbook-data.json";

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub default_branch: String,
    pub api_base: String,
    pub data_file: PathBuf,
    pub state_db: Option<PathBuf>,
    pub retry_interval: Duration,
    pub probe_interval: Duration,
    pub token: Option<String>,
}

impl AgentConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let owner = std::env::var("ROLLBOOK_REMOTE_OWNER")
            .context("ROLLBOOK_REMOTE_OWNER is not set")?;
        let repo =
            std::env::var("ROLLBOOK_REMOTE_REPO").context("ROLLBOOK_REMOTE_REPO is not set")?;
        let branch = std::env::var("ROLLBOOK_REMOTE_BRANCH")
            .unwrap_or_else(|_| DEFAULT_DATA_BRANCH.to_string());
        let default_branch = std::env::var("ROLLBOOK_BASE_BRANCH")
            .unwrap_or_else(|_| DEFAULT_BASE_BRANCH.to_string());
        let api_base =
            std::env::var("ROLLBOOK_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let data_file = match std::env::var("ROLLBOOK_DATA_FILE") {
            Ok(value) => PathBuf::from(value),
            Err(_) => default_data_file()?,
        };
        let state_db = std::env::var("ROLLBOOK_STATE_DB").ok().map(PathBuf::from);
        let retry_interval =
            Duration::from_secs(read_u64_env("ROLLBOOK_RETRY_SECS", DEFAULT_RETRY_SECS));
        let probe_interval =
            Duration::from_secs(read_u64_env("ROLLBOOK_PROBE_SECS", DEFAULT_PROBE_SECS));
        let token = std::env::var("ROLLBOOK_TOKEN").ok().filter(|t| !t.is_empty());

        Ok(Self {
            owner,
            repo,
            branch,
            default_branch,
            api_base,
            data_file,
            state_db,
            retry_interval,
            probe_interval,
            token,
        })
    }

    fn remote_settings(&self) -> RemoteSettings {
        RemoteSettings {
            api_base: self.api_base.clone(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            branch: self.branch.clone(),
            default_branch: self.default_branch.clone(),
        }
    }
}

pub struct AgentRuntime {
    config: AgentConfig,
    service: Arc<SyncService>,
    control: Arc<SyncControl>,
    store: Arc<LocalSnapshotStore>,
}

impl AgentRuntime {
    pub async fn bootstrap(config: AgentConfig) -> anyhow::Result<Self> {
        let state = match &config.state_db {
            Some(path) => StateStore::new_at(path).await,
            None => StateStore::new_default().await,
        }
        .context("failed to open sync state store")?;

        let service = Arc::new(
            SyncService::open(config.remote_settings(), state)
                .await
                .context("failed to open sync service")?,
        );

        if !service.is_configured()
            && let Some(token) = &config.token
        {
            eprintln!("[rollbookd] adopting credential from environment");
            service
                .configure(token)
                .await
                .context("failed to store environment credential")?;
        }

        let store = Arc::new(LocalSnapshotStore::new(config.data_file.clone()));
        let hooks: Arc<dyn AppHooks> = Arc::clone(&store) as Arc<dyn AppHooks>;
        let control = Arc::new(SyncControl::new(Arc::clone(&service), hooks));

        Ok(Self {
            config,
            service,
            control,
            store,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        eprintln!(
            "[rollbookd] started: remote={}/{}@{}, data_file={}",
            self.config.owner,
            self.config.repo,
            self.config.branch,
            self.config.data_file.display()
        );

        if self.service.is_configured() {
            match self.service.test_connection().await {
                Ok(account) => eprintln!("[rollbookd] connected as {}", account.login),
                Err(err) => eprintln!("[rollbookd] connection check failed: {err}"),
            }
            self.control
                .startup_sync()
                .await
                .context("startup sync failed")?;
        } else {
            eprintln!("[rollbookd] no credential configured, sync is paused");
        }

        let api_url = Url::parse(&self.config.api_base).context("invalid API base url")?;
        let probe_host = api_url.host_str().unwrap_or("api.github.com").to_string();
        let probe_port = api_url.port_or_known_default().unwrap_or(443);
        let (online, net_rx, net_handle) =
            start_probe_watcher(probe_host, probe_port, self.config.probe_interval);

        let driver = Arc::new(RetryDriver::new(
            Arc::clone(&self.service),
            Arc::clone(&self.store) as Arc<dyn AppHooks>,
            online,
            self.config.retry_interval,
        ));
        let timer_handle = tokio::spawn(Arc::clone(&driver).run_timer());
        let events_handle = tokio::spawn(Arc::clone(&driver).run_events(net_rx));

        let (watcher, watch_handle) = match start_snapshot_watcher(self.store.path()) {
            Ok((watcher, mut changes)) => {
                let control = Arc::clone(&self.control);
                let store = Arc::clone(&self.store);
                let handle = tokio::spawn(async move {
                    while changes.recv().await.is_some() {
                        if store.is_echo_of_apply() {
                            continue;
                        }
                        eprintln!("[rollbookd] local snapshot changed");
                        control.on_local_data_changed();
                    }
                });
                (Some(watcher), Some(handle))
            }
            Err(err) => {
                eprintln!("[rollbookd] warning: failed to watch local snapshot: {err}");
                (None, None)
            }
        };

        let _watcher = watcher;
        tokio::signal::ctrl_c()
            .await
            .context("failed waiting for shutdown signal")?;
        eprintln!("[rollbookd] shutting down");

        net_handle.abort();
        timer_handle.abort();
        events_handle.abort();
        if let Some(handle) = watch_handle {
            handle.abort();
        }

        Ok(())
    }
}

fn default_data_file() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir().context("XDG data directory is unavailable")?;
    Ok(base.join("rollbook").join(DATA_FILE_NAME))
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
