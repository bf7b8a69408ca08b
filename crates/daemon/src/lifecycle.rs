// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, startup, shutdown.
//!
//! `startup` is the composition root: it
//! opens the Repository Layer, builds the Snapshot Cache, Workspace
//! Provisioner, Event Bus, and Session Manager, and hands every component
//! its collaborators explicitly.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use forge_adapters::launcher::SubprocessAgentLauncher;
use forge_adapters::provider::{BtrfsProvider, CopyProvider, OverlayProvider, ZfsProvider};
use forge_adapters::vcs::GitVcsAdapter;
use forge_adapters::{EventBus, SnapshotProvider, VcsAdapter};
use forge_cache::{QuotaConfig, SnapshotCache};
use forge_core::{RuntimeType, SystemClock, UuidIdGen};
use forge_engine::{
    LaunchCommandConfig, RetryPolicy, SessionManager, SessionManagerConfig, WorkspaceProvisioner,
};
use forge_storage::{FileSessionRepository, RepositoryPaths};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::info;

/// The concrete Repository Layer the daemon composes.
pub type DaemonRepository = FileSessionRepository<SystemClock>;

/// The concrete Session Manager the daemon composes: system clock, file
/// repository doubling as the cache's durable ledger.
pub type DaemonSessionManager = SessionManager<SystemClock, DaemonRepository>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("another daemon already holds the lock")]
    LockFailed(String),

    #[error("config file error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tunables read from `config.toml` in the state directory (or the path
/// in `FORGE_CONFIG`), with environment-variable overrides for the two
/// most operationally relevant knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// `C_max`: concurrent agent processes across all Sessions
    pub max_concurrent_agents: usize,
    /// Snapshot cache global disk quota
    pub cache_quota_bytes: u64,
    /// Optional per-repository sub-quota
    pub per_repo_quota_bytes: Option<u64>,
    /// Idempotency-key retention window (`T_idem`)
    pub idempotency_ttl_hours: u64,
    pub retry_max_attempts: u32,
    /// Per-subscriber live event queue depth
    pub bus_capacity: usize,
    /// Policy flag: runtime mode for every Session (request cannot override)
    pub runtime_type: RuntimeType,
    pub recorder_command: String,
    pub agent_command: String,
    /// Days after which a terminal Session's event log is purged.
    /// Unset keeps events forever.
    pub purge_terminal_events_after_days: Option<u64>,
    /// ZFS dataset to snapshot under, when the host has ZFS
    pub zfs_dataset: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 4,
            cache_quota_bytes: 50 * 1024 * 1024 * 1024,
            per_repo_quota_bytes: None,
            idempotency_ttl_hours: 24,
            retry_max_attempts: 3,
            bus_capacity: 256,
            runtime_type: RuntimeType::Local,
            recorder_command: "forge-recorder".into(),
            agent_command: "forge-agent".into(),
            purge_terminal_events_after_days: None,
            zfs_dataset: None,
        }
    }
}

impl Settings {
    fn load(path: &std::path::Path) -> Result<Self, LifecycleError> {
        let mut settings = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw).map_err(|e| LifecycleError::Config(e.to_string()))?
        } else {
            Settings::default()
        };
        if let Some(n) = env_parse::<usize>("FORGE_MAX_AGENTS") {
            settings.max_concurrent_agents = n;
        }
        if let Some(n) = env_parse::<u64>("FORGE_CACHE_QUOTA_BYTES") {
            settings.cache_quota_bytes = n;
        }
        Ok(settings)
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

/// Resolve state directory: FORGE_STATE_DIR > XDG_STATE_HOME/forge > ~/.local/state/forge
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("FORGE_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("forge"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/forge"))
}

/// Daemon configuration: the on-disk layout plus tunables.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub version_path: PathBuf,
    pub log_path: PathBuf,
    pub checkouts_path: PathBuf,
    pub workspaces_path: PathBuf,
    pub snapshots_path: PathBuf,
    pub settings: Settings,
}

impl Config {
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = state_dir()?;
        let config_path = std::env::var("FORGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| state_dir.join("config.toml"));
        let settings = Settings::load(&config_path)?;
        Ok(Self::under(state_dir, settings))
    }

    pub fn under(state_dir: PathBuf, settings: Settings) -> Self {
        Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            version_path: state_dir.join("daemon.version"),
            log_path: state_dir.join("daemon.log"),
            checkouts_path: state_dir.join("checkouts"),
            workspaces_path: state_dir.join("workspaces"),
            snapshots_path: state_dir.join("snapshots"),
            state_dir,
            settings,
        }
    }
}

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub repo: Arc<DaemonRepository>,
    pub manager: Arc<DaemonSessionManager>,
    pub bus: Arc<EventBus>,
    pub start_time: Instant,
}

/// Result of daemon startup: the state plus the socket listener to spawn
/// as a task.
pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: UnixListener,
}

pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.checkouts_path)?;
    std::fs::create_dir_all(&config.workspaces_path)?;
    std::fs::create_dir_all(&config.snapshots_path)?;

    let lock_file = acquire_lock(&config.lock_path)?;
    std::fs::write(&config.version_path, crate::protocol::PROTOCOL_VERSION)?;

    let repo = Arc::new(
        FileSessionRepository::open(&RepositoryPaths::under(&config.state_dir), SystemClock)
            .map_err(|e| LifecycleError::Storage(e.to_string()))?,
    );

    let settings = &config.settings;
    let quota = QuotaConfig {
        global_bytes: settings.cache_quota_bytes,
        per_repo_bytes: settings.per_repo_quota_bytes,
    };
    let cache = Arc::new(SnapshotCache::new(repo.clone(), quota));
    let vcs: Arc<dyn VcsAdapter> = Arc::new(GitVcsAdapter);
    let providers = available_providers(config);
    let provisioner = Arc::new(WorkspaceProvisioner::new(
        cache,
        vcs,
        providers,
        config.checkouts_path.clone(),
        config.workspaces_path.clone(),
    ));
    let bus = Arc::new(EventBus::new(settings.bus_capacity));

    let manager = SessionManager::new(
        repo.clone(),
        provisioner,
        bus.clone(),
        Arc::new(SubprocessAgentLauncher),
        Arc::new(UuidIdGen),
        SystemClock,
        SessionManagerConfig {
            max_concurrent_agents: settings.max_concurrent_agents,
            quota,
            retry_policy: RetryPolicy {
                max_attempts: settings.retry_max_attempts,
                ..RetryPolicy::default()
            },
            idempotency_ttl_ms: (settings.idempotency_ttl_hours as i64) * 60 * 60 * 1000,
            runtime_type: settings.runtime_type,
            launch: LaunchCommandConfig {
                recorder_command: settings.recorder_command.clone(),
                agent_command: settings.agent_command.clone(),
                server_config_path: std::env::var("FORGE_CONFIG").ok().map(PathBuf::from),
            },
            agent_schemas: Default::default(),
        },
    );

    // Stale socket from a crashed daemon: the lock is ours, so safe to remove.
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    let listener = UnixListener::bind(&config.socket_path)?;
    info!(socket = %config.socket_path.display(), "daemon listening");

    Ok(StartupResult {
        daemon: DaemonState {
            config: config.clone(),
            lock_file,
            repo,
            manager,
            bus,
            start_time: Instant::now(),
        },
        listener,
    })
}

/// Providers in preference order; unavailable backends are dropped so the
/// provisioner's "first available" walk never selects a tool the host
/// doesn't have. `Copy` is always last and always available.
fn available_providers(config: &Config) -> Vec<Arc<dyn SnapshotProvider>> {
    let mut providers: Vec<Arc<dyn SnapshotProvider>> = Vec::new();
    if let Some(dataset) = &config.settings.zfs_dataset {
        providers.push(Arc::new(ZfsProvider::new(dataset.clone())));
    }
    providers.push(Arc::new(BtrfsProvider::new(config.snapshots_path.join("btrfs"))));
    providers.push(Arc::new(OverlayProvider::new(
        config.snapshots_path.join("lowers"),
        config.snapshots_path.join("uppers"),
    )));
    providers.push(Arc::new(CopyProvider::new(config.snapshots_path.join("copies"))));
    providers.retain(|p| p.is_available());
    providers
}

fn acquire_lock(lock_path: &std::path::Path) -> Result<File, LifecycleError> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?;
    file.try_lock_exclusive()
        .map_err(|e| LifecycleError::LockFailed(e.to_string()))?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

impl DaemonState {
    /// Final checkpoint and socket removal. The journal already holds
    /// everything; the checkpoint just bounds the next startup's replay.
    pub fn shutdown(&self) -> Result<(), LifecycleError> {
        match self.repo.checkpoint_sync() {
            Ok(result) => {
                if let Err(e) = self.repo.prune_journal(result.seq) {
                    tracing::warn!(error = %e, "failed to prune journal during shutdown");
                }
            }
            Err(e) => tracing::warn!(error = %e, "final checkpoint failed"),
        }
        let _ = std::fs::remove_file(&self.config.socket_path);
        let _ = std::fs::remove_file(&self.config.version_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> Config {
        Config::under(dir.to_path_buf(), Settings::default())
    }

    #[tokio::test]
    async fn startup_binds_socket_and_acquires_lock() {
        let tmp = tempfile::tempdir().expect("tmp");
        let config = test_config(tmp.path());
        let result = startup(&config).await.expect("startup");
        assert!(config.socket_path.exists());
        assert!(config.lock_path.exists());

        // A second daemon against the same state dir must refuse to start.
        let second = startup(&config).await;
        assert!(matches!(second, Err(LifecycleError::LockFailed(_))));

        result.daemon.shutdown().expect("shutdown");
        assert!(!config.socket_path.exists());
    }

    #[test]
    fn settings_parse_from_toml_with_defaults() {
        let tmp = tempfile::tempdir().expect("tmp");
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "max_concurrent_agents = 8\ncache_quota_bytes = 1024\n",
        )
        .expect("write");
        let settings = Settings::load(&path).expect("load");
        assert_eq!(settings.max_concurrent_agents, 8);
        assert_eq!(settings.cache_quota_bytes, 1024);
        assert_eq!(settings.idempotency_ttl_hours, 24);
    }

    #[test]
    fn unknown_settings_keys_are_rejected() {
        let tmp = tempfile::tempdir().expect("tmp");
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "definitely_not_a_setting = true\n").expect("write");
        assert!(matches!(
            Settings::load(&path),
            Err(LifecycleError::Config(_))
        ));
    }
}
