// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent supervisor: launches the agent process for a Session,
//! bounds how many run concurrently with a semaphore (`C_max`), and
//! forwards every event the agent emits to both the Repository (durable)
//! and the Event Bus (live subscribers).

use crate::error::from_launcher;
use forge_adapters::launcher::AgentSignal;
use forge_adapters::{AgentLauncher, EventBus, LaunchSpec, LaunchedAgent};
use forge_core::{Clock, CoreError, Session, SessionId, WorkspaceResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// How the Supervisor builds the agent command line: the recorder wrapping
/// the agent launcher, forwarding only parameters derived from Session
/// configuration, never from the original request.
#[derive(Debug, Clone)]
pub struct LaunchCommandConfig {
    pub recorder_command: String,
    pub agent_command: String,
    pub server_config_path: Option<PathBuf>,
}

impl Default for LaunchCommandConfig {
    fn default() -> Self {
        Self {
            recorder_command: "forge-recorder".into(),
            agent_command: "forge-agent".into(),
            server_config_path: None,
        }
    }
}

/// Build the recorder-wrapped launch spec for a Session whose workspace is
/// mounted. Every flag is derived from the Session record or server config,
/// never from the original request.
pub fn build_launch_spec(
    session: &Session,
    workspace: &WorkspaceResult,
    config: &LaunchCommandConfig,
) -> LaunchSpec {
    let mut args = Vec::new();
    let config_flag = config
        .server_config_path
        .as_ref()
        .map(|p| format!("--config={}", p.display()));

    // Recorder flags, then the inner agent-launcher command it wraps.
    if let Some(flag) = &config_flag {
        args.push(flag.clone());
    }
    args.push(config.agent_command.clone());
    args.push(format!("--session-id={}", session.id));
    args.push(format!("--agent={}", session.agent.agent_type));
    if let Some(version) = &session.agent.version {
        args.push(format!("--agent-version={version}"));
    }
    args.push(format!("--cwd={}", workspace.mount_path));
    if let Some(snapshot_id) = &workspace.snapshot_id {
        args.push(format!("--from-snapshot={snapshot_id}"));
    }
    args.push("--non-interactive".into());
    args.push(format!("--prompt={}", session.task.prompt));
    if let Some(flag) = &config_flag {
        args.push(flag.clone());
    }

    let mut env = HashMap::new();
    if !session.agent.settings.is_empty() {
        // Settings are forwarded unaltered; the launcher decodes them.
        if let Ok(settings) = serde_json::to_string(&session.agent.settings) {
            env.insert("FORGE_AGENT_SETTINGS".to_string(), settings);
        }
    }

    LaunchSpec {
        command: config.recorder_command.clone(),
        args,
        env,
        workspace_path: PathBuf::from(&workspace.mount_path),
        prompt: session.task.prompt.clone(),
    }
}

/// Bounds the number of agent processes running at once across all
/// sessions. Acquiring a permit blocks until a slot frees up; the wait
/// queue is FIFO, so admission order matches request order.
pub struct AgentSupervisor {
    launcher: Arc<dyn AgentLauncher>,
    bus: Arc<EventBus>,
    semaphore: Arc<Semaphore>,
}

impl AgentSupervisor {
    pub fn new(launcher: Arc<dyn AgentLauncher>, bus: Arc<EventBus>, max_concurrent: usize) -> Self {
        Self {
            launcher,
            bus,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a concurrency slot. Callers hold the Session in `queued`
    /// until this returns, so a capped-out system shows the extra Sessions
    /// as queued rather than part-provisioned.
    pub async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, CoreError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CoreError::internal("agent supervisor semaphore closed"))
    }

    /// Launch `spec` for `session_id` under an already-acquired permit.
    /// The permit is held until the agent's event stream closes (process
    /// exit or stop), releasing the slot for the next queued Session.
    pub async fn launch_with_permit<C: Clock + 'static>(
        &self,
        permit: OwnedSemaphorePermit,
        repo: Arc<forge_storage::FileSessionRepository<C>>,
        session_id: SessionId,
        spec: LaunchSpec,
    ) -> Result<RunningSession, CoreError> {
        let (tx, mut rx) = mpsc::channel(256);
        let launched = self.launcher.launch(spec, tx).await.map_err(from_launcher)?;

        let bus = self.bus.clone();
        let drain = tokio::spawn(async move {
            let _permit = permit;
            while let Some(event) = rx.recv().await {
                if let Err(err) = repo.append_event(&session_id, event) {
                    tracing::warn!(error = %err, %session_id, "failed to append agent event");
                    continue;
                }
                if let Some(record) = repo.recent_events(&session_id, 1).into_iter().next_back() {
                    bus.publish(record);
                }
            }
        });

        Ok(RunningSession { launched, drain })
    }

    /// Acquire a slot and launch in one call.
    pub async fn launch<C: Clock + 'static>(
        &self,
        repo: Arc<forge_storage::FileSessionRepository<C>>,
        session_id: SessionId,
        spec: LaunchSpec,
    ) -> Result<RunningSession, CoreError> {
        let permit = self.acquire_slot().await?;
        self.launch_with_permit(permit, repo, session_id, spec).await
    }
}

/// A launched agent plus the task draining its event stream into the
/// Repository and Event Bus. The drain task holds the supervisor's
/// concurrency permit until the agent's stdout closes.
pub struct RunningSession {
    launched: LaunchedAgent,
    drain: JoinHandle<()>,
}

impl RunningSession {
    pub fn pid(&self) -> Option<u32> {
        self.launched.pid
    }

    /// Watch channel resolving to the agent's exit code. Cloneable so the
    /// Session Manager's exit watcher can outlive this handle.
    pub fn exit_watch(&self) -> watch::Receiver<Option<i32>> {
        self.launched.exit_watch()
    }

    /// Deliver a job-control or termination signal to the agent.
    pub async fn signal(&mut self, signal: AgentSignal) -> Result<(), CoreError> {
        self.launched.signal(signal).await.map_err(from_launcher)
    }

    /// Stop the agent (graceful, bounded grace window, then kill), waiting
    /// for its event-drain task to finish observing the now-closed stdout
    /// before releasing the concurrency permit. Returns `true` when the
    /// agent exited gracefully, `false` when the grace window expired and
    /// it was force-killed.
    pub async fn stop(mut self) -> Result<bool, CoreError> {
        let graceful = self.launched.stop().await.map_err(from_launcher)?;
        let _ = self.drain.await;
        Ok(graceful)
    }

    /// Wait for the drain task to finish after the agent exited on its
    /// own, so every event it emitted is persisted before the caller
    /// records the terminal status.
    pub async fn drained(self) {
        let _ = self.drain.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use forge_adapters::launcher::LauncherError;
    use forge_core::{Event, LogLevel, SystemClock};
    use forge_storage::{FileSessionRepository, RepositoryPaths};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    /// Launcher whose `launch` doesn't return until every caller has
    /// reached the barrier, letting tests observe the concurrency cap.
    struct GatedLauncher {
        inner: forge_adapters::launcher::fake::FakeAgentLauncher,
        barrier: Arc<Barrier>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AgentLauncher for GatedLauncher {
        async fn launch(
            &self,
            spec: LaunchSpec,
            event_tx: mpsc::Sender<Event>,
        ) -> Result<LaunchedAgent, LauncherError> {
            let n = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(n, Ordering::SeqCst);
            self.barrier.wait().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.launch(spec, event_tx).await
        }
    }

    fn spec() -> LaunchSpec {
        LaunchSpec {
            command: "true".into(),
            args: vec![],
            env: HashMap::new(),
            workspace_path: PathBuf::from("/tmp"),
            prompt: String::new(),
        }
    }

    #[tokio::test]
    async fn forwards_events_to_repository_and_bus() {
        let tmp = tempfile::tempdir().expect("tmp");
        let repo = Arc::new(
            FileSessionRepository::open(&RepositoryPaths::under(tmp.path()), SystemClock).expect("open"),
        );
        let session = forge_core::test_support::SessionBuilder::new("s1").build();
        let session_id = session.id.clone();
        repo.insert_session(session).expect("insert");

        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe(&session_id);

        let launcher: Arc<dyn AgentLauncher> = Arc::new(
            forge_adapters::launcher::fake::FakeAgentLauncher::new(vec![Event::Log {
                level: LogLevel::Info,
                message: "hello".into(),
            }]),
        );
        let supervisor = AgentSupervisor::new(launcher, bus, 4);

        let running = supervisor
            .launch(repo.clone(), session_id.clone(), spec())
            .await
            .expect("launch");
        let record = rx.recv().await.expect("event forwarded");
        assert!(matches!(record.event, Event::Log { .. }));

        running.stop().await.expect("stop");
        assert_eq!(repo.recent_events(&session_id, 10).len(), 1);
    }

    #[tokio::test]
    async fn concurrency_cap_bounds_simultaneous_launches() {
        let max_concurrent = 2;
        let barrier = Arc::new(Barrier::new(max_concurrent));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let launcher: Arc<dyn AgentLauncher> = Arc::new(GatedLauncher {
            inner: forge_adapters::launcher::fake::FakeAgentLauncher::default(),
            barrier: barrier.clone(),
            in_flight: in_flight.clone(),
            peak: peak.clone(),
        });
        let bus = Arc::new(EventBus::new(8));
        let supervisor = Arc::new(AgentSupervisor::new(launcher, bus, max_concurrent));

        let tmp = tempfile::tempdir().expect("tmp");
        let repo = Arc::new(
            FileSessionRepository::open(&RepositoryPaths::under(tmp.path()), SystemClock).expect("open"),
        );
        for i in 0..max_concurrent {
            let session = forge_core::test_support::SessionBuilder::new(&format!("s{i}")).build();
            repo.insert_session(session).expect("insert");
        }

        assert_eq!(supervisor.available_permits(), max_concurrent);

        let mut handles = Vec::new();
        for i in 0..max_concurrent {
            let supervisor = supervisor.clone();
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let running = supervisor
                    .launch(repo, SessionId::new(format!("s{i}")), spec())
                    .await
                    .expect("launch");
                running.stop().await.expect("stop");
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }

        assert_eq!(peak.load(Ordering::SeqCst), max_concurrent);
        assert_eq!(supervisor.available_permits(), max_concurrent);
    }

    #[test]
    fn launch_spec_wraps_agent_command_with_recorder() {
        let session = forge_core::test_support::SessionBuilder::new("s1").build();
        let workspace = WorkspaceResult {
            snapshot_provider: "copy".into(),
            mount_path: "/work/s1".into(),
            execution_host_id: None,
            snapshot_id: Some("copy-abc".into()),
        };
        let config = LaunchCommandConfig {
            recorder_command: "forge-recorder".into(),
            agent_command: "forge-agent".into(),
            server_config_path: Some(PathBuf::from("/etc/forge.toml")),
        };

        let spec = build_launch_spec(&session, &workspace, &config);
        assert_eq!(spec.command, "forge-recorder");
        assert_eq!(spec.args[0], "--config=/etc/forge.toml");
        assert_eq!(spec.args[1], "forge-agent");
        assert!(spec.args.contains(&"--session-id=s1".to_string()));
        assert!(spec.args.contains(&"--cwd=/work/s1".to_string()));
        assert!(spec.args.contains(&"--from-snapshot=copy-abc".to_string()));
        assert!(spec.args.contains(&"--non-interactive".to_string()));
        // The config flag appears on both the wrapper and the inner command.
        assert_eq!(
            spec.args.iter().filter(|a| *a == "--config=/etc/forge.toml").count(),
            2
        );
    }
}
