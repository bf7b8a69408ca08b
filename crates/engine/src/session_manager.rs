// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: the orchestrator. Owns the lifecycle state
//! machine, composes the Repository Layer, Workspace Provisioner, Agent
//! Supervisor, and Event Bus, and exposes `createTask`/`getSession`/
//! `listSessions`/`pause`/`resume`/`stop`/`cancel`/`subscribe`.

use crate::error::from_storage;
use crate::provisioner::WorkspaceProvisioner;
use crate::retry::{retry_transient, RetryPolicy};
use crate::supervisor::{build_launch_spec, AgentSupervisor, LaunchCommandConfig, RunningSession};
use forge_adapters::launcher::AgentSignal;
use forge_adapters::{AgentLauncher, EventBus};
use forge_cache::{QuotaConfig, SnapshotHandle, SnapshotLedger};
use forge_core::{
    AgentSpec, Clock, CoreError, DeliverySpec, ErrorKind, Event, EventRecord, IdGen, Page,
    PageRequest, RepoMode, RepoSpec, RepositoryId, RepositoryIndexEntry, RuntimeSpec, RuntimeType,
    Session, SessionId, SessionStatus, SessionView, TaskSpec,
};
use forge_storage::FileSessionRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::sync::Mutex as AsyncMutex;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateTaskRequest {
    pub tenant_id: Option<String>,
    pub project_id: Option<String>,
    pub task: TaskSpec,
    pub agent: AgentSpec,
    /// Requested workspace shape. The runtime *mode* is a policy flag and
    /// always comes from server config, never from here.
    pub runtime: Option<RuntimeSpec>,
    pub repo: RepoSpec,
    pub delivery: DeliverySpec,
}

fn fingerprint(request: &CreateTaskRequest) -> String {
    serde_json::json!({
        "tenant_id": request.tenant_id,
        "project_id": request.project_id,
        "task": request.task,
        "agent": request.agent,
        "runtime": request.runtime,
        "repo": request.repo,
        "delivery": request.delivery,
    })
    .to_string()
}

/// Read-model filters for `listSessions`.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub tenant_id: Option<String>,
    pub project_id: Option<String>,
}

impl SessionFilter {
    fn matches(&self, session: &Session) -> bool {
        self.status.is_none_or(|s| session.status == s)
            && self
                .tenant_id
                .as_deref()
                .is_none_or(|t| session.tenant_id.as_deref() == Some(t))
            && self
                .project_id
                .as_deref()
                .is_none_or(|p| session.project_id.as_deref() == Some(p))
    }
}

#[derive(Clone)]
pub struct SessionManagerConfig {
    pub max_concurrent_agents: usize,
    pub quota: QuotaConfig,
    pub retry_policy: RetryPolicy,
    pub idempotency_ttl_ms: i64,
    /// Policy flag: the runtime mode every Session actually gets,
    /// regardless of what the request asked for.
    pub runtime_type: RuntimeType,
    pub launch: LaunchCommandConfig,
    /// Per agent type, the closed set of setting keys accepted at task
    /// creation. Types without a registered schema accept any settings.
    pub agent_schemas: HashMap<String, Vec<String>>,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 4,
            quota: QuotaConfig {
                global_bytes: 50 * 1024 * 1024 * 1024,
                per_repo_bytes: None,
            },
            retry_policy: RetryPolicy::default(),
            idempotency_ttl_ms: 24 * 60 * 60 * 1000,
            runtime_type: RuntimeType::Local,
            launch: LaunchCommandConfig::default(),
            agent_schemas: HashMap::new(),
        }
    }
}

/// What's kept in memory for a Session actively being driven, so `pause`/
/// `resume`/`stop`/`cancel` can reach the live subprocess. Holding the
/// cache lease here (rather than dropping it once provisioning completes)
/// is what pins the snapshot entry against eviction for the lifetime of
/// the running Session.
struct ActiveSession<L: SnapshotLedger> {
    running: RunningSession,
    _workspace_lease: SnapshotHandle<L>,
}

pub struct SessionManager<C: Clock, L: SnapshotLedger> {
    repo: Arc<FileSessionRepository<C>>,
    provisioner: Arc<WorkspaceProvisioner<L>>,
    supervisor: Arc<AgentSupervisor>,
    bus: Arc<EventBus>,
    id_gen: Arc<dyn IdGen>,
    clock: C,
    config: SessionManagerConfig,
    active: AsyncMutex<HashMap<SessionId, ActiveSession<L>>>,
    /// Serializes the idempotency-lookup/insert window so two simultaneous
    /// `create_task` calls with the same key produce exactly one Session.
    create_lock: AsyncMutex<()>,
}

impl<C: Clock + 'static, L: SnapshotLedger + 'static> SessionManager<C, L> {
    pub fn new(
        repo: Arc<FileSessionRepository<C>>,
        provisioner: Arc<WorkspaceProvisioner<L>>,
        bus: Arc<EventBus>,
        launcher: Arc<dyn AgentLauncher>,
        id_gen: Arc<dyn IdGen>,
        clock: C,
        config: SessionManagerConfig,
    ) -> Arc<Self> {
        let supervisor = Arc::new(AgentSupervisor::new(
            launcher,
            bus.clone(),
            config.max_concurrent_agents,
        ));
        Arc::new(Self {
            repo,
            provisioner,
            supervisor,
            bus,
            id_gen,
            clock,
            config,
            active: AsyncMutex::new(HashMap::new()),
            create_lock: AsyncMutex::new(()),
        })
    }

    /// Persist a queued Session and schedule its provisioning/run in the
    /// background; returns as soon as the insert is durable rather than
    /// waiting for any downstream work.
    pub async fn create_task(
        self: &Arc<Self>,
        request: CreateTaskRequest,
        idempotency_key: Option<String>,
    ) -> Result<SessionId, CoreError> {
        self.validate(&request)?;
        let body_fingerprint = fingerprint(&request);

        let _guard = self.create_lock.lock().await;
        if let Some(key) = &idempotency_key {
            if let Some((existing_id, stored_fingerprint)) =
                self.repo.idempotency_lookup_with_fingerprint(key)
            {
                if stored_fingerprint == body_fingerprint {
                    return Ok(existing_id);
                }
                return Err(CoreError::new(
                    ErrorKind::IdempotencyConflict,
                    "idempotency key reused with a different request body",
                ));
            }
        }

        let id = SessionId::generate(self.id_gen.as_ref());
        let now = self.clock.now();
        let runtime = self.resolve_runtime(request.runtime);
        let session = Session {
            id: id.clone(),
            tenant_id: request.tenant_id,
            project_id: request.project_id,
            task: request.task,
            agent: request.agent,
            runtime,
            repo: request.repo.clone(),
            delivery: request.delivery,
            workspace: None,
            status: SessionStatus::Queued,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
            error_kind: None,
            error_detail: None,
            attempt_count: 0,
            cleanup_requested: false,
        };
        self.repo.insert_session(session).map_err(from_storage)?;

        if let Some(key) = idempotency_key {
            self.repo
                .put_idempotency_record(&key, &id, &body_fingerprint, self.config.idempotency_ttl_ms)
                .map_err(from_storage)?;
        }
        drop(_guard);

        self.touch_repository_index(&request.repo);

        let this = self.clone();
        let drive_id = id.clone();
        tokio::spawn(async move {
            this.drive(drive_id).await;
        });

        Ok(id)
    }

    fn validate(&self, request: &CreateTaskRequest) -> Result<(), CoreError> {
        if request.task.prompt.trim().is_empty() {
            return Err(CoreError::validation("task.prompt must not be empty"));
        }
        if request.repo.mode == RepoMode::Git && request.repo.url.is_none() {
            return Err(CoreError::validation("repo.url is required for git-mode sessions"));
        }
        if let Some(allowed) = self.config.agent_schemas.get(&request.agent.agent_type) {
            for key in request.agent.settings.keys() {
                if !allowed.iter().any(|k| k == key) {
                    return Err(CoreError::validation(format!(
                        "unknown setting `{key}` for agent type `{}`",
                        request.agent.agent_type
                    )));
                }
            }
        }
        Ok(())
    }

    /// Runtime mode is a policy flag resolved from server config; only the
    /// non-policy details of the request survive.
    fn resolve_runtime(&self, requested: Option<RuntimeSpec>) -> RuntimeSpec {
        let requested = requested.unwrap_or(RuntimeSpec {
            runtime_type: self.config.runtime_type,
            devcontainer_path: None,
            resources: None,
        });
        RuntimeSpec {
            runtime_type: self.config.runtime_type,
            devcontainer_path: requested.devcontainer_path,
            resources: requested.resources,
        }
    }

    /// Record that a task referenced this repository so request-building
    /// UIs can rank it. Best-effort: a catalog miss never fails task
    /// creation.
    fn touch_repository_index(&self, repo: &RepoSpec) {
        let Some(url) = repo.url.as_deref() else { return };
        let now = self.clock.now();
        let existing = self
            .repo
            .list_repository_index()
            .into_iter()
            .find(|e| e.remote_url == url);
        let entry = match existing {
            Some(mut entry) => {
                entry.last_used_at = Some(now);
                entry
            }
            None => RepositoryIndexEntry {
                id: RepositoryId::generate(self.id_gen.as_ref()),
                display_name: display_name_for(url),
                scm_provider: scm_provider_for(url),
                remote_url: url.to_string(),
                default_branch: repo.branch.clone().unwrap_or_else(|| "main".into()),
                last_used_at: Some(now),
            },
        };
        if let Err(err) = self.repo.put_repository_index_entry(entry) {
            tracing::warn!(error = %err, url, "failed to update repository index");
        }
    }

    pub fn get_session(&self, id: &SessionId) -> Option<Session> {
        self.repo.get_session(id)
    }

    /// The Session read model: the persisted record plus a short
    /// recent-events tail, or the terminal `changes` aggregate.
    pub fn get_session_view(&self, id: &SessionId) -> Option<SessionView> {
        let session = self.repo.get_session(id)?;
        let events = if session.status.is_terminal() {
            // All events, so the changes aggregate sees every file_edit.
            self.repo.events_from(id, 0)
        } else {
            self.repo.recent_events(id, 3)
        };
        Some(SessionView::from_session(session, events))
    }

    pub fn list_sessions(&self, filter: &SessionFilter, page: PageRequest) -> Page<Session> {
        let page = page.clamped();
        let matching: Vec<Session> = self
            .repo
            .list_sessions()
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect();
        let total = matching.len() as u64;
        let items: Vec<Session> = matching
            .into_iter()
            .skip(page.offset())
            .take(page.per_page as usize)
            .collect();
        let next_page = if (page.offset() + items.len()) < total as usize {
            Some(page.page + 1)
        } else {
            None
        };
        Page {
            items,
            total,
            next_page,
        }
    }

    /// Last `n` events for active Sessions; empty once terminal.
    pub fn recent_events(&self, id: &SessionId, n: usize) -> Vec<EventRecord> {
        match self.repo.get_session(id) {
            Some(session) if !session.status.is_terminal() => self.repo.recent_events(id, n),
            _ => Vec::new(),
        }
    }

    /// Live events merged with backlog so the subscriber sees a gap-free
    /// sequence. Subscribes to the bus *before*
    /// fetching backlog; anything published in between shows up in both and
    /// is deduplicated by the sequence filter.
    pub fn subscribe(
        &self,
        id: &SessionId,
        from_sequence: Option<u64>,
    ) -> impl Stream<Item = EventRecord> + 'static {
        let rx = self.bus.subscribe(id);
        let backlog = match from_sequence {
            Some(seq) => self.repo.events_from(id, seq),
            None => Vec::new(),
        };
        let live_head = backlog.last().map(|e| e.sequence).or(from_sequence).unwrap_or(0);
        let live = ReceiverStream::new(rx).filter(move |record| record.sequence > live_head);
        tokio_stream::iter(backlog).chain(live)
    }

    /// Persist a status transition and emit the matching `status` event to
    /// the log and live subscribers; every transition carries an emitted
    /// status event.
    fn transition(
        &self,
        id: &SessionId,
        to: SessionStatus,
        error_kind: Option<ErrorKind>,
        error_detail: Option<String>,
    ) -> Result<(), CoreError> {
        self.repo
            .update_session_status(id, to, error_kind, error_detail)
            .map_err(from_storage)?;
        if let Err(err) = self.repo.append_event(id, Event::Status { status: to }) {
            tracing::warn!(error = %err, %id, "failed to append status event");
            return Ok(());
        }
        self.publish_head(id);
        Ok(())
    }

    fn publish_head(&self, id: &SessionId) {
        if let Some(record) = self.repo.recent_events(id, 1).into_iter().next_back() {
            self.bus.publish(record);
        }
    }

    pub async fn pause(&self, id: &SessionId) -> Result<(), CoreError> {
        self.transition(id, SessionStatus::Pausing, None, None)?;
        {
            let mut active = self.active.lock().await;
            if let Some(session) = active.get_mut(id) {
                session.running.signal(AgentSignal::Pause).await?;
            }
        }
        self.transition(id, SessionStatus::Paused, None, None)
    }

    pub async fn resume(&self, id: &SessionId) -> Result<(), CoreError> {
        self.transition(id, SessionStatus::Resuming, None, None)?;
        {
            let mut active = self.active.lock().await;
            if let Some(session) = active.get_mut(id) {
                session.running.signal(AgentSignal::Resume).await?;
            }
        }
        self.transition(id, SessionStatus::Running, None, None)
    }

    /// Graceful stop: transitions to `stopping`, asks the supervised agent
    /// to exit, and marks `stopped`. An agent that outlives the grace
    /// window is force-killed and the Session records `cancelled` instead.
    pub async fn stop(&self, id: &SessionId) -> Result<(), CoreError> {
        self.transition(id, SessionStatus::Stopping, None, None)?;

        let mut graceful = true;
        let active = self.active.lock().await.remove(id);
        if let Some(active) = active {
            graceful = active.running.stop().await?;
            drop(active._workspace_lease);
        }

        if graceful {
            self.transition(id, SessionStatus::Stopped, None, None)
        } else {
            self.transition(
                id,
                SessionStatus::Cancelled,
                None,
                Some("graceful-stop grace window expired; agent force-killed".into()),
            )
        }
    }

    /// Force cancellation from any non-terminal state.
    pub async fn cancel(&self, id: &SessionId) -> Result<(), CoreError> {
        let session = self
            .repo
            .get_session(id)
            .ok_or_else(|| CoreError::not_found(format!("session {id}")))?;

        match session.status {
            SessionStatus::Queued | SessionStatus::Provisioning => {
                self.transition(id, SessionStatus::Cancelled, None, None)
            }
            status if status.is_terminal() => Err(CoreError::conflicting_state(format!(
                "session {id} already {status}"
            ))),
            _ => {
                self.transition(id, SessionStatus::Stopping, None, None)?;
                let active = self.active.lock().await.remove(id);
                if let Some(active) = active {
                    active.running.stop().await?;
                    drop(active._workspace_lease);
                }
                self.transition(id, SessionStatus::Cancelled, None, None)
            }
        }
    }

    /// Background workflow: queued → provisioning → running → terminal.
    /// Transient Repository/Provisioner errors are retried with bounded
    /// backoff; everything else becomes a terminal `failed` status —
    /// unless the Session was cancelled out from under us, in which case
    /// the conflicting transition is simply dropped.
    async fn drive(self: Arc<Self>, id: SessionId) {
        if let Err(err) = self.drive_inner(&id).await {
            let already_terminal = self
                .repo
                .get_session(&id)
                .map(|s| s.status.is_terminal())
                .unwrap_or(true);
            if already_terminal {
                return;
            }
            let _ = self.repo.increment_attempt_count(&id);
            let _ = self.transition(&id, SessionStatus::Failed, Some(err.kind), Some(err.detail));
        }
    }

    async fn drive_inner(self: &Arc<Self>, id: &SessionId) -> Result<(), CoreError> {
        let session = self
            .repo
            .get_session(id)
            .ok_or_else(|| CoreError::not_found(format!("session {id}")))?;

        // Queue admission first: the Session stays `queued` while every
        // concurrency slot is taken.
        let permit = self.supervisor.acquire_slot().await?;

        self.transition(id, SessionStatus::Provisioning, None, None)?;

        let repo_spec = session.repo.clone();
        let provisioner = self.provisioner.clone();
        let session_id = id.clone();
        let retry_policy = self.config.retry_policy;
        let (workspace_result, lease) = retry_transient(retry_policy, || {
            let provisioner = provisioner.clone();
            let session_id = session_id.clone();
            let repo_spec = repo_spec.clone();
            async move { provisioner.provision(&session_id, &repo_spec).await }
        })
        .await?;

        self.repo
            .set_session_resolved_commit(id, &lease.key().commit_hash)
            .map_err(from_storage)?;
        self.repo
            .set_session_workspace(id, workspace_result.clone())
            .map_err(from_storage)?;

        self.transition(id, SessionStatus::Running, None, None)?;

        let spec = build_launch_spec(&session, &workspace_result, &self.config.launch);
        let running = self
            .supervisor
            .launch_with_permit(permit, self.repo.clone(), id.clone(), spec)
            .await?;
        let exit_rx = running.exit_watch();

        self.active.lock().await.insert(
            id.clone(),
            ActiveSession {
                running,
                _workspace_lease: lease,
            },
        );

        let this = self.clone();
        let watch_id = id.clone();
        tokio::spawn(async move {
            this.watch_exit(watch_id, exit_rx).await;
        });

        Ok(())
    }

    /// Observe the agent's exit and record the terminal state: exit code
    /// 0 → `completed`, anything else →
    /// `failed` with the code in `errorDetail`. Stop/cancel paths own
    /// their Sessions' transitions; this watcher only acts while the
    /// Session is still `running` or `pausing`.
    async fn watch_exit(self: Arc<Self>, id: SessionId, mut exit: watch::Receiver<Option<i32>>) {
        let code = loop {
            if let Some(code) = *exit.borrow_and_update() {
                break code;
            }
            if exit.changed().await.is_err() {
                return;
            }
        };

        let Some(session) = self.repo.get_session(&id) else {
            return;
        };
        if !matches!(session.status, SessionStatus::Running | SessionStatus::Pausing) {
            return;
        }

        // Drain the agent's remaining events first so the terminal status
        // event lands last in the log, and release the workspace lease
        // before recording it so the cache entry is eviction-eligible the
        // moment observers see the Session finish.
        if let Some(active) = self.active.lock().await.remove(&id) {
            active.running.drained().await;
            drop(active._workspace_lease);
        }

        let result = if code == 0 {
            self.transition(&id, SessionStatus::Completed, None, None)
        } else {
            self.transition(
                &id,
                SessionStatus::Failed,
                Some(ErrorKind::Internal),
                Some(format!("agent exited with code {code}")),
            )
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, %id, "failed to record agent exit");
        }
    }
}

fn display_name_for(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .trim_end_matches(".git")
        .to_string()
}

fn scm_provider_for(url: &str) -> String {
    if url.contains("github.com") {
        "github".into()
    } else if url.contains("gitlab") {
        "gitlab".into()
    } else {
        "git".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_adapters::launcher::fake::FakeAgentLauncher;
    use forge_adapters::provider::CopyProvider;
    use forge_adapters::vcs::fake::FakeVcsAdapter;
    use forge_adapters::{SnapshotProvider, VcsAdapter};
    use forge_core::{RepoMode, SystemClock, UuidIdGen};
    use forge_storage::RepositoryPaths;

    fn build_manager(
        tmp: &std::path::Path,
        launcher: Arc<dyn AgentLauncher>,
        max_agents: usize,
    ) -> Arc<SessionManager<SystemClock, FileSessionRepository<SystemClock>>> {
        let repo = Arc::new(
            FileSessionRepository::open(&RepositoryPaths::under(tmp), SystemClock).expect("open"),
        );
        let cache = Arc::new(forge_cache::SnapshotCache::new(
            repo.clone(),
            QuotaConfig {
                global_bytes: 1_000_000,
                per_repo_bytes: None,
            },
        ));
        let vcs: Arc<dyn VcsAdapter> = Arc::new(
            FakeVcsAdapter::new().with_ref("https://example.com/r.git", "main", "c1"),
        );
        let providers: Vec<Arc<dyn SnapshotProvider>> =
            vec![Arc::new(CopyProvider::new(tmp.join("snapshots")))];
        let provisioner = Arc::new(WorkspaceProvisioner::new(
            cache,
            vcs,
            providers,
            tmp.join("checkouts"),
            tmp.join("workspaces"),
        ));
        let bus = Arc::new(EventBus::new(16));
        SessionManager::new(
            repo,
            provisioner,
            bus,
            launcher,
            Arc::new(UuidIdGen),
            SystemClock,
            SessionManagerConfig {
                max_concurrent_agents: max_agents,
                ..Default::default()
            },
        )
    }

    fn request() -> CreateTaskRequest {
        CreateTaskRequest {
            tenant_id: None,
            project_id: None,
            task: TaskSpec {
                prompt: "do the thing".into(),
                labels: Default::default(),
                attachments: Vec::new(),
            },
            agent: AgentSpec {
                agent_type: "test-agent".into(),
                version: None,
                settings: Default::default(),
            },
            runtime: None,
            repo: RepoSpec {
                mode: RepoMode::Git,
                url: Some("https://example.com/r.git".into()),
                branch: Some("main".into()),
                commit: None,
            },
            delivery: DeliverySpec {
                mode: forge_core::DeliveryMode::Pr,
                target_branch: None,
            },
        }
    }

    async fn wait_for_status(
        manager: &Arc<SessionManager<SystemClock, FileSessionRepository<SystemClock>>>,
        id: &SessionId,
        status: SessionStatus,
    ) -> Session {
        for _ in 0..100 {
            let session = manager.get_session(id).expect("session exists");
            if session.status == status {
                return session;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!(
            "session never reached {status}, currently {}",
            manager.get_session(id).expect("session").status
        );
    }

    #[tokio::test]
    async fn create_task_persists_queued_session_and_eventually_runs() {
        let tmp = tempfile::tempdir().expect("tmp");
        let launcher = Arc::new(FakeAgentLauncher::default());
        let manager = build_manager(tmp.path(), launcher, 2);

        let id = manager.create_task(request(), None).await.expect("create");
        let session = wait_for_status(&manager, &id, SessionStatus::Running).await;
        assert!(session.workspace.is_some());
        assert!(session.started_at.is_some());

        // Status events trace the legal path through the state machine.
        let statuses: Vec<SessionStatus> = manager
            .subscribe(&id, Some(0))
            .take(2)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .filter_map(|r| match r.event {
                Event::Status { status } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Provisioning,
                SessionStatus::Running,
            ]
        );
    }

    #[tokio::test]
    async fn agent_exit_zero_completes_the_session() {
        let tmp = tempfile::tempdir().expect("tmp");
        let launcher = Arc::new(FakeAgentLauncher::default().with_exit_code(0));
        let manager = build_manager(tmp.path(), launcher, 2);

        let id = manager.create_task(request(), None).await.expect("create");
        let session = wait_for_status(&manager, &id, SessionStatus::Completed).await;
        assert!(session.ended_at.is_some());
        assert!(manager.recent_events(&id, 3).is_empty());
    }

    #[tokio::test]
    async fn agent_nonzero_exit_fails_the_session_with_exit_code_detail() {
        let tmp = tempfile::tempdir().expect("tmp");
        let launcher = Arc::new(FakeAgentLauncher::default().with_exit_code(7));
        let manager = build_manager(tmp.path(), launcher, 2);

        let id = manager.create_task(request(), None).await.expect("create");
        let session = wait_for_status(&manager, &id, SessionStatus::Failed).await;
        assert!(session.error_detail.expect("detail").contains("7"));
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_and_signals_agent() {
        let tmp = tempfile::tempdir().expect("tmp");
        let launcher = Arc::new(FakeAgentLauncher::default());
        let signals = launcher.signals.clone();
        let manager = build_manager(tmp.path(), launcher, 2);

        let id = manager.create_task(request(), None).await.expect("create");
        wait_for_status(&manager, &id, SessionStatus::Running).await;

        manager.pause(&id).await.expect("pause");
        assert_eq!(
            manager.get_session(&id).expect("session").status,
            SessionStatus::Paused
        );
        manager.resume(&id).await.expect("resume");
        assert_eq!(
            manager.get_session(&id).expect("session").status,
            SessionStatus::Running
        );
        assert_eq!(
            signals.lock().as_slice(),
            &[AgentSignal::Pause, AgentSignal::Resume]
        );

        manager.stop(&id).await.expect("stop");
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_returns_same_session_id() {
        let tmp = tempfile::tempdir().expect("tmp");
        let launcher = Arc::new(FakeAgentLauncher::default());
        let manager = build_manager(tmp.path(), launcher, 2);

        let first = manager
            .create_task(request(), Some("key-1".into()))
            .await
            .expect("create");
        let second = manager
            .create_task(request(), Some("key-1".into()))
            .await
            .expect("create");
        assert_eq!(first, second);
        assert_eq!(
            manager
                .list_sessions(&SessionFilter::default(), PageRequest::default())
                .total,
            1
        );
    }

    #[tokio::test]
    async fn reused_key_with_different_body_is_a_conflict() {
        let tmp = tempfile::tempdir().expect("tmp");
        let launcher = Arc::new(FakeAgentLauncher::default());
        let manager = build_manager(tmp.path(), launcher, 2);

        manager
            .create_task(request(), Some("key-1".into()))
            .await
            .expect("create");

        let mut other = request();
        other.task.prompt = "do a different thing".into();
        let err = manager
            .create_task(other, Some("key-1".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::IdempotencyConflict);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let tmp = tempfile::tempdir().expect("tmp");
        let launcher = Arc::new(FakeAgentLauncher::default());
        let manager = build_manager(tmp.path(), launcher, 2);

        let mut bad = request();
        bad.task.prompt = "  ".into();
        let err = manager.create_task(bad, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn unknown_agent_setting_is_rejected_when_schema_registered() {
        let tmp = tempfile::tempdir().expect("tmp");
        let repo = Arc::new(
            FileSessionRepository::open(&RepositoryPaths::under(tmp.path()), SystemClock)
                .expect("open"),
        );
        let cache = Arc::new(forge_cache::SnapshotCache::new(
            repo.clone(),
            QuotaConfig {
                global_bytes: 1_000_000,
                per_repo_bytes: None,
            },
        ));
        let vcs: Arc<dyn VcsAdapter> = Arc::new(FakeVcsAdapter::new());
        let providers: Vec<Arc<dyn SnapshotProvider>> =
            vec![Arc::new(CopyProvider::new(tmp.path().join("snapshots")))];
        let provisioner = Arc::new(WorkspaceProvisioner::new(
            cache,
            vcs,
            providers,
            tmp.path().join("checkouts"),
            tmp.path().join("workspaces"),
        ));
        let bus = Arc::new(EventBus::new(16));
        let mut config = SessionManagerConfig::default();
        config
            .agent_schemas
            .insert("test-agent".into(), vec!["model".into()]);
        let manager = SessionManager::new(
            repo,
            provisioner,
            bus,
            Arc::new(FakeAgentLauncher::default()),
            Arc::new(UuidIdGen),
            SystemClock,
            config,
        );

        let mut bad = request();
        bad.agent
            .settings
            .insert("verbosity".into(), serde_json::json!("high"));
        let err = manager.create_task(bad, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn create_task_updates_repository_index() {
        let tmp = tempfile::tempdir().expect("tmp");
        let launcher = Arc::new(FakeAgentLauncher::default());
        let manager = build_manager(tmp.path(), launcher, 2);

        manager.create_task(request(), None).await.expect("create");
        let entries = manager.repo.list_repository_index();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].remote_url, "https://example.com/r.git");
        assert_eq!(entries[0].display_name, "r");
        assert!(entries[0].last_used_at.is_some());
    }

    #[tokio::test]
    async fn list_sessions_filters_by_status_and_paginates() {
        let tmp = tempfile::tempdir().expect("tmp");
        let launcher = Arc::new(FakeAgentLauncher::default());
        let manager = build_manager(tmp.path(), launcher, 4);

        for _ in 0..3 {
            manager.create_task(request(), None).await.expect("create");
        }
        let all = manager.list_sessions(&SessionFilter::default(), PageRequest::default());
        assert_eq!(all.total, 3);

        let first_page = manager.list_sessions(
            &SessionFilter::default(),
            PageRequest { page: 1, per_page: 2 },
        );
        assert_eq!(first_page.items.len(), 2);
        assert_eq!(first_page.next_page, Some(2));

        let cancelled = manager.list_sessions(
            &SessionFilter {
                status: Some(SessionStatus::Cancelled),
                ..Default::default()
            },
            PageRequest::default(),
        );
        assert_eq!(cancelled.total, 0);
    }

    #[tokio::test]
    async fn missing_session_cancel_is_not_found() {
        let tmp = tempfile::tempdir().expect("tmp");
        let launcher = Arc::new(FakeAgentLauncher::default());
        let manager = build_manager(tmp.path(), launcher, 2);
        let err = manager.cancel(&SessionId::new("missing")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
