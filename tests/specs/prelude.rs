//! Shared harness for the end-to-end scenarios.

use forge_adapters::launcher::fake::FakeAgentLauncher;
use forge_adapters::provider::CopyProvider;
use forge_adapters::vcs::fake::FakeVcsAdapter;
use forge_adapters::{AgentLauncher, EventBus, SnapshotProvider, VcsAdapter};
use forge_cache::{QuotaConfig, SnapshotCache};
use forge_core::{
    AgentSpec, DeliveryMode, DeliverySpec, RepoMode, RepoSpec, Session, SessionId, SessionStatus,
    SystemClock, TaskSpec, UuidIdGen,
};
use forge_engine::{
    CreateTaskRequest, SessionManager, SessionManagerConfig, WorkspaceProvisioner,
};
use forge_storage::{FileSessionRepository, RepositoryPaths};
use std::sync::Arc;
use std::time::Duration;

pub const REPO_URL: &str = "https://example.com/repo.git";
pub const COMMIT: &str = "c1";

pub type TestManager = SessionManager<SystemClock, FileSessionRepository<SystemClock>>;

pub struct Harness {
    pub manager: Arc<TestManager>,
    pub repo: Arc<FileSessionRepository<SystemClock>>,
    pub vcs: Arc<FakeVcsAdapter>,
    _tmp: tempfile::TempDir,
}

impl Harness {
    /// A full stack over a temp state dir: real repository and cache, fake
    /// VCS resolving `main` to [`COMMIT`], the given fake agent launcher.
    pub fn new(max_agents: usize, launcher: Arc<dyn AgentLauncher>) -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(
            FileSessionRepository::open(&RepositoryPaths::under(tmp.path()), SystemClock)
                .expect("open repository"),
        );
        let cache = Arc::new(SnapshotCache::new(
            repo.clone(),
            QuotaConfig {
                global_bytes: 10 * 1024 * 1024,
                per_repo_bytes: None,
            },
        ));
        let vcs = Arc::new(
            FakeVcsAdapter::new()
                .with_ref(REPO_URL, "main", COMMIT)
                .with_ref("https://example.com/other.git", "main", "d1"),
        );
        let providers: Vec<Arc<dyn SnapshotProvider>> =
            vec![Arc::new(CopyProvider::new(tmp.path().join("snapshots")))];
        let vcs_adapter: Arc<dyn VcsAdapter> = vcs.clone();
        let provisioner = Arc::new(WorkspaceProvisioner::new(
            cache,
            vcs_adapter,
            providers,
            tmp.path().join("checkouts"),
            tmp.path().join("workspaces"),
        ));
        let bus = Arc::new(EventBus::new(64));
        let manager = SessionManager::new(
            repo.clone(),
            provisioner,
            bus,
            launcher,
            Arc::new(UuidIdGen),
            SystemClock,
            SessionManagerConfig {
                max_concurrent_agents: max_agents,
                ..Default::default()
            },
        );
        Self {
            manager,
            repo,
            vcs,
            _tmp: tmp,
        }
    }

    pub fn checkout_count(&self) -> usize {
        self.vcs.checkouts.lock().len()
    }

    pub async fn wait_for_status(&self, id: &SessionId, status: SessionStatus) -> Session {
        for _ in 0..200 {
            let session = self.manager.get_session(id).expect("session exists");
            if session.status == status {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "session {id} never reached {status}; currently {}",
            self.manager.get_session(id).expect("session").status
        );
    }
}

/// A task request against [`REPO_URL`]`@main`.
pub fn request(prompt: &str) -> CreateTaskRequest {
    CreateTaskRequest {
        tenant_id: None,
        project_id: None,
        task: TaskSpec {
            prompt: prompt.into(),
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
            url: Some(REPO_URL.into()),
            branch: Some("main".into()),
            commit: None,
        },
        delivery: DeliverySpec {
            mode: DeliveryMode::Pr,
            target_branch: None,
        },
    }
}

/// Launcher whose agent replays `events` and exits 0 on its own.
pub fn completing_launcher(events: Vec<forge_core::Event>) -> Arc<FakeAgentLauncher> {
    Arc::new(FakeAgentLauncher::new(events).with_exit_code(0))
}

/// Launcher whose agent stays alive until stopped.
pub fn long_running_launcher() -> Arc<FakeAgentLauncher> {
    Arc::new(FakeAgentLauncher::default())
}
