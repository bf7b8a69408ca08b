// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent launcher: spawns the recorder-wrapped agent process
//! and exposes a handle the Agent Supervisor uses to deliver lifecycle
//! signals and to observe the process exit.

use crate::parser::LineParser;
use crate::subprocess::AGENT_STOP_GRACE;
use async_trait::async_trait;
use forge_core::Event;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("signal delivery failed: {0}")]
    SignalFailed(String),
    #[error("agent already stopped")]
    AlreadyStopped,
}

/// Lifecycle signals the Session Manager can deliver to a running agent.
/// `Pause`/`Resume` map to job-control signals; `Stop` requests graceful
/// exit; `Kill` force-terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentSignal {
    Pause,
    Resume,
    Stop,
    Kill,
}

impl AgentSignal {
    fn as_kill_flag(&self) -> &'static str {
        match self {
            AgentSignal::Pause => "-STOP",
            AgentSignal::Resume => "-CONT",
            AgentSignal::Stop => "-TERM",
            AgentSignal::Kill => "-KILL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workspace_path: PathBuf,
    pub prompt: String,
}

/// Signal delivery for a running agent process.
#[async_trait]
pub trait RunningAgent: Send {
    async fn signal(&mut self, signal: AgentSignal) -> Result<(), LauncherError>;
}

/// A launched agent: its pid (when backed by a real process), a watch
/// channel that resolves to the exit code once the process terminates, and
/// the signal path back into it.
pub struct LaunchedAgent {
    pub pid: Option<u32>,
    exit: watch::Receiver<Option<i32>>,
    inner: Box<dyn RunningAgent>,
}

impl LaunchedAgent {
    pub fn new(
        pid: Option<u32>,
        exit: watch::Receiver<Option<i32>>,
        inner: Box<dyn RunningAgent>,
    ) -> Self {
        Self { pid, exit, inner }
    }

    /// A receiver that yields `Some(exit_code)` once the agent terminates.
    /// Cloneable so an exit watcher can outlive this handle.
    pub fn exit_watch(&self) -> watch::Receiver<Option<i32>> {
        self.exit.clone()
    }

    pub async fn signal(&mut self, signal: AgentSignal) -> Result<(), LauncherError> {
        self.inner.signal(signal).await
    }

    /// Ask the agent to stop, waiting up to [`AGENT_STOP_GRACE`] before
    /// escalating to `Kill`. Returns `true` when the agent exited within
    /// the grace window, `false` when it had to be force-killed.
    pub async fn stop(&mut self) -> Result<bool, LauncherError> {
        if self.exit.borrow().is_some() {
            return Ok(true);
        }
        self.inner.signal(AgentSignal::Stop).await?;
        if self.await_exit(AGENT_STOP_GRACE).await {
            return Ok(true);
        }
        self.inner.signal(AgentSignal::Kill).await?;
        self.await_exit(Duration::from_secs(5)).await;
        Ok(false)
    }

    async fn await_exit(&mut self, window: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            if self.exit.borrow_and_update().is_some() {
                return true;
            }
            match tokio::time::timeout_at(deadline, self.exit.changed()).await {
                Ok(Ok(())) => continue,
                // Sender dropped: the process owner task is gone, treat as exited.
                Ok(Err(_)) => return true,
                Err(_elapsed) => return false,
            }
        }
    }
}

#[async_trait]
pub trait AgentLauncher: Send + Sync {
    /// Launch the agent described by `spec`, forwarding every recognized
    /// JSON line of its stdout to `event_tx` as a [`forge_core::Event`].
    /// The event channel stays open for exactly as long as the agent runs.
    async fn launch(
        &self,
        spec: LaunchSpec,
        event_tx: mpsc::Sender<Event>,
    ) -> Result<LaunchedAgent, LauncherError>;
}

/// Production launcher: spawns `spec.command` as a real child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessAgentLauncher;

/// Delivers signals to the child by pid. The child itself is owned by the
/// reaper task (which must hold it to `wait()` on it), so signals go
/// through `kill(1)` rather than `Child` methods.
struct SubprocessRunningAgent {
    pid: Option<u32>,
}

#[async_trait]
impl RunningAgent for SubprocessRunningAgent {
    async fn signal(&mut self, signal: AgentSignal) -> Result<(), LauncherError> {
        let Some(pid) = self.pid else {
            return Err(LauncherError::AlreadyStopped);
        };
        let status = Command::new("kill")
            .arg(signal.as_kill_flag())
            .arg(pid.to_string())
            .status()
            .await
            .map_err(|e| LauncherError::SignalFailed(e.to_string()))?;
        if !status.success() {
            return Err(LauncherError::SignalFailed(format!(
                "kill {} {pid} exited with {status}",
                signal.as_kill_flag()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AgentLauncher for SubprocessAgentLauncher {
    async fn launch(
        &self,
        spec: LaunchSpec,
        event_tx: mpsc::Sender<Event>,
    ) -> Result<LaunchedAgent, LauncherError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .current_dir(&spec.workspace_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| LauncherError::SpawnFailed(e.to_string()))?;
        let pid = child.id();

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            let prompt = spec.prompt.clone();
            tokio::spawn(async move {
                let _ = stdin.write_all(prompt.as_bytes()).await;
            });
        }

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut parser = LineParser::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    for event in parser.feed_line(&line) {
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }

        // Reaper task: the only owner of the child, publishes the exit code.
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(_) => -1,
            };
            let _ = exit_tx.send(Some(code));
        });

        Ok(LaunchedAgent::new(
            pid,
            exit_rx,
            Box::new(SubprocessRunningAgent { pid }),
        ))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Keeps the event channel open and reports signals; `Stop`/`Kill`
    /// publish the configured exit code and close the channel, mirroring a
    /// real process whose stdout closes when it dies.
    pub struct FakeRunningAgent {
        event_tx: Option<mpsc::Sender<Event>>,
        exit_tx: watch::Sender<Option<i32>>,
        exit_code_on_stop: i32,
        pub signals: Arc<Mutex<Vec<AgentSignal>>>,
    }

    #[async_trait]
    impl RunningAgent for FakeRunningAgent {
        async fn signal(&mut self, signal: AgentSignal) -> Result<(), LauncherError> {
            self.signals.lock().push(signal);
            if matches!(signal, AgentSignal::Stop | AgentSignal::Kill) {
                // Closing the event channel mirrors stdout closing on exit.
                drop(self.event_tx.take());
                let _ = self.exit_tx.send(Some(self.exit_code_on_stop));
            }
            Ok(())
        }
    }

    /// Deterministic launcher for tests: replays a fixed script of events
    /// instead of spawning a real process. With `exit_code` set, the agent
    /// "runs to completion" immediately after its script; otherwise it
    /// stays alive until stopped.
    #[derive(Default)]
    pub struct FakeAgentLauncher {
        pub scripted_events: Vec<Event>,
        pub exit_code: Option<i32>,
        pub signals: Arc<Mutex<Vec<AgentSignal>>>,
    }

    impl FakeAgentLauncher {
        pub fn new(scripted_events: Vec<Event>) -> Self {
            Self {
                scripted_events,
                ..Default::default()
            }
        }

        /// The agent exits on its own with `code` after replaying its script.
        pub fn with_exit_code(mut self, code: i32) -> Self {
            self.exit_code = Some(code);
            self
        }
    }

    #[async_trait]
    impl AgentLauncher for FakeAgentLauncher {
        async fn launch(
            &self,
            _spec: LaunchSpec,
            event_tx: mpsc::Sender<Event>,
        ) -> Result<LaunchedAgent, LauncherError> {
            for event in self.scripted_events.clone() {
                let _ = event_tx.send(event.clone()).await;
            }
            let (exit_tx, exit_rx) = watch::channel(None);
            let held_tx = match self.exit_code {
                Some(code) => {
                    let _ = exit_tx.send(Some(code));
                    None
                }
                None => Some(event_tx),
            };
            Ok(LaunchedAgent::new(
                None,
                exit_rx,
                Box::new(FakeRunningAgent {
                    event_tx: held_tx,
                    exit_tx,
                    exit_code_on_stop: 0,
                    signals: self.signals.clone(),
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeAgentLauncher;
    use super::*;
    use forge_core::LogLevel;

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
    async fn fake_launcher_replays_scripted_events() {
        let launcher = FakeAgentLauncher::new(vec![Event::Log {
            level: LogLevel::Info,
            message: "booting".into(),
        }]);
        let (tx, mut rx) = mpsc::channel(8);
        let mut agent = launcher.launch(spec(), tx).await.expect("launch");
        let event = rx.recv().await.expect("event");
        assert!(matches!(event, Event::Log { .. }));
        agent.stop().await.expect("stop");
        assert!(agent.exit_watch().borrow().is_some());
    }

    #[tokio::test]
    async fn scripted_exit_resolves_exit_watch_without_stop() {
        let launcher = FakeAgentLauncher::new(vec![]).with_exit_code(3);
        let (tx, mut rx) = mpsc::channel(8);
        let agent = launcher.launch(spec(), tx).await.expect("launch");
        assert_eq!(*agent.exit_watch().borrow(), Some(3));
        // Channel closed: the agent is done emitting.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn pause_and_resume_are_recorded_and_leave_agent_running() {
        let launcher = FakeAgentLauncher::new(vec![]);
        let signals = launcher.signals.clone();
        let (tx, _rx) = mpsc::channel(8);
        let mut agent = launcher.launch(spec(), tx).await.expect("launch");

        agent.signal(AgentSignal::Pause).await.expect("pause");
        agent.signal(AgentSignal::Resume).await.expect("resume");
        assert!(agent.exit_watch().borrow().is_none());
        assert_eq!(
            signals.lock().as_slice(),
            &[AgentSignal::Pause, AgentSignal::Resume]
        );

        agent.stop().await.expect("stop");
    }
}
