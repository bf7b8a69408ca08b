// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands.

use std::path::PathBuf;
use std::time::Duration;

use forge_core::{EventRecord, Problem};
use forge_daemon::protocol::{self, WireError};
use forge_daemon::{Request, Response};
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::UnixStream;

/// Timeout for IPC requests, overridable via `FORGE_TIMEOUT_IPC_MS`.
pub fn timeout_ipc() -> Duration {
    std::env::var("FORGE_TIMEOUT_IPC_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running (start it with `forged`)")]
    DaemonNotRunning,

    #[error("could not determine state directory")]
    NoStateDir,

    #[error("protocol error: {0}")]
    Wire(#[from] WireError),

    #[error("{}", problem_message(.0))]
    Problem(Box<Problem>),

    #[error("unexpected response from daemon")]
    UnexpectedResponse,
}

fn problem_message(problem: &Problem) -> String {
    format!("{} ({})", problem.detail, problem.title)
}

/// Resolve state directory the same way the daemon does:
/// FORGE_STATE_DIR > XDG_STATE_HOME/forge > ~/.local/state/forge
pub fn state_dir() -> Result<PathBuf, ClientError> {
    if let Ok(dir) = std::env::var("FORGE_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("forge"));
    }
    let home = std::env::var("HOME").map_err(|_| ClientError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/forge"))
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn connect() -> Result<Self, ClientError> {
        let socket_path = state_dir()?.join("daemon.sock");
        if !socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }
        Ok(Self { socket_path })
    }

    async fn open(&self) -> Result<UnixStream, ClientError> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|_| ClientError::DaemonNotRunning)
    }

    /// Send one request, read one response. `Problem` responses become
    /// typed errors so command code only handles the success shape.
    pub async fn request(&self, request: &Request) -> Result<Response, ClientError> {
        let stream = self.open().await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        protocol::send_frame(&mut writer, request).await?;
        let response: Response =
            tokio::time::timeout(timeout_ipc(), protocol::recv_frame(&mut reader))
                .await
                .map_err(|_| WireError::Timeout)??;
        match response {
            Response::Problem { problem } => Err(ClientError::Problem(problem)),
            response => Ok(response),
        }
    }

    /// Subscribe to a Session's event stream, invoking `on_event` per
    /// frame until the daemon closes the stream. No read timeout: a
    /// healthy stream may be idle for as long as the agent thinks.
    pub async fn subscribe(
        &self,
        id: &str,
        from_sequence: Option<u64>,
        mut on_event: impl FnMut(EventRecord),
    ) -> Result<(), ClientError> {
        let stream = self.open().await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        protocol::send_frame(
            &mut writer,
            &Request::Subscribe {
                id: id.to_string(),
                from_sequence,
            },
        )
        .await?;

        loop {
            match protocol::recv_frame::<_, Response>(&mut reader).await {
                Ok(Response::Event { event }) => on_event(*event),
                Ok(Response::StreamEnd) => return Ok(()),
                Ok(Response::Problem { problem }) => return Err(ClientError::Problem(problem)),
                Ok(_) => return Err(ClientError::UnexpectedResponse),
                Err(WireError::Closed) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
