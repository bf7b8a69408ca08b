// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forge Daemon (forged)
//!
//! Background process that owns the session orchestration core and serves
//! it over a Unix socket.
//!
//! Architecture:
//! - Listener task: spawned task handling socket I/O, dispatching onto the
//!   Session Manager
//! - Session Manager workflows: background tasks driving each Session
//!   through its lifecycle
//! - Checkpoint task: periodic durable snapshot of the Repository Layer

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;
mod listener;
mod protocol;

use std::sync::Arc;
use std::time::Duration;

use lifecycle::{Config, LifecycleError, StartupResult};
use listener::{ListenCtx, Listener};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("forged {}", protocol::PROTOCOL_VERSION);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("forged {}", protocol::PROTOCOL_VERSION);
                println!("Forge daemon - runs the session orchestration core behind a Unix socket");
                println!();
                println!("USAGE:");
                println!("    forged");
                println!();
                println!("The daemon is typically started by the `forge` CLI and should not");
                println!("be invoked directly.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: forged [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    rotate_log_if_needed(&config.log_path);
    let _log_guard = setup_logging(&config)?;

    info!("starting daemon");

    let StartupResult { daemon, listener } = match lifecycle::startup(&config).await {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("forged is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start daemon: {}", e);
            return Err(e.into());
        }
    };

    let shutdown_notify = Arc::new(Notify::new());
    let ctx = Arc::new(ListenCtx {
        manager: daemon.manager.clone(),
        repo: daemon.repo.clone(),
        start_time: daemon.start_time,
        shutdown: Arc::clone(&shutdown_notify),
    });
    tokio::spawn(Listener::new(listener, ctx).run());

    spawn_checkpoint(daemon.repo.clone());
    spawn_retention_sweep(
        daemon.repo.clone(),
        config.settings.purge_terminal_events_after_days,
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "daemon ready");
    println!("READY");

    tokio::select! {
        _ = shutdown_notify.notified() => {
            info!("shutdown requested via command");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down");
        }
    }

    daemon.shutdown()?;
    info!("daemon stopped");
    Ok(())
}

/// Checkpoint interval (60 seconds)
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically snapshot the materialized state and prune the journal.
/// Pruning happens only after the checkpoint is fully durable, so a
/// crash mid-checkpoint still recovers from journal replay.
fn spawn_checkpoint(repo: Arc<lifecycle::DaemonRepository>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHECKPOINT_INTERVAL);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            interval.tick().await;

            let repo_for_io = repo.clone();
            let result =
                tokio::task::spawn_blocking(move || repo_for_io.checkpoint_sync()).await;
            match result {
                Ok(Ok(checkpoint)) => {
                    tracing::debug!(
                        seq = checkpoint.seq,
                        size_bytes = checkpoint.size_bytes,
                        "checkpoint complete"
                    );
                    if let Err(e) = repo.prune_journal(checkpoint.seq) {
                        tracing::warn!(error = %e, "failed to prune journal after checkpoint");
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "checkpoint failed, journal not pruned");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "checkpoint task panicked");
                }
            }
        }
    });
}

/// How often the retention sweep looks for purgeable terminal Sessions.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Purge event logs of Sessions that have been terminal longer than the
/// configured window. Off by default; the Session records themselves are
/// never deleted.
fn spawn_retention_sweep(repo: Arc<lifecycle::DaemonRepository>, after_days: Option<u64>) {
    let Some(days) = after_days else { return };
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(days as i64);
            for session in repo.list_sessions() {
                let expired = session.status.is_terminal()
                    && !session.cleanup_requested
                    && session.ended_at.is_some_and(|t| t < cutoff);
                if expired {
                    if let Err(e) = repo.purge_session_events(&session.id) {
                        tracing::warn!(error = %e, id = %session.id, "retention purge failed");
                    }
                }
            }
        }
    });
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` → `daemon.log.1` → `daemon.log.2` → `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
