// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `forge daemon` — operate the background daemon.

use crate::client::DaemonClient;
use anyhow::{bail, Result};
use clap::Subcommand;
use forge_core::time_fmt::format_elapsed;
use forge_daemon::{Query, Request, Response};

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Check the daemon is alive
    Ping,
    /// Show daemon status
    Status,
    /// Ask the daemon to shut down
    Stop,
}

pub async fn run(client: &DaemonClient, command: DaemonCommand, json: bool) -> Result<()> {
    match command {
        DaemonCommand::Ping => match client.request(&Request::Ping).await? {
            Response::Pong => {
                println!("pong");
                Ok(())
            }
            other => bail!("unexpected response: {other:?}"),
        },
        DaemonCommand::Status => {
            let response = client
                .request(&Request::Query {
                    query: Query::Status,
                })
                .await?;
            match response {
                Response::Status {
                    version,
                    uptime_secs,
                    sessions_active,
                    sessions_total,
                    cache_entries,
                    cache_bytes,
                } => {
                    if json {
                        println!(
                            "{}",
                            serde_json::json!({
                                "version": version,
                                "uptime_secs": uptime_secs,
                                "sessions_active": sessions_active,
                                "sessions_total": sessions_total,
                                "cache_entries": cache_entries,
                                "cache_bytes": cache_bytes,
                            })
                        );
                    } else {
                        println!("forged {version}, up {}", format_elapsed(uptime_secs));
                        println!("sessions: {sessions_active} active / {sessions_total} total");
                        println!(
                            "snapshot cache: {cache_entries} entries, {} MiB",
                            cache_bytes / (1024 * 1024)
                        );
                    }
                    Ok(())
                }
                other => bail!("unexpected response: {other:?}"),
            }
        }
        DaemonCommand::Stop => match client.request(&Request::Shutdown).await? {
            Response::ShuttingDown => {
                println!("daemon shutting down");
                Ok(())
            }
            other => bail!("unexpected response: {other:?}"),
        },
    }
}
