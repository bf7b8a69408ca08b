// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `forge repo` — the repository catalog backing request-building UIs.

use crate::client::DaemonClient;
use crate::output;
use anyhow::{bail, Result};
use clap::Subcommand;
use forge_daemon::{Query, Request, Response};

#[derive(Debug, Subcommand)]
pub enum RepoCommand {
    /// List known repositories
    List,
    /// Register a repository without running a task
    Import {
        remote_url: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        branch: Option<String>,
    },
}

pub async fn run(client: &DaemonClient, command: RepoCommand, json: bool) -> Result<()> {
    match command {
        RepoCommand::List => {
            let response = client
                .request(&Request::Query {
                    query: Query::ListRepositories,
                })
                .await?;
            match response {
                Response::Repositories { repositories } => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&repositories)?);
                    } else if repositories.is_empty() {
                        println!("no repositories");
                    } else {
                        for entry in &repositories {
                            println!("{}", output::repository_line(entry));
                        }
                    }
                    Ok(())
                }
                other => bail!("unexpected response: {other:?}"),
            }
        }
        RepoCommand::Import {
            remote_url,
            name,
            branch,
        } => {
            match client
                .request(&Request::RepoImport {
                    remote_url,
                    display_name: name,
                    default_branch: branch,
                })
                .await?
            {
                Response::Ok => Ok(()),
                other => bail!("unexpected response: {other:?}"),
            }
        }
    }
}
