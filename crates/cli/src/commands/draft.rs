// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `forge draft` — saved task configurations that never execute.

use crate::client::DaemonClient;
use crate::output;
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use forge_core::{RepoMode, RepoSpec};
use forge_daemon::{DraftBody, Query, Request, Response};

#[derive(Debug, Subcommand)]
pub enum DraftCommand {
    /// Save a new draft
    Create(DraftArgs),
    /// Update an existing draft
    Update {
        id: String,
        #[command(flatten)]
        args: DraftArgs,
    },
    /// List drafts
    List,
    /// Show one draft
    Get { id: String },
    /// Hard-delete a draft
    Delete { id: String },
}

#[derive(Debug, Args)]
pub struct DraftArgs {
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    repo_url: Option<String>,
    #[arg(long)]
    branch: Option<String>,
    /// Owning tenant/project scope, e.g. `acme/widgets`
    #[arg(long, default_value = "")]
    scope: String,
}

fn body(args: &DraftArgs) -> DraftBody {
    DraftBody {
        owner_scope: args.scope.clone(),
        prompt: args.prompt.clone(),
        repo: args.repo_url.as_ref().map(|url| RepoSpec {
            mode: RepoMode::Git,
            url: Some(url.clone()),
            branch: args.branch.clone(),
            commit: None,
        }),
        agent: None,
        runtime: None,
        delivery: None,
    }
}

pub async fn run(client: &DaemonClient, command: DraftCommand, json: bool) -> Result<()> {
    match command {
        DraftCommand::Create(args) => {
            let response = client
                .request(&Request::DraftCreate {
                    draft: Box::new(body(&args)),
                })
                .await?;
            print_draft(response, json)
        }
        DraftCommand::Update { id, args } => {
            let response = client
                .request(&Request::DraftUpdate {
                    id,
                    draft: Box::new(body(&args)),
                })
                .await?;
            print_draft(response, json)
        }
        DraftCommand::List => {
            let response = client
                .request(&Request::Query {
                    query: Query::ListDrafts,
                })
                .await?;
            match response {
                Response::Drafts { drafts } => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&drafts)?);
                    } else if drafts.is_empty() {
                        println!("no drafts");
                    } else {
                        for draft in &drafts {
                            println!("{}", output::draft_line(draft));
                        }
                    }
                    Ok(())
                }
                other => bail!("unexpected response: {other:?}"),
            }
        }
        DraftCommand::Get { id } => {
            let response = client
                .request(&Request::Query {
                    query: Query::GetDraft { id: id.clone() },
                })
                .await?;
            match response {
                Response::Draft { draft: Some(draft) } => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&draft)?);
                    } else {
                        println!("{}", output::draft_line(&draft));
                    }
                    Ok(())
                }
                Response::Draft { draft: None } => bail!("draft {id} not found"),
                other => bail!("unexpected response: {other:?}"),
            }
        }
        DraftCommand::Delete { id } => match client.request(&Request::DraftDelete { id }).await? {
            Response::Ok => Ok(()),
            other => bail!("unexpected response: {other:?}"),
        },
    }
}

fn print_draft(response: Response, json: bool) -> Result<()> {
    match response {
        Response::Draft { draft: Some(draft) } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&draft)?);
            } else {
                println!("{}", draft.id);
            }
            Ok(())
        }
        other => bail!("unexpected response: {other:?}"),
    }
}
