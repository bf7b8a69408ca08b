// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `forge task` — create and drive Sessions.

use crate::client::DaemonClient;
use crate::output;
use anyhow::{anyhow, bail, Result};
use clap::{Args, Subcommand};
use forge_core::{
    AgentSpec, DeliveryMode, DeliverySpec, RepoMode, RepoSpec, TaskSpec,
};
use forge_daemon::{Query, Request, Response};
use forge_engine::CreateTaskRequest;
use std::collections::HashMap;

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Create a new coding-agent task
    Create(CreateArgs),
    /// List sessions
    List(ListArgs),
    /// Show one session
    Get { id: String },
    /// Pause a running session
    Pause { id: String },
    /// Resume a paused session
    Resume { id: String },
    /// Gracefully stop a session
    Stop { id: String },
    /// Cancel a session from any non-terminal state
    Cancel { id: String },
    /// Stream a session's events live
    Watch {
        id: String,
        /// Resume after this sequence number instead of the current head
        #[arg(long)]
        from_sequence: Option<u64>,
    },
    /// Show the last events of an active session
    Events {
        id: String,
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// The task prompt for the agent
    #[arg(long)]
    prompt: String,
    /// Git remote URL to provision the workspace from
    #[arg(long)]
    repo_url: Option<String>,
    #[arg(long)]
    branch: Option<String>,
    #[arg(long)]
    commit: Option<String>,
    /// Agent type to run
    #[arg(long, default_value = "claude")]
    agent: String,
    #[arg(long)]
    agent_version: Option<String>,
    /// agent setting as key=value (repeatable)
    #[arg(long = "setting", value_name = "KEY=VALUE")]
    settings: Vec<String>,
    #[arg(long)]
    tenant: Option<String>,
    #[arg(long)]
    project: Option<String>,
    /// Delivery mode for the agent's output
    #[arg(long, default_value = "pr")]
    delivery: String,
    #[arg(long)]
    target_branch: Option<String>,
    /// label as key=value (repeatable)
    #[arg(long = "label", value_name = "KEY=VALUE")]
    labels: Vec<String>,
    /// Deduplicate retried submissions of the same request
    #[arg(long)]
    idempotency_key: Option<String>,
}

pub async fn run(client: &DaemonClient, command: TaskCommand, json: bool) -> Result<()> {
    match command {
        TaskCommand::Create(args) => create(client, args, json).await,
        TaskCommand::List(args) => list(client, args, json).await,
        TaskCommand::Get { id } => get(client, &id, json).await,
        TaskCommand::Pause { id } => signal(client, Request::Pause { id }).await,
        TaskCommand::Resume { id } => signal(client, Request::Resume { id }).await,
        TaskCommand::Stop { id } => signal(client, Request::Stop { id }).await,
        TaskCommand::Cancel { id } => signal(client, Request::Cancel { id }).await,
        TaskCommand::Watch { id, from_sequence } => watch(client, &id, from_sequence, json).await,
        TaskCommand::Events { id, count } => events(client, &id, count, json).await,
    }
}

fn parse_pairs(pairs: &[String], what: &str) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("{what} `{pair}` is not KEY=VALUE"))?;
        out.insert(key.to_string(), value.to_string());
    }
    Ok(out)
}

fn build_request(args: &CreateArgs) -> Result<CreateTaskRequest> {
    let delivery_mode = match args.delivery.as_str() {
        "pr" => DeliveryMode::Pr,
        "branch" => DeliveryMode::Branch,
        "patch" => DeliveryMode::Patch,
        other => bail!("unknown delivery mode `{other}` (expected pr|branch|patch)"),
    };
    let settings = parse_pairs(&args.settings, "setting")?
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    Ok(CreateTaskRequest {
        tenant_id: args.tenant.clone(),
        project_id: args.project.clone(),
        task: TaskSpec {
            prompt: args.prompt.clone(),
            labels: parse_pairs(&args.labels, "label")?,
            attachments: Vec::new(),
        },
        agent: AgentSpec {
            agent_type: args.agent.clone(),
            version: args.agent_version.clone(),
            settings,
        },
        runtime: None,
        repo: RepoSpec {
            mode: if args.repo_url.is_some() {
                RepoMode::Git
            } else {
                RepoMode::None
            },
            url: args.repo_url.clone(),
            branch: args.branch.clone(),
            commit: args.commit.clone(),
        },
        delivery: DeliverySpec {
            mode: delivery_mode,
            target_branch: args.target_branch.clone(),
        },
    })
}

async fn create(client: &DaemonClient, args: CreateArgs, json: bool) -> Result<()> {
    let request = build_request(&args)?;
    let response = client
        .request(&Request::CreateTask {
            request: Box::new(request),
            idempotency_key: args.idempotency_key,
        })
        .await?;
    match response {
        Response::SessionCreated { id } => {
            if json {
                println!("{}", serde_json::json!({ "id": id }));
            } else {
                println!("{id}");
            }
            Ok(())
        }
        other => bail!("unexpected response: {other:?}"),
    }
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    tenant: Option<String>,
    #[arg(long)]
    project: Option<String>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    per_page: Option<u32>,
}

async fn list(client: &DaemonClient, args: ListArgs, json: bool) -> Result<()> {
    let response = client
        .request(&Request::Query {
            query: Query::ListSessions {
                status: args.status,
                tenant_id: args.tenant,
                project_id: args.project,
                page: args.page,
                per_page: args.per_page,
            },
        })
        .await?;
    match response {
        Response::Sessions {
            sessions,
            total,
            next_page,
        } => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "sessions": sessions,
                        "total": total,
                        "next_page": next_page,
                    })
                );
            } else {
                for view in &sessions {
                    println!("{}", output::session_line(view));
                }
                if sessions.is_empty() {
                    println!("no sessions");
                } else if let Some(next) = next_page {
                    println!("({total} total, continue with --page {next})");
                }
            }
            Ok(())
        }
        other => bail!("unexpected response: {other:?}"),
    }
}

async fn get(client: &DaemonClient, id: &str, json: bool) -> Result<()> {
    let response = client
        .request(&Request::Query {
            query: Query::GetSession { id: id.to_string() },
        })
        .await?;
    match response {
        Response::Session { session: Some(view) } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("{}", output::session_detail(&view));
            }
            Ok(())
        }
        Response::Session { session: None } => bail!("session {id} not found"),
        other => bail!("unexpected response: {other:?}"),
    }
}

async fn signal(client: &DaemonClient, request: Request) -> Result<()> {
    match client.request(&request).await? {
        Response::Ok => Ok(()),
        other => bail!("unexpected response: {other:?}"),
    }
}

async fn watch(
    client: &DaemonClient,
    id: &str,
    from_sequence: Option<u64>,
    json: bool,
) -> Result<()> {
    client
        .subscribe(id, from_sequence, |record| {
            if json {
                match serde_json::to_string(&record) {
                    Ok(line) => println!("{line}"),
                    Err(err) => eprintln!("failed to render event: {err}"),
                }
            } else {
                println!("{}", output::event_line(&record));
            }
        })
        .await?;
    Ok(())
}

async fn events(client: &DaemonClient, id: &str, count: usize, json: bool) -> Result<()> {
    let response = client
        .request(&Request::Query {
            query: Query::RecentEvents {
                id: id.to_string(),
                n: count,
            },
        })
        .await?;
    match response {
        Response::Events { events } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("no recent events (session may be terminal)");
            } else {
                for record in &events {
                    println!("{}", output::event_line(record));
                }
            }
            Ok(())
        }
        other => bail!("unexpected response: {other:?}"),
    }
}
