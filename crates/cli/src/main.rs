// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! forge — the operator CLI for the session orchestration daemon.
//!
//! Thin by design: every command is one IPC request (or one streaming
//! subscription) against `forged`; all orchestration logic lives behind
//! the socket.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use client::DaemonClient;
use commands::daemon::DaemonCommand;
use commands::draft::DraftCommand;
use commands::repo::RepoCommand;
use commands::task::TaskCommand;

#[derive(Debug, Parser)]
#[command(name = "forge", version, about = "Coding-agent session orchestration")]
struct Cli {
    /// Emit machine-readable JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create and drive coding-agent sessions
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Saved task configurations
    Draft {
        #[command(subcommand)]
        command: DraftCommand,
    },
    /// The repository catalog
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },
    /// Operate the background daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = DaemonClient::connect()?;
    match cli.command {
        Command::Task { command } => commands::task::run(&client, command, cli.json).await,
        Command::Draft { command } => commands::draft::run(&client, command, cli.json).await,
        Command::Repo { command } => commands::repo::run(&client, command, cli.json).await,
        Command::Daemon { command } => commands::daemon::run(&client, command, cli.json).await,
    }
}
