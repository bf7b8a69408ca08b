// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers shared by the VCS and agent-launcher
//! adapters.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for `git` checkout/fetch/ls-remote operations.
pub const GIT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default grace window between asking an agent process to stop and
/// killing it.
pub const AGENT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Run a subprocess command with a timeout, killing the child if it elapses.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        )),
    }
}
