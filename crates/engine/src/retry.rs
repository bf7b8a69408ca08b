// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded exponential backoff for `Transient` Repository/Provisioner
//! errors. Only `ErrorKind::Transient`
//! errors are retried; everything else is returned on the first attempt.

use forge_core::{CoreError, ErrorKind};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        scaled.min(self.max_delay)
    }
}

/// Run `f` up to `policy.max_attempts` times, sleeping with doubling
/// backoff between attempts, but only when the returned error is
/// `ErrorKind::Transient`. Any other error (or the final attempt's
/// transient error) is returned immediately.
pub async fn retry_transient<F, Fut, T>(policy: RetryPolicy, mut f: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.kind == ErrorKind::Transient && attempt + 1 < policy.max_attempts => {
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
