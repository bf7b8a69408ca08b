// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema upgrades for stored checkpoint envelopes.
//!
//! Each step rewrites the raw JSON of an envelope from version `n` to
//! `n + 1`; [`upgrade`] walks the chain until the build's current
//! version is reached. Steps operate on JSON rather than typed structs
//! so an old envelope never has to deserialize against today's types.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("stored state v{found} is newer than this build supports (v{supported})")]
    TooNew { found: u32, supported: u32 },
    #[error("no upgrade step from stored state v{from}")]
    MissingStep { from: u32 },
    #[error("upgrade from v{from} failed: {reason}")]
    StepFailed { from: u32, reason: String },
}

type Step = fn(&mut Value) -> Result<(), String>;

/// Upgrade steps in version order: `STEPS[n - 1]` rewrites v`n` to
/// v`n + 1`. Empty while the format is at its first version.
const STEPS: &[Step] = &[];

/// Bring `value` from whatever version its `v` tag claims (absent tags
/// read as v1) up to `target`.
pub fn upgrade(value: Value, target: u32) -> Result<Value, UpgradeError> {
    upgrade_with(STEPS, value, target)
}

fn upgrade_with(steps: &[Step], mut value: Value, target: u32) -> Result<Value, UpgradeError> {
    // Absent or nonsense tags read as the first version.
    let mut version = value
        .get("v")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .filter(|v| *v >= 1)
        .unwrap_or(1);

    if version > target {
        return Err(UpgradeError::TooNew {
            found: version,
            supported: target,
        });
    }

    while version < target {
        let step = steps
            .get((version - 1) as usize)
            .ok_or(UpgradeError::MissingStep { from: version })?;
        step(&mut value).map_err(|reason| UpgradeError::StepFailed {
            from: version,
            reason,
        })?;
        version += 1;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("v".into(), version.into());
        }
    }
    Ok(value)
}
