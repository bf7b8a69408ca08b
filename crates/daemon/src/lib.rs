// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! forge-daemon library
//!
//! Exposes the IPC protocol types for CLI clients. The daemon's own
//! lifecycle and listener live in the `forged` binary.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod protocol;

pub use protocol::{
    DraftBody, Query, Request, Response, WireError, DEFAULT_TIMEOUT, MAX_FRAME_BYTES,
    PROTOCOL_VERSION,
};
