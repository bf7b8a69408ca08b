//! End-to-end behavioral scenarios for the session orchestration core.
//!
//! These tests compose the real Repository Layer, Snapshot Cache,
//! Workspace Provisioner, Supervisor, and Session Manager, substituting
//! fakes only at the process boundary (VCS, agent subprocess).

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/lifecycle.rs"]
mod lifecycle;

#[path = "specs/cache_reuse.rs"]
mod cache_reuse;

#[path = "specs/concurrency.rs"]
mod concurrency;

#[path = "specs/eviction.rs"]
mod eviction;

#[path = "specs/subscribe.rs"]
mod subscribe;

#[path = "specs/idempotency.rs"]
mod idempotency;
