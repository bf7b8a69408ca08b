// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation abstractions.
//!
//! Session and event identifiers are UUIDv7: time-ordered (the first 48
//! bits are a millisecond timestamp) so they sort the same as creation
//! order without a separate sequence counter, and globally unique without
//! coordination.

use uuid::Uuid;

/// Generates opaque, sortable, time-embedded identifiers.
///
/// A trait rather than a bare function so tests can substitute a
/// deterministic generator.
pub trait IdGen: Send + Sync {
    fn new_id(&self) -> String;
}

/// Production identifier generator: UUIDv7 rendered as lowercase hex-dashed.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn new_id(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh id using the given generator.
            pub fn generate(gen: &dyn $crate::IdGen) -> Self {
                Self(gen.new_id())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identifies a Session: opaque, sortable, time-embedded, globally unique.
    pub struct SessionId;
}

define_id! {
    /// Identifies a Draft task configuration.
    pub struct DraftId;
}

define_id! {
    /// Identifies a `RepositoryIndex` entry.
    pub struct RepositoryId;
}

define_id! {
    /// Correlates a `tool_use`/`tool_result` event pair.
    pub struct ToolExecutionId;
}
