//! Pipeline events and the per-branch event log.
//!
//! A branch is an independently versioned, append-only sequence of
//! [`PipelineEvent`]s. Each stored event is wrapped in an [`EventLogEntry`]
//! carrying its zero-based version within the branch.
//!
//! # Versions
//!
//! - The first event of a branch has version 0.
//! - A branch's current version is the version of its last event.
//! - A branch that has never been written (or was deleted) has version
//!   [`ABSENT_VERSION`] (−1).
//!
//! # Sub-modules
//!
//! - [`canonical`]: canonical JSON used for content hashing.
//! - [`store`]: the [`EventStore`] contract and its in-memory implementation.

pub mod canonical;
pub mod store;

pub use canonical::{canonicalize, canonicalize_json};
pub use store::{EventLogError, EventStore, InMemoryEventStore, append_with_retry};

use serde::{Deserialize, Serialize};

/// A version number within a branch. See [`ABSENT_VERSION`].
pub type Version = i64;

/// Version reported for a branch with no events.
pub const ABSENT_VERSION: Version = -1;

/// One domain event produced by the reasoning pipeline.
///
/// The log stores and returns events without looking inside `payload`.
/// `kind` and `tool_calls` are the only fields anything in this crate reads
/// (for fact export).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Event variant, e.g. `draft_generated`.
    pub kind: String,
    pub payload: serde_json::Value,
    /// Names of tools invoked while producing this event, in call order.
    #[serde(default)]
    pub tool_calls: Vec<String>,
}

impl PipelineEvent {
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            tool_calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tool_calls<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_calls = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// A stored event together with its position in its branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub branch_id: String,
    pub version: Version,
    pub event: PipelineEvent,
}
