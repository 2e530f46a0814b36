//! Append-only per-branch event log with optimistic concurrency.
//!
//! # Branch lifecycle
//!
//! ```text
//! Absent --first non-empty append--> Active --delete_branch--> Absent
//! ```
//!
//! A deleted branch is indistinguishable from one that was never written: it
//! reports version −1 and the next append starts again at version 0.
//!
//! # Concurrency
//!
//! [`InMemoryEventStore`] keeps a map from branch id to a per-branch cell
//! behind its own mutex. The map lock is held only long enough to find or
//! create a cell; "read version, check expected version, append, advance" then
//! runs entirely under the branch mutex, so appends to one branch are
//! linearized and appends to different branches never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::EventLogConfig;
use crate::error::ErrorCode;

use super::{ABSENT_VERSION, EventLogEntry, PipelineEvent, Version};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from event log operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventLogError {
    /// A required argument was empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller's expected version did not match the branch.
    ///
    /// Nothing was appended. The caller may re-read and retry, merge, or
    /// abort.
    #[error(
        "version conflict on branch '{branch_id}': expected {expected_version}, actual {actual_version}"
    )]
    ConcurrencyConflict {
        branch_id: String,
        expected_version: Version,
        actual_version: Version,
    },

    /// A durable backend failed to read or write.
    #[error("event store backend failure: {0}")]
    Backend(String),
}

impl EventLogError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::ConcurrencyConflict { .. } => ErrorCode::ConcurrencyConflict,
            Self::Backend(_) => ErrorCode::InternalUnexpected,
        }
    }
}

// ---------------------------------------------------------------------------
// EventStore
// ---------------------------------------------------------------------------

/// The event log contract.
///
/// Every method returns a `Result` so durable implementations can report
/// I/O failures as [`EventLogError::Backend`]; the in-memory store only ever
/// fails on invalid arguments and version conflicts.
pub trait EventStore: Send + Sync {
    /// Append `events` to `branch_id`, in order.
    ///
    /// If `expected_version` is given it must equal the branch's current
    /// version before the append. Returns the version of the last appended
    /// event, or the current version if `events` is empty.
    ///
    /// # Errors
    ///
    /// - [`EventLogError::InvalidArgument`] if `branch_id` is empty.
    /// - [`EventLogError::ConcurrencyConflict`] on a version mismatch.
    fn append_events(
        &self,
        branch_id: &str,
        events: Vec<PipelineEvent>,
        expected_version: Option<Version>,
    ) -> Result<Version, EventLogError>;

    /// Events with version `>= from_version`, in version order.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_events(
        &self,
        branch_id: &str,
        from_version: Version,
    ) -> Result<Vec<EventLogEntry>, EventLogError>;

    /// Current version of the branch, or [`ABSENT_VERSION`].
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_version(&self, branch_id: &str) -> Result<Version, EventLogError>;

    /// # Errors
    ///
    /// Backend failures only.
    fn branch_exists(&self, branch_id: &str) -> Result<bool, EventLogError> {
        Ok(self.get_version(branch_id)? != ABSENT_VERSION)
    }

    /// Remove all state for the branch. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn delete_branch(&self, branch_id: &str) -> Result<bool, EventLogError>;

    /// Ids of all branches with at least one event, sorted.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn branch_ids(&self) -> Result<Vec<String>, EventLogError>;
}

/// Append events built against the branch's current version, retrying on
/// conflict.
///
/// `build` receives the version the append will be checked against and
/// returns the events to append. On [`EventLogError::ConcurrencyConflict`]
/// the version is re-read and `build` is called again, up to
/// `config.max_append_retries` extra attempts.
///
/// # Errors
///
/// The last conflict once retries are exhausted, or any other error
/// immediately.
pub fn append_with_retry<S, F>(
    store: &S,
    branch_id: &str,
    config: &EventLogConfig,
    mut build: F,
) -> Result<Version, EventLogError>
where
    S: EventStore + ?Sized,
    F: FnMut(Version) -> Vec<PipelineEvent>,
{
    let mut attempt = 0;
    loop {
        let current = store.get_version(branch_id)?;
        match store.append_events(branch_id, build(current), Some(current)) {
            Err(err @ EventLogError::ConcurrencyConflict { .. })
                if attempt < config.max_append_retries =>
            {
                attempt += 1;
                debug!(branch = branch_id, attempt, error = %err, "retrying append");
            }
            other => return other,
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryEventStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BranchLog {
    events: Vec<PipelineEvent>,
    /// Set once the cell has been removed from the map by `delete_branch`.
    retired: bool,
}

impl BranchLog {
    fn version(&self) -> Version {
        version_for_len(self.events.len())
    }
}

/// Reference [`EventStore`] holding every branch in memory.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    branches: RwLock<HashMap<String, Arc<Mutex<BranchLog>>>>,
}

impl InMemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, branch_id: &str) -> Option<Arc<Mutex<BranchLog>>> {
        self.branches.read().get(branch_id).cloned()
    }

    fn lookup_or_create(&self, branch_id: &str) -> Arc<Mutex<BranchLog>> {
        if let Some(cell) = self.lookup(branch_id) {
            return cell;
        }
        Arc::clone(
            self.branches
                .write()
                .entry(branch_id.to_owned())
                .or_default(),
        )
    }
}

impl EventStore for InMemoryEventStore {
    fn append_events(
        &self,
        branch_id: &str,
        events: Vec<PipelineEvent>,
        expected_version: Option<Version>,
    ) -> Result<Version, EventLogError> {
        if branch_id.is_empty() {
            return Err(EventLogError::InvalidArgument(
                "branch_id must not be empty".into(),
            ));
        }

        loop {
            let cell = if events.is_empty() {
                self.lookup(branch_id)
            } else {
                match expected_version {
                    // Do not create a cell for an append that is bound to fail.
                    Some(expected) if expected != ABSENT_VERSION => self.lookup(branch_id),
                    _ => Some(self.lookup_or_create(branch_id)),
                }
            };

            let Some(cell) = cell else {
                return check_expected(branch_id, expected_version, ABSENT_VERSION)
                    .map(|()| ABSENT_VERSION);
            };

            let mut log = cell.lock();
            if log.retired {
                // Deleted between lookup and lock; resolve the branch again.
                continue;
            }

            check_expected(branch_id, expected_version, log.version())?;

            let count = events.len();
            log.events.extend(events);
            let version = log.version();
            debug!(branch = branch_id, count, version, "appended events");
            return Ok(version);
        }
    }

    fn get_events(
        &self,
        branch_id: &str,
        from_version: Version,
    ) -> Result<Vec<EventLogEntry>, EventLogError> {
        let Some(cell) = self.lookup(branch_id) else {
            return Ok(Vec::new());
        };
        let log = cell.lock();
        let skip = usize::try_from(from_version.max(0)).unwrap_or(usize::MAX);

        Ok(log
            .events
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(index, event)| EventLogEntry {
                branch_id: branch_id.to_owned(),
                version: version_for_len(index + 1),
                event: event.clone(),
            })
            .collect())
    }

    fn get_version(&self, branch_id: &str) -> Result<Version, EventLogError> {
        Ok(self
            .lookup(branch_id)
            .map_or(ABSENT_VERSION, |cell| cell.lock().version()))
    }

    fn delete_branch(&self, branch_id: &str) -> Result<bool, EventLogError> {
        let removed = self.branches.write().remove(branch_id);
        let Some(cell) = removed else {
            return Ok(false);
        };

        let mut log = cell.lock();
        let had_events = !log.events.is_empty();
        log.retired = true;
        log.events.clear();
        info!(branch = branch_id, "deleted branch");
        Ok(had_events)
    }

    fn branch_ids(&self) -> Result<Vec<String>, EventLogError> {
        let branches = self.branches.read();
        let mut ids: Vec<String> = branches
            .iter()
            .filter(|(_, cell)| !cell.lock().events.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn check_expected(
    branch_id: &str,
    expected_version: Option<Version>,
    actual_version: Version,
) -> Result<(), EventLogError> {
    match expected_version {
        Some(expected) if expected != actual_version => {
            warn!(
                branch = branch_id,
                expected, actual = actual_version, "append rejected: version conflict"
            );
            Err(EventLogError::ConcurrencyConflict {
                branch_id: branch_id.to_owned(),
                expected_version: expected,
                actual_version,
            })
        }
        _ => Ok(()),
    }
}

/// Version of the last event in a branch holding `len` events.
fn version_for_len(len: usize) -> Version {
    Version::try_from(len).map_or(Version::MAX, |n| n - 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
