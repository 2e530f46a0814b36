//! Point-in-time branch snapshots used as content-hash input.
//!
//! A [`BranchSnapshot`] is assembled fresh from the event log whenever a hash
//! is needed and dropped right after. It is never mutated once built; the
//! accessors are read-only.

pub mod hash;

pub use hash::{ContentHasher, HashError, compute_hash, verify_hash, with_hash};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::{EventLogError, EventStore, PipelineEvent};

/// An embedded text chunk owned by the vector store collaborator.
///
/// Consumed purely as hash input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableVector {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub embedding: Vec<f32>,
}

impl SerializableVector {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
            embedding,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A branch's name, ordered events, and derived vectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchSnapshot {
    name: String,
    events: Vec<PipelineEvent>,
    vectors: Vec<SerializableVector>,
}

impl BranchSnapshot {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        events: Vec<PipelineEvent>,
        vectors: Vec<SerializableVector>,
    ) -> Self {
        Self {
            name: name.into(),
            events,
            vectors,
        }
    }

    /// The empty snapshot: no name, no events, no vectors.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Assemble a snapshot of `branch_id` from every event in `store`.
    ///
    /// An absent branch yields a snapshot with the name and no events.
    ///
    /// # Errors
    ///
    /// Propagates backend failures from the store.
    pub fn capture<S>(
        store: &S,
        branch_id: &str,
        vectors: Vec<SerializableVector>,
    ) -> Result<Self, EventLogError>
    where
        S: EventStore + ?Sized,
    {
        let events = store
            .get_events(branch_id, 0)?
            .into_iter()
            .map(|entry| entry.event)
            .collect();
        Ok(Self::new(branch_id, events, vectors))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    #[must_use]
    pub fn vectors(&self) -> &[SerializableVector] {
        &self.vectors
    }

    /// Returns `true` if the snapshot holds no events and no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.vectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InMemoryEventStore;
    use serde_json::json;

    #[test]
    fn capture_reads_events_in_version_order() {
        let store = InMemoryEventStore::new();
        store
            .append_events(
                "main",
                vec![
                    PipelineEvent::new("draft", json!(1)),
                    PipelineEvent::new("critique", json!(2)),
                ],
                None,
            )
            .unwrap();

        let snapshot = BranchSnapshot::capture(&store, "main", vec![]).unwrap();
        assert_eq!(snapshot.name(), "main");
        let kinds: Vec<_> = snapshot.events().iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["draft", "critique"]);
    }

    #[test]
    fn capture_of_absent_branch_is_named_but_empty() {
        let store = InMemoryEventStore::new();
        let snapshot = BranchSnapshot::capture(&store, "ghost", vec![]).unwrap();
        assert_eq!(snapshot.name(), "ghost");
        assert!(snapshot.is_empty());
    }

    #[test]
    fn vector_metadata_builder() {
        let v = SerializableVector::new("v1", "text", vec![0.1]).with_metadata("k", json!("v"));
        assert_eq!(v.metadata.get("k"), Some(&json!("v")));
    }
}
