use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NodeId, Payload};

/// A labeled operation that produced `to_node_id` from `from_node_id`.
///
/// Edges are the unit the replay engine walks. They carry *why* a transition
/// happened; structural ancestry lives in [`super::ReasoningNode::parent_ids`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEdge {
    pub id: String,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    /// Operation label, e.g. `UseCritique`.
    pub operation_name: String,
    pub payload: Payload,
    /// Producer's confidence in the transition, in `[0, 1]` when present.
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl TransitionEdge {
    /// An edge with a fresh id, no parameters, stamped now.
    #[must_use]
    pub fn new(
        from_node_id: impl Into<NodeId>,
        to_node_id: impl Into<NodeId>,
        operation_name: impl Into<String>,
    ) -> Self {
        let operation_name = operation_name.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_node_id: from_node_id.into(),
            to_node_id: to_node_id.into(),
            payload: Payload::empty(operation_name.clone()),
            operation_name,
            confidence: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns `true` if `confidence` is absent or a finite value in `[0, 1]`.
    #[must_use]
    pub fn has_valid_confidence(&self) -> bool {
        self.confidence.is_none_or(|c| (0.0..=1.0).contains(&c))
    }
}
