use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Payload;

/// Globally unique node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// A fresh random (UUIDv4) identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One recorded reasoning state.
///
/// `parent_ids` is the structural ancestry declared at creation time. It is
/// independent of transition edges: parents define roots and base ancestry,
/// edges record which operation produced the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningNode {
    pub id: NodeId,
    /// Variant name of the wrapped state.
    pub type_tag: String,
    pub parent_ids: Vec<NodeId>,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
}

impl ReasoningNode {
    /// A root node with a fresh id, stamped now. The payload's own tag is
    /// used as the node's `type_tag`.
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            id: NodeId::generate(),
            type_tag: payload.type_tag.clone(),
            parent_ids: Vec::new(),
            payload,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_parents<I, P>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<NodeId>,
    {
        self.parent_ids = parents.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_type_tag(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = type_tag.into();
        self
    }

    #[must_use]
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Returns `true` if the node declares no structural parents.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }
}
