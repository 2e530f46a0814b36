//! Plain value types recorded in the provenance graph.
//!
//! - [`ReasoningNode`]: one recorded reasoning state (draft, critique,
//!   final artifact, ...), with its structural parents.
//! - [`TransitionEdge`]: a labeled, timestamped operation that produced one
//!   node from another.
//! - [`Payload`]: the opaque value both of them carry.
//!
//! These types have no behavior beyond construction; the invariants that
//! relate them are enforced by [`crate::dag::graph::MerkleDag`].

pub mod edge;
pub mod node;

pub use edge::TransitionEdge;
pub use node::{NodeId, ReasoningNode};

use serde::{Deserialize, Serialize};

/// An opaque serialized value tagged with the variant it came from.
///
/// The core stores and returns payloads but never looks inside `data`; only
/// the `type_tag` discriminator is ever read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub type_tag: String,
    pub data: serde_json::Value,
}

impl Payload {
    #[must_use]
    pub fn new(type_tag: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            type_tag: type_tag.into(),
            data,
        }
    }

    /// A payload with no data, for operations that carry no parameters.
    #[must_use]
    pub fn empty(type_tag: impl Into<String>) -> Self {
        Self::new(type_tag, serde_json::Value::Null)
    }

    /// Serialize any value into a payload tagged with `type_tag`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `value` cannot be represented as
    /// JSON (for example a map with non-string keys).
    pub fn from_serializable<T: Serialize>(
        type_tag: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(type_tag, serde_json::to_value(value)?))
    }
}
