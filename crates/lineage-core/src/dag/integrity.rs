//! Dangling-reference detection for loaded graphs.
//!
//! A graph built through [`MerkleDag::add_node`]/[`MerkleDag::add_edge`] can
//! never hold a dangling reference. A graph rebuilt from a durable backend
//! with [`MerkleDag::from_parts`] can, if the stored records were truncated or
//! tampered with. The report produced here is what
//! [`MerkleDag::verify_integrity`] summarizes and what [`MerkleDag::repair`]
//! removes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::NodeId;

use super::graph::MerkleDag;

/// A node whose declared parent is not in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingParent {
    pub node: NodeId,
    pub missing_parent: NodeId,
}

/// An edge with an endpoint that is not in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingEdge {
    pub edge: String,
    pub missing_node: NodeId,
}

/// Every dangling reference found in one pass, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub dangling_parents: Vec<DanglingParent>,
    /// One entry per edge, naming the first missing endpoint (`from` before `to`).
    pub dangling_edges: Vec<DanglingEdge>,
}

impl IntegrityReport {
    /// Returns `true` if no dangling reference was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dangling_parents.is_empty() && self.dangling_edges.is_empty()
    }
}

/// Scan every node and edge of `dag` for references that do not resolve.
#[must_use]
pub fn integrity_report(dag: &MerkleDag) -> IntegrityReport {
    let known: HashSet<&NodeId> = dag.nodes().map(|n| &n.id).collect();
    let mut report = IntegrityReport::default();

    for node in dag.nodes() {
        for parent in &node.parent_ids {
            if !known.contains(parent) {
                report.dangling_parents.push(DanglingParent {
                    node: node.id.clone(),
                    missing_parent: parent.clone(),
                });
            }
        }
    }

    for edge in dag.edges() {
        if let Some(missing) = [&edge.from_node_id, &edge.to_node_id]
            .into_iter()
            .find(|id| !known.contains(id))
        {
            report.dangling_edges.push(DanglingEdge {
                edge: edge.id.clone(),
                missing_node: missing.clone(),
            });
        }
    }

    report
}
