//! In-memory provenance graph: one node arena, two independent relations.
//!
//! [`MerkleDag`] owns every [`ReasoningNode`] and [`TransitionEdge`] of one
//! reasoning session. Nodes live in an insertion-ordered arena keyed by
//! [`NodeId`]; the structural parent relation and the transition-edge
//! relation are kept as separate index maps over that arena so their
//! invariants can be enforced independently.
//!
//! # Structural relation
//!
//! A node may only be inserted once every id in its `parent_ids` is already
//! present. Because parents must pre-exist, the parent relation is acyclic by
//! construction and no cycle check is ever needed for it.
//!
//! # Edge relation
//!
//! Edges only require both endpoints to exist. Nothing stops a producer from
//! adding edges that loop, so [`MerkleDag::topological_sort`] detects cycles
//! explicitly.
//!
//! # Durable backends
//!
//! [`MerkleDag::from_parts`] rebuilds a graph from stored records *without*
//! validation, the way a backend loads whatever it finds on disk.
//! [`MerkleDag::verify_integrity`] reports dangling references in such a
//! graph; [`MerkleDag::repair`] removes them, but only when asked.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::model::{NodeId, ReasoningNode, TransitionEdge};

use super::integrity::{IntegrityReport, integrity_report};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from graph insertion and ordering.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// A node with this id is already in the graph.
    #[error("node {0} already exists")]
    AlreadyExists(NodeId),

    /// An edge with this id is already in the graph.
    #[error("edge {0} already exists")]
    DuplicateEdge(String),

    /// A node declares a structural parent that is not in the graph.
    #[error("node {node} references unknown parent {parent}")]
    MissingParent {
        /// The node being inserted.
        node: NodeId,
        /// The parent id that could not be resolved.
        parent: NodeId,
    },

    /// An edge endpoint is not in the graph.
    #[error("edge {edge} references unknown node {node}")]
    MissingNode {
        /// The edge being inserted.
        edge: String,
        /// The endpoint id that could not be resolved.
        node: NodeId,
    },

    /// An edge carries a confidence outside `[0, 1]`.
    #[error("edge {edge} has confidence {confidence} outside [0, 1]")]
    InvalidConfidence {
        /// The edge being inserted.
        edge: String,
        /// The rejected value.
        confidence: f64,
    },

    /// The transition-edge relation contains a cycle.
    #[error("transition edges form a cycle; {} nodes could not be ordered", .remaining.len())]
    CycleDetected {
        /// Nodes left with unresolved incoming edges, in insertion order.
        remaining: Vec<NodeId>,
    },
}

impl GraphError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyExists(_) | Self::DuplicateEdge(_) => ErrorCode::AlreadyExists,
            Self::MissingParent { .. } | Self::MissingNode { .. } => ErrorCode::MissingReference,
            Self::InvalidConfidence { .. } => ErrorCode::InvalidArgument,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
        }
    }
}

// ---------------------------------------------------------------------------
// GraphExport
// ---------------------------------------------------------------------------

/// Serializable form of a graph: every record in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<ReasoningNode>,
    pub edges: Vec<TransitionEdge>,
}

// ---------------------------------------------------------------------------
// MerkleDag
// ---------------------------------------------------------------------------

/// Provenance graph for one reasoning session.
///
/// All per-node index vectors are parallel to `nodes`; edge indexes hold
/// positions into `edges`.
#[derive(Debug, Clone, Default)]
pub struct MerkleDag {
    nodes: Vec<ReasoningNode>,
    node_index: HashMap<NodeId, usize>,
    by_type: HashMap<String, Vec<usize>>,
    /// Structural children per node (reverse of `parent_ids`).
    children: Vec<Vec<usize>>,

    edges: Vec<TransitionEdge>,
    edge_index: HashMap<String, usize>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl MerkleDag {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from stored records without validating them.
    ///
    /// Duplicate ids keep the first record seen. Dangling references are
    /// kept as-is so [`Self::verify_integrity`] can report them.
    #[must_use]
    pub fn from_parts(nodes: Vec<ReasoningNode>, edges: Vec<TransitionEdge>) -> Self {
        let mut dag = Self::new();

        for node in nodes {
            if dag.node_index.contains_key(&node.id) {
                warn!(node = %node.id, "duplicate node in loaded graph, keeping first");
                continue;
            }
            dag.push_node(node);
        }

        // Structural children can only be linked once every node is placed,
        // since a loaded parent may appear after its child.
        for (pos, node) in dag.nodes.iter().enumerate() {
            for parent in &node.parent_ids {
                if let Some(&parent_pos) = dag.node_index.get(parent) {
                    dag.children[parent_pos].push(pos);
                }
            }
        }

        for edge in edges {
            if dag.edge_index.contains_key(&edge.id) {
                warn!(edge = %edge.id, "duplicate edge in loaded graph, keeping first");
                continue;
            }
            dag.push_edge(edge);
        }

        dag
    }

    /// Insert a node.
    ///
    /// # Errors
    ///
    /// - [`GraphError::AlreadyExists`] if `node.id` is already present.
    /// - [`GraphError::MissingParent`] if any `parent_ids` entry is absent.
    pub fn add_node(&mut self, node: ReasoningNode) -> Result<(), GraphError> {
        if self.node_index.contains_key(&node.id) {
            return Err(GraphError::AlreadyExists(node.id));
        }

        if let Some(parent) = node
            .parent_ids
            .iter()
            .find(|p| !self.node_index.contains_key(*p))
        {
            return Err(GraphError::MissingParent {
                node: node.id.clone(),
                parent: parent.clone(),
            });
        }

        let parent_positions: Vec<usize> = node
            .parent_ids
            .iter()
            .filter_map(|p| self.node_index.get(p).copied())
            .collect();

        debug!(node = %node.id, type_tag = %node.type_tag, "insert node");
        let pos = self.push_node(node);
        for parent_pos in parent_positions {
            self.children[parent_pos].push(pos);
        }

        Ok(())
    }

    /// Insert a transition edge.
    ///
    /// # Errors
    ///
    /// - [`GraphError::MissingNode`] if either endpoint is absent.
    /// - [`GraphError::DuplicateEdge`] if `edge.id` is already present.
    /// - [`GraphError::InvalidConfidence`] if the confidence is outside `[0, 1]`.
    pub fn add_edge(&mut self, edge: TransitionEdge) -> Result<(), GraphError> {
        for endpoint in [&edge.from_node_id, &edge.to_node_id] {
            if !self.node_index.contains_key(endpoint) {
                return Err(GraphError::MissingNode {
                    edge: edge.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }

        if self.edge_index.contains_key(&edge.id) {
            return Err(GraphError::DuplicateEdge(edge.id));
        }

        if !edge.has_valid_confidence() {
            return Err(GraphError::InvalidConfidence {
                confidence: edge.confidence.unwrap_or(f64::NAN),
                edge: edge.id,
            });
        }

        debug!(
            edge = %edge.id,
            from = %edge.from_node_id,
            to = %edge.to_node_id,
            operation = %edge.operation_name,
            "insert edge"
        );
        self.push_edge(edge);
        Ok(())
    }

    /// Look up a node by id.
    #[must_use]
    pub fn get_node(&self, id: &NodeId) -> Option<&ReasoningNode> {
        self.node_index.get(id).map(|&pos| &self.nodes[pos])
    }

    /// Look up an edge by id.
    #[must_use]
    pub fn get_edge(&self, id: &str) -> Option<&TransitionEdge> {
        self.edge_index.get(id).map(|&pos| &self.edges[pos])
    }

    /// Returns `true` if the graph contains a node with the given id.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_index.contains_key(id)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes with no structural parents, in insertion order.
    ///
    /// Edges play no part here: a node reached only through an edge is still
    /// a root if it declared no parents.
    #[must_use]
    pub fn get_root_nodes(&self) -> Vec<&ReasoningNode> {
        self.nodes.iter().filter(|n| n.is_root()).collect()
    }

    /// All nodes with the given `type_tag`, in insertion order.
    #[must_use]
    pub fn get_nodes_by_type(&self, type_tag: &str) -> Vec<&ReasoningNode> {
        self.by_type
            .get(type_tag)
            .map(|positions| positions.iter().map(|&pos| &self.nodes[pos]).collect())
            .unwrap_or_default()
    }

    /// Order every node by Kahn's algorithm over the edge relation.
    ///
    /// Nodes with no incoming edges are ready immediately. When several
    /// nodes are ready at once, the earliest inserted goes first.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] if the edges contain a cycle.
    pub fn topological_sort(&self) -> Result<Vec<&ReasoningNode>, GraphError> {
        let mut in_degree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(pos, _)| pos)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(current) = ready.pop_first() {
            result.push(&self.nodes[current]);

            for &edge_pos in &self.outgoing[current] {
                let target = self.node_index[&self.edges[edge_pos].to_node_id];
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    ready.insert(target);
                }
            }
        }

        if result.len() < self.nodes.len() {
            let remaining: Vec<NodeId> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(pos, _)| self.nodes[pos].id.clone())
                .collect();
            warn!(remaining = remaining.len(), "cycle in transition edges");
            return Err(GraphError::CycleDetected { remaining });
        }

        Ok(result)
    }

    /// Re-check that every parent reference and every edge endpoint resolves.
    ///
    /// Returns `Ok(true)` iff the graph has no dangling references. Nothing is
    /// repaired; see [`Self::repair`] and [`Self::integrity_report`].
    ///
    /// # Errors
    ///
    /// The in-memory graph never fails; the `Result` leaves room for backends
    /// that must read records back before checking them.
    pub fn verify_integrity(&self) -> Result<bool, GraphError> {
        let report = self.integrity_report();
        if !report.is_clean() {
            warn!(
                dangling_parents = report.dangling_parents.len(),
                dangling_edges = report.dangling_edges.len(),
                "graph integrity check failed"
            );
        }
        Ok(report.is_clean())
    }

    /// Every dangling reference currently in the graph.
    #[must_use]
    pub fn integrity_report(&self) -> IntegrityReport {
        integrity_report(self)
    }

    /// Remove every dangling reference and return what was removed.
    ///
    /// Dangling parent ids are dropped from their nodes; edges with a
    /// missing endpoint are deleted. Indexes are rebuilt afterwards.
    pub fn repair(&mut self) -> IntegrityReport {
        let report = self.integrity_report();
        if report.is_clean() {
            return report;
        }

        warn!(
            dangling_parents = report.dangling_parents.len(),
            dangling_edges = report.dangling_edges.len(),
            "repairing graph"
        );

        let parts = std::mem::take(self).into_parts();
        let known: HashSet<NodeId> = parts.nodes.iter().map(|n| n.id.clone()).collect();

        let nodes = parts
            .nodes
            .into_iter()
            .map(|mut node| {
                node.parent_ids.retain(|p| known.contains(p));
                node
            })
            .collect();
        let edges = parts
            .edges
            .into_iter()
            .filter(|e| known.contains(&e.from_node_id) && known.contains(&e.to_node_id))
            .collect();

        *self = Self::from_parts(nodes, edges);
        report
    }

    /// Edges leaving `id`, in insertion order.
    #[must_use]
    pub fn outgoing_edges(&self, id: &NodeId) -> Vec<&TransitionEdge> {
        self.edges_at(id, &self.outgoing)
    }

    /// Edges arriving at `id`, in insertion order.
    #[must_use]
    pub fn incoming_edges(&self, id: &NodeId) -> Vec<&TransitionEdge> {
        self.edges_at(id, &self.incoming)
    }

    /// Structural children of `id` (nodes listing it as a parent).
    #[must_use]
    pub fn children(&self, id: &NodeId) -> Vec<&ReasoningNode> {
        self.node_index
            .get(id)
            .map(|&pos| self.children[pos].iter().map(|&c| &self.nodes[c]).collect())
            .unwrap_or_default()
    }

    /// Transitive structural parents of `id`, excluding `id` itself.
    #[must_use]
    pub fn ancestors(&self, id: &NodeId) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(id.clone());

        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.get_node(&current) {
                for parent in &node.parent_ids {
                    if visited.insert(parent.clone()) {
                        queue.push_back(parent.clone());
                    }
                }
            }
        }

        // A loaded graph may hold a parent cycle that leads back to `id`.
        visited.remove(id);
        visited
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &ReasoningNode> {
        self.nodes.iter()
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &TransitionEdge> {
        self.edges.iter()
    }

    /// Clone every record into a serializable export.
    #[must_use]
    pub fn export(&self) -> GraphExport {
        GraphExport {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    /// Consume the graph, returning its records in insertion order.
    #[must_use]
    pub fn into_parts(self) -> GraphExport {
        GraphExport {
            nodes: self.nodes,
            edges: self.edges,
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn push_node(&mut self, node: ReasoningNode) -> usize {
        let pos = self.nodes.len();
        self.node_index.insert(node.id.clone(), pos);
        self.by_type
            .entry(node.type_tag.clone())
            .or_default()
            .push(pos);
        self.children.push(Vec::new());
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.nodes.push(node);
        pos
    }

    fn push_edge(&mut self, edge: TransitionEdge) {
        let pos = self.edges.len();
        // Dangling edges from a loaded graph stay out of the adjacency
        // indexes so ordering and replay only ever see resolvable edges.
        if let (Some(&from), Some(&to)) = (
            self.node_index.get(&edge.from_node_id),
            self.node_index.get(&edge.to_node_id),
        ) {
            self.outgoing[from].push(pos);
            self.incoming[to].push(pos);
        }
        self.edge_index.insert(edge.id.clone(), pos);
        self.edges.push(edge);
    }

    fn edges_at<'a>(&'a self, id: &NodeId, index: &'a [Vec<usize>]) -> Vec<&'a TransitionEdge> {
        self.node_index
            .get(id)
            .map(|&pos| index[pos].iter().map(|&e| &self.edges[e]).collect())
            .unwrap_or_default()
    }
}

impl From<GraphExport> for MerkleDag {
    fn from(export: GraphExport) -> Self {
        Self::from_parts(export.nodes, export.edges)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
