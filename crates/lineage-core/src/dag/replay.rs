//! Read-side replay and query over a [`MerkleDag`].
//!
//! # Replay
//!
//! [`ReplayEngine::replay_path_to_node`] answers "how was this node reached":
//! it walks incoming transition edges backward from the target until it hits
//! a node with no incoming edge, then returns the edges root-to-target.
//!
//! # Merge nodes
//!
//! A node with several incoming edges is a merge. The walk follows exactly
//! one of them, chosen by [`MergePolicy`]:
//!
//! - [`MergePolicy::LatestEdge`] (default): the most recently inserted edge.
//! - [`MergePolicy::EarliestEdge`]: the first inserted edge.
//!
//! Insertion order is used rather than edge timestamps, since timestamps are
//! producer-supplied and may tie.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ReplayConfig;
use crate::error::ErrorCode;
use crate::model::{NodeId, ReasoningNode, TransitionEdge};

use super::graph::MerkleDag;

/// Errors from replay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// The requested node is not in the graph.
    #[error("node {0} not found")]
    NotFound(NodeId),

    /// The backward walk returned to a node it already visited.
    #[error("incoming transition edges loop back to node {0}")]
    CycleDetected(NodeId),
}

impl ReplayError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::CycleDetected(_) => ErrorCode::CycleDetected,
        }
    }
}

/// Which incoming edge a replay follows at a merge node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Follow the most recently inserted incoming edge.
    #[default]
    LatestEdge,
    /// Follow the first inserted incoming edge.
    EarliestEdge,
}

impl MergePolicy {
    fn pick<'a>(self, incoming: &[&'a TransitionEdge]) -> Option<&'a TransitionEdge> {
        match self {
            Self::LatestEdge => incoming.last().copied(),
            Self::EarliestEdge => incoming.first().copied(),
        }
    }
}

/// Read-only replay/query view over one graph.
#[derive(Debug, Clone, Copy)]
pub struct ReplayEngine<'a> {
    dag: &'a MerkleDag,
    policy: MergePolicy,
}

impl<'a> ReplayEngine<'a> {
    /// Wrap `dag` with the default merge policy.
    #[must_use]
    pub fn new(dag: &'a MerkleDag) -> Self {
        Self {
            dag,
            policy: MergePolicy::default(),
        }
    }

    #[must_use]
    pub fn from_config(dag: &'a MerkleDag, config: &ReplayConfig) -> Self {
        Self::new(dag).with_policy(config.merge_policy)
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Ordered operations that led to `node_id`, root first.
    ///
    /// A node with no incoming edge replays to an empty path.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::NotFound`] if `node_id` is not in the graph.
    /// - [`ReplayError::CycleDetected`] if the backward walk loops.
    pub fn replay_path_to_node(
        &self,
        node_id: &NodeId,
    ) -> Result<Vec<&'a TransitionEdge>, ReplayError> {
        if !self.dag.contains(node_id) {
            return Err(ReplayError::NotFound(node_id.clone()));
        }

        let mut path = Vec::new();
        let mut visited: HashSet<&NodeId> = HashSet::new();
        visited.insert(node_id);
        let mut current = node_id.clone();

        loop {
            let incoming = self.dag.incoming_edges(&current);
            let Some(edge) = self.policy.pick(&incoming) else {
                break;
            };
            if !visited.insert(&edge.from_node_id) {
                return Err(ReplayError::CycleDetected(edge.from_node_id.clone()));
            }
            path.push(edge);
            current = edge.from_node_id.clone();
        }

        path.reverse();
        tracing::trace!(node = %node_id, steps = path.len(), "replayed path");
        Ok(path)
    }

    /// History of transitions leading to `node_id`.
    ///
    /// Same walk as [`Self::replay_path_to_node`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::replay_path_to_node`].
    pub fn get_node_history(
        &self,
        node_id: &NodeId,
    ) -> Result<Vec<&'a TransitionEdge>, ReplayError> {
        self.replay_path_to_node(node_id)
    }

    /// Operation names along the replay path to `node_id`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::replay_path_to_node`].
    pub fn operations_to_node(&self, node_id: &NodeId) -> Result<Vec<&'a str>, ReplayError> {
        Ok(self
            .replay_path_to_node(node_id)?
            .into_iter()
            .map(|e| e.operation_name.as_str())
            .collect())
    }

    /// Edges satisfying `predicate`, in insertion order.
    pub fn query_transitions<P>(&self, predicate: P) -> Vec<&'a TransitionEdge>
    where
        P: Fn(&TransitionEdge) -> bool,
    {
        self.dag.edges().filter(|e| predicate(e)).collect()
    }

    /// Nodes satisfying `predicate`, in insertion order.
    pub fn query_nodes<P>(&self, predicate: P) -> Vec<&'a ReasoningNode>
    where
        P: Fn(&ReasoningNode) -> bool,
    {
        self.dag.nodes().filter(|n| predicate(n)).collect()
    }

    /// Edges with `start <= timestamp <= end`, in insertion order.
    #[must_use]
    pub fn get_transitions_in_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<&'a TransitionEdge> {
        self.query_transitions(|e| e.timestamp >= start && e.timestamp <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Payload;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn add(dag: &mut MerkleDag, id: &str, type_tag: &str) {
        dag.add_node(ReasoningNode::new(Payload::empty(type_tag)).with_id(id))
            .unwrap();
    }

    fn link(dag: &mut MerkleDag, id: &str, from: &str, to: &str, op: &str, at: i64) {
        dag.add_edge(TransitionEdge::new(from, to, op).with_id(id).at(ts(at)))
            .unwrap();
    }

    fn ops(edges: &[&TransitionEdge]) -> Vec<String> {
        edges.iter().map(|e| e.operation_name.clone()).collect()
    }

    fn chain() -> MerkleDag {
        let mut dag = MerkleDag::new();
        add(&mut dag, "a", "Draft");
        add(&mut dag, "b", "Critique");
        add(&mut dag, "c", "Final");
        link(&mut dag, "e1", "a", "b", "Op1", 10);
        link(&mut dag, "e2", "b", "c", "Op2", 20);
        dag
    }

    /// a -> b -> m  and  a -> c -> m, with the c edge inserted last.
    fn diamond() -> MerkleDag {
        let mut dag = MerkleDag::new();
        for id in ["a", "b", "c", "m"] {
            add(&mut dag, id, "Draft");
        }
        link(&mut dag, "ab", "a", "b", "Left", 1);
        link(&mut dag, "ac", "a", "c", "Right", 2);
        link(&mut dag, "bm", "b", "m", "MergeLeft", 3);
        link(&mut dag, "cm", "c", "m", "MergeRight", 4);
        dag
    }

    #[test]
    fn replay_linear_chain() {
        let dag = chain();
        let engine = ReplayEngine::new(&dag);
        let path = engine.replay_path_to_node(&"c".into()).unwrap();
        assert_eq!(ops(&path), vec!["Op1", "Op2"]);
        assert_eq!(engine.operations_to_node(&"b".into()).unwrap(), vec!["Op1"]);
    }

    #[test]
    fn replay_root_is_empty() {
        let dag = chain();
        assert!(ReplayEngine::new(&dag)
            .replay_path_to_node(&"a".into())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn replay_unknown_node_is_not_found() {
        let dag = chain();
        let err = ReplayEngine::new(&dag)
            .replay_path_to_node(&"ghost".into())
            .unwrap_err();
        assert_eq!(err, ReplayError::NotFound("ghost".into()));
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn history_matches_replay() {
        let dag = chain();
        let engine = ReplayEngine::new(&dag);
        assert_eq!(
            engine.get_node_history(&"c".into()).unwrap(),
            engine.replay_path_to_node(&"c".into()).unwrap()
        );
    }

    #[test]
    fn merge_follows_latest_edge_by_default() {
        let dag = diamond();
        let engine = ReplayEngine::new(&dag);
        assert_eq!(engine.policy(), MergePolicy::LatestEdge);
        assert_eq!(
            engine.operations_to_node(&"m".into()).unwrap(),
            vec!["Right", "MergeRight"]
        );
    }

    #[test]
    fn merge_can_follow_earliest_edge() {
        let dag = diamond();
        let config = ReplayConfig {
            merge_policy: MergePolicy::EarliestEdge,
        };
        let engine = ReplayEngine::from_config(&dag, &config);
        assert_eq!(
            engine.operations_to_node(&"m".into()).unwrap(),
            vec!["Left", "MergeLeft"]
        );
    }

    #[test]
    fn replay_reports_edge_loops() {
        let mut dag = chain();
        link(&mut dag, "back", "c", "a", "Loop", 30);
        let err = ReplayEngine::new(&dag)
            .replay_path_to_node(&"c".into())
            .unwrap_err();
        assert_eq!(err, ReplayError::CycleDetected("c".into()));
    }

    #[test]
    fn predicate_queries_preserve_insertion_order() {
        let dag = diamond();
        let engine = ReplayEngine::new(&dag);

        let merges = engine.query_transitions(|e| e.operation_name.starts_with("Merge"));
        assert_eq!(ops(&merges), vec!["MergeLeft", "MergeRight"]);

        let nodes: Vec<_> = engine
            .query_nodes(|n| n.id.as_str() != "a")
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(nodes, vec!["b", "c", "m"]);
    }

    #[test]
    fn time_range_is_inclusive() {
        let dag = diamond();
        let engine = ReplayEngine::new(&dag);

        assert_eq!(
            ops(&engine.get_transitions_in_time_range(ts(2), ts(3))),
            vec!["Right", "MergeLeft"]
        );
        assert_eq!(engine.get_transitions_in_time_range(ts(0), ts(10)).len(), 4);
        assert!(engine.get_transitions_in_time_range(ts(5), ts(10)).is_empty());
        assert!(engine.get_transitions_in_time_range(ts(3), ts(2)).is_empty());
    }
}
