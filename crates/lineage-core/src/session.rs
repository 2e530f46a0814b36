//! Recording a branch into both the event log and the provenance graph.
//!
//! Producers append each pipeline event to the event log and materialize the
//! reasoning state it produced as a node, linked from the previous head by a
//! transition edge. [`BranchRecorder`] performs those three writes as one step
//! per event and tracks the branch version it last wrote, so a competing
//! writer on the same branch surfaces as a [`ErrorCode::ConcurrencyConflict`].

use tracing::debug;

use crate::dag::{GraphError, MerkleDag};
use crate::error::ErrorCode;
use crate::event::{EventLogError, EventStore, PipelineEvent, Version};
use crate::model::{NodeId, ReasoningNode, TransitionEdge};
use crate::snapshot::{BranchSnapshot, SerializableVector};

/// Errors from recording a step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Log(#[from] EventLogError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl RecordError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Log(err) => err.code(),
            Self::Graph(err) => err.code(),
        }
    }
}

/// Result of one recorded step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    /// Branch version of the appended event.
    pub version: Version,
    pub node_id: NodeId,
    /// Edge from the previous head, absent for the first step.
    pub edge_id: Option<String>,
}

/// Appends events to one branch and mirrors them into a graph.
pub struct BranchRecorder<'a, S: EventStore + ?Sized> {
    store: &'a S,
    dag: &'a mut MerkleDag,
    branch_id: String,
    version: Version,
    head: Option<NodeId>,
}

impl<'a, S: EventStore + ?Sized> BranchRecorder<'a, S> {
    /// Start recording `branch_id` at its current version.
    ///
    /// # Errors
    ///
    /// Propagates backend failures from the store.
    pub fn new(
        store: &'a S,
        dag: &'a mut MerkleDag,
        branch_id: impl Into<String>,
    ) -> Result<Self, EventLogError> {
        let branch_id = branch_id.into();
        let version = store.get_version(&branch_id)?;
        Ok(Self {
            store,
            dag,
            branch_id,
            version,
            head: None,
        })
    }

    /// Continue from an existing node instead of starting a new root.
    #[must_use]
    pub fn with_head(mut self, head: NodeId) -> Self {
        self.head = Some(head);
        self
    }

    /// Record one step.
    ///
    /// The node is checked against the graph before anything is written, so
    /// a rejected node leaves both the log and the graph untouched. A node
    /// that declares no parents gets the current head as its parent.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Graph`] if the node id exists, a parent is unknown,
    ///   or the head set through [`Self::with_head`] is not in the graph.
    /// - [`RecordError::Log`] with a conflict if another writer advanced the
    ///   branch since this recorder last wrote it.
    pub fn record(
        &mut self,
        event: PipelineEvent,
        node: ReasoningNode,
        operation: &str,
    ) -> Result<Recorded, RecordError> {
        let node = match (&self.head, node.parent_ids.is_empty()) {
            (Some(head), true) => node.with_parents([head.clone()]),
            _ => node,
        };
        self.check_insertable(&node)?;

        let version = self
            .store
            .append_events(&self.branch_id, vec![event], Some(self.version))?;
        self.version = version;

        let node_id = node.id.clone();
        let created_at = node.created_at;
        self.dag.add_node(node)?;

        let edge_id = match &self.head {
            Some(previous) => {
                let edge = TransitionEdge::new(previous.clone(), node_id.clone(), operation)
                    .at(created_at);
                let id = edge.id.clone();
                self.dag.add_edge(edge)?;
                Some(id)
            }
            None => None,
        };

        debug!(
            branch = %self.branch_id,
            version,
            node = %node_id,
            operation,
            "recorded step"
        );

        self.head = Some(node_id.clone());
        Ok(Recorded {
            version,
            node_id,
            edge_id,
        })
    }

    /// Snapshot the branch as currently stored.
    ///
    /// # Errors
    ///
    /// Propagates backend failures from the store.
    pub fn snapshot(
        &self,
        vectors: Vec<SerializableVector>,
    ) -> Result<BranchSnapshot, EventLogError> {
        BranchSnapshot::capture(self.store, &self.branch_id, vectors)
    }

    #[must_use]
    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    /// Version of the last event this recorder appended (or saw at start).
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub const fn head(&self) -> Option<&NodeId> {
        self.head.as_ref()
    }

    /// The graph being written.
    #[must_use]
    pub fn dag(&self) -> &MerkleDag {
        &*self.dag
    }

    /// Every graph write `record` will make must succeed before the log is
    /// touched: the node itself, its parents, and the edge from the head.
    fn check_insertable(&self, node: &ReasoningNode) -> Result<(), GraphError> {
        if let Some(head) = self.head.as_ref().filter(|h| !self.dag.contains(h)) {
            return Err(GraphError::MissingNode {
                edge: format!("{head} -> {}", node.id),
                node: head.clone(),
            });
        }
        if self.dag.contains(&node.id) {
            return Err(GraphError::AlreadyExists(node.id.clone()));
        }
        if let Some(parent) = node.parent_ids.iter().find(|p| !self.dag.contains(p)) {
            return Err(GraphError::MissingParent {
                node: node.id.clone(),
                parent: parent.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ReplayEngine;
    use crate::event::{ABSENT_VERSION, InMemoryEventStore};
    use crate::model::Payload;
    use serde_json::json;

    fn step(kind: &str, id: &str) -> (PipelineEvent, ReasoningNode) {
        (
            PipelineEvent::new(kind, json!({ "node": id })),
            ReasoningNode::new(Payload::new(kind, json!({}))).with_id(id),
        )
    }

    #[test]
    fn records_chain_into_log_and_graph() {
        let store = InMemoryEventStore::new();
        let mut dag = MerkleDag::new();
        let mut recorder = BranchRecorder::new(&store, &mut dag, "main").unwrap();

        let (e, n) = step("draft", "d1");
        let first = recorder.record(e, n, "Generate").unwrap();
        assert_eq!(first.version, 0);
        assert!(first.edge_id.is_none());

        let (e, n) = step("critique", "c1");
        recorder.record(e, n, "Critique").unwrap();
        let (e, n) = step("draft", "d2");
        let last = recorder.record(e, n, "UseCritique").unwrap();
        assert_eq!(last.version, 2);
        assert_eq!(recorder.head(), Some(&NodeId::from("d2")));

        let dag = recorder.dag();
        assert_eq!(dag.node_count(), 3);
        assert_eq!(dag.edge_count(), 2);
        assert_eq!(
            dag.get_node(&"c1".into()).unwrap().parent_ids,
            vec![NodeId::from("d1")]
        );
        assert_eq!(
            ReplayEngine::new(dag).operations_to_node(&"d2".into()).unwrap(),
            vec!["Critique", "UseCritique"]
        );
        assert_eq!(store.get_version("main").unwrap(), 2);
    }

    #[test]
    fn rejected_node_writes_nothing() {
        let store = InMemoryEventStore::new();
        let mut dag = MerkleDag::new();
        let mut recorder = BranchRecorder::new(&store, &mut dag, "main").unwrap();

        let (e, n) = step("draft", "d1");
        recorder.record(e, n, "Generate").unwrap();

        let (e, n) = step("draft", "d1");
        let err = recorder.record(e, n, "Generate").unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);

        let (e, n) = step("draft", "x");
        let err = recorder
            .record(e, n.with_parents(["ghost"]), "Generate")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingReference);

        assert_eq!(store.get_version("main").unwrap(), 0);
        assert_eq!(recorder.dag().node_count(), 1);
    }

    #[test]
    fn unknown_head_writes_nothing_and_recorder_recovers() {
        let store = InMemoryEventStore::new();
        let mut dag = MerkleDag::new();
        dag.add_node(ReasoningNode::new(Payload::empty("Draft")).with_id("root"))
            .unwrap();
        let mut recorder = BranchRecorder::new(&store, &mut dag, "main")
            .unwrap()
            .with_head("ghost".into());

        let (e, n) = step("draft", "x");
        let err = recorder
            .record(e, n.with_parents(["root"]), "Op")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingReference);
        assert!(matches!(
            err,
            RecordError::Graph(GraphError::MissingNode { ref node, .. }) if node.as_str() == "ghost"
        ));

        assert_eq!(store.get_version("main").unwrap(), ABSENT_VERSION);
        assert_eq!(recorder.dag().node_count(), 1);
        assert_eq!(recorder.version(), ABSENT_VERSION);
        assert_eq!(recorder.head(), Some(&NodeId::from("ghost")));

        let mut recorder = recorder.with_head("root".into());
        let (e, n) = step("draft", "x");
        let recorded = recorder.record(e, n, "Op").unwrap();
        assert_eq!(recorded.version, 0);
        assert!(recorded.edge_id.is_some());
        assert_eq!(
            recorder.dag().get_node(&"x".into()).unwrap().parent_ids,
            vec![NodeId::from("root")]
        );
    }

    #[test]
    fn competing_writer_is_a_conflict() {
        let store = InMemoryEventStore::new();
        let mut dag = MerkleDag::new();
        let mut recorder = BranchRecorder::new(&store, &mut dag, "main").unwrap();

        store
            .append_events("main", vec![PipelineEvent::new("other", json!(null))], None)
            .unwrap();

        let (e, n) = step("draft", "d1");
        let err = recorder.record(e, n, "Generate").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConcurrencyConflict);
        assert!(recorder.dag().is_empty());
    }

    #[test]
    fn snapshot_tracks_recorded_events() {
        let store = InMemoryEventStore::new();
        let mut dag = MerkleDag::new();
        let mut recorder = BranchRecorder::new(&store, &mut dag, "main").unwrap();
        let (e, n) = step("draft", "d1");
        recorder.record(e, n, "Generate").unwrap();

        let snapshot = recorder.snapshot(vec![]).unwrap();
        assert_eq!(snapshot.name(), "main");
        assert_eq!(snapshot.events().len(), 1);
    }
}
