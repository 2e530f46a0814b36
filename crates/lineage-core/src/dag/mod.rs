//! Provenance graph of reasoning states and the operations between them.
//!
//! # Graph Properties
//!
//! - **Arena + indexes**: nodes live in one insertion-ordered arena keyed by
//!   id. The structural parent relation and the transition-edge relation are
//!   separate index maps over that arena.
//! - **Acyclic by construction** (structural): a node's parents must already
//!   exist when it is inserted.
//! - **Explicitly checked** (edges): edges only need existing endpoints, so
//!   ordering detects cycles itself.
//! - **Insertion order everywhere**: type lookups, predicate queries and
//!   topological tie-breaks all follow insertion order.
//!
//! # Sub-modules
//!
//! - [`graph`]: the graph store. ([`MerkleDag`], [`GraphError`])
//! - [`integrity`]: dangling-reference reports for loaded graphs.
//!   ([`IntegrityReport`])
//! - [`replay`]: path reconstruction and filtered queries.
//!   ([`ReplayEngine`], [`MergePolicy`])

pub mod graph;
pub mod integrity;
pub mod replay;

pub use graph::{GraphError, GraphExport, MerkleDag};
pub use integrity::{DanglingEdge, DanglingParent, IntegrityReport};
pub use replay::{MergePolicy, ReplayEngine, ReplayError};
