//! lineage-core library.
//!
//! Records the execution history of a multi-step reasoning process as a
//! branchable, append-only graph and reconstructs how a result was reached.
//!
//! - [`dag`]: the provenance graph store and its replay/query engine.
//! - [`event`]: the per-branch event log with optimistic concurrency.
//! - [`snapshot`]: branch snapshots and their SHA-256 content hash.
//! - [`facts`]: fact export for the symbolic constraint engine.
//! - [`session`]: recording a branch into the log and the graph together.
//!
//! # Conventions
//!
//! - **Errors**: each module returns its own `thiserror` enum with a
//!   `code()` mapping to [`error::ErrorCode`]; config loading uses
//!   `anyhow::Result`.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//!   The library never installs a subscriber.

pub mod config;
pub mod dag;
pub mod error;
pub mod event;
pub mod facts;
pub mod model;
pub mod session;
pub mod snapshot;

pub use config::{EngineConfig, load_config, resolve_config};
pub use dag::{MergePolicy, MerkleDag, ReplayEngine};
pub use error::ErrorCode;
pub use event::{ABSENT_VERSION, EventStore, InMemoryEventStore, PipelineEvent, Version};
pub use facts::to_facts;
pub use model::{NodeId, Payload, ReasoningNode, TransitionEdge};
pub use session::BranchRecorder;
pub use snapshot::{BranchSnapshot, SerializableVector, compute_hash, verify_hash, with_hash};
