//! # mnemo-graph
//!
//! Session-memory graph mutations.
//!
//! This crate provides:
//! - typed mutation requests (`OpenSession`, `AddNode`, `LinkNodes`, ...)
//!   compiled into ordered, idempotent [`Statement`]s
//! - literal/identifier encoding for the inline statement form, and a
//!   parameterized rendering for backends that take parameters
//! - the [`GraphStore`] seam and a [`MutationExecutor`] that applies
//!   statements in order with per-statement failure isolation
//! - [`MemoryGraph`], an in-process backend with an optional JSONL snapshot
//!
//! ## Data flow
//!
//! ```text
//! MutationRequest / BridgePayload
//!     │ compile (pure)
//!     ▼
//! Vec<Statement> ──► MutationExecutor ──► GraphStore
//!                         │
//!                         ▼
//!                  Vec<StatementOutcome>
//! ```

pub mod bridge;
pub mod executor;
pub mod literal;
pub mod memory;
pub mod mutation;
pub mod query;
pub mod snapshot;
pub mod statement;
pub mod store;

pub use bridge::{BridgeChronology, BridgeError, BridgeLink, BridgeNode, BridgePayload};
pub use executor::{ExecuteError, MutationExecutor, OutcomeStatus, StatementOutcome};
pub use literal::{Literal, quote_identifier, quote_literal, quote_text, unquote_literal};
pub use memory::{GraphData, GraphNode, GraphRelation, MemoryGraph};
pub use mutation::{
    AddNode, Chronology, CompileError, DAY_LABEL, ENTITY_NODE_TYPE, LinkNodes, MutationRequest,
    OpenSession, REL_HAPPENED_AT, REL_LAST_EVENT, REL_MONTH, REL_NEXT, RelationSpec,
    SESSION_LABEL, TemporalAnchor, UpdateLastPointer, YEAR_LABEL, compile_link_batch,
    compile_node_batch, day_id_for, day_id_of, year_id_for,
};
pub use query::{QueryError, ReadQuery};
pub use snapshot::SnapshotError;
pub use statement::{NodeMatch, ParameterizedStatement, Property, Statement, StatementOp};
pub use store::{GraphStore, GraphStoreError, Row};
