//! The graph-store seam.

use crate::statement::Statement;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One result row: column name to value.
pub type Row = Map<String, Value>;

/// Errors raised by a graph backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphStoreError {
    /// The backend cannot be reached at all.
    #[error("graph store unreachable: {0}")]
    Unreachable(String),

    /// The backend refused or failed one statement.
    #[error("{0}")]
    Rejected(String),

    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),
}

/// A property-graph backend that applies one statement at a time.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Check the backend is reachable.
    async fn ping(&self) -> Result<(), GraphStoreError>;

    /// Apply one compiled statement.
    async fn apply(&self, statement: &Statement) -> Result<Vec<Row>, GraphStoreError>;

    /// Run a raw read query, bypassing the compiler.
    async fn query(&self, text: &str) -> Result<Vec<Row>, GraphStoreError>;
}
