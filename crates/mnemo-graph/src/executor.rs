//! Sequential statement execution with per-statement failure isolation.

use crate::statement::Statement;
use crate::store::{GraphStore, GraphStoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Result of applying one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementOutcome {
    /// Inline statement text.
    pub query: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatementOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Request-level failure: nothing was executed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
    #[error("graph store unreachable: {0}")]
    Connectivity(String),
}

#[derive(Clone)]
pub struct MutationExecutor {
    store: Arc<dyn GraphStore>,
}

impl MutationExecutor {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Apply `statements` strictly in order.
    ///
    /// A failing statement is recorded and execution continues with the next
    /// one. Only an unreachable store fails the whole call, and it does so
    /// before the first statement.
    pub async fn execute(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<StatementOutcome>, ExecuteError> {
        self.connect().await?;

        let mut outcomes = Vec::with_capacity(statements.len());
        for statement in statements {
            outcomes.push(self.apply(statement).await);
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        tracing::debug!(total = outcomes.len(), failed, "executed statement batch");
        Ok(outcomes)
    }

    /// Apply a single statement, still failing fast on connectivity.
    pub async fn execute_one(&self, statement: &Statement) -> Result<StatementOutcome, ExecuteError> {
        self.connect().await?;
        Ok(self.apply(statement).await)
    }

    async fn connect(&self) -> Result<(), ExecuteError> {
        self.store.ping().await.map_err(|e| match e {
            GraphStoreError::Unreachable(detail) => ExecuteError::Connectivity(detail),
            other => ExecuteError::Connectivity(other.to_string()),
        })
    }

    async fn apply(&self, statement: &Statement) -> StatementOutcome {
        let query = statement.to_inline();
        match self.store.apply(statement).await {
            Ok(_) => StatementOutcome {
                query,
                status: OutcomeStatus::Success,
                message: None,
            },
            Err(e) => {
                tracing::warn!(statement = %query, error = %e, "statement failed");
                StatementOutcome {
                    query,
                    status: OutcomeStatus::Error,
                    message: Some(e.to_string()),
                }
            }
        }
    }
}
