use crate::provider::ProviderError;

/// Registry errors surfaced to callers of submit/cancel/status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task {task_id} is not running ({reason})")]
    InvalidState { task_id: String, reason: String },
}

/// How a unit of task work ended short of a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskFailure {
    #[error("cancelled by caller")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl From<ProviderError> for TaskFailure {
    fn from(error: ProviderError) -> Self {
        Self::Failed(error.to_string())
    }
}
