//! Drives one task from Running to exactly one terminal state.

use crate::cancel::CancellationToken;
use crate::error::TaskFailure;
use crate::log::TaskLog;
use crate::record::{Settlement, SharedRecords};
use std::future::Future;

/// What a unit of task work receives.
#[derive(Debug, Clone)]
pub struct TaskContext {
    log: TaskLog,
    token: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(log: TaskLog, token: CancellationToken) -> Self {
        Self { log, token }
    }

    /// A context with no registry record, for work run inline.
    pub fn detached(label: impl Into<String>) -> Self {
        Self::new(TaskLog::detached(label), CancellationToken::new())
    }

    pub fn log(&self) -> &TaskLog {
        &self.log
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn task_id(&self) -> &str {
        self.log.task_id()
    }

    /// Stop here if cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), TaskFailure> {
        if self.token.is_cancelled() {
            return Err(TaskFailure::Cancelled);
        }
        Ok(())
    }
}

pub(crate) async fn drive<F, Fut>(
    records: SharedRecords,
    task_id: String,
    token: CancellationToken,
    work: F,
) where
    F: FnOnce(TaskContext) -> Fut,
    Fut: Future<Output = Result<String, TaskFailure>> + Send + 'static,
{
    let log = TaskLog::bound(&task_id, records.clone());
    log.line(format!("--- [Task {task_id}] Execution Started ---"));

    let work = tokio::spawn(work(TaskContext::new(log.clone(), token.clone())));
    let abort = work.abort_handle();
    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => {
            abort.abort();
            Err(TaskFailure::Cancelled)
        }
        joined = work => match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(TaskFailure::Failed("task panicked".to_string())),
            Err(e) => Err(TaskFailure::Failed(e.to_string())),
        },
    };

    let settlement = match outcome {
        Ok(result) => {
            log.line(format!("--- [Task {task_id}] Execution Completed ---"));
            Settlement::Completed(result)
        }
        Err(TaskFailure::Cancelled) => {
            log.line(format!("--- [Task {task_id}] Execution Cancelled ---"));
            Settlement::Cancelled
        }
        Err(TaskFailure::Failed(detail)) => {
            log.line(format!("--- [Task {task_id}] Execution Failed: {detail} ---"));
            Settlement::Failed(detail)
        }
    };

    let settled = records
        .lock()
        .get_mut(&task_id)
        .is_some_and(|record| record.settle(settlement));
    if !settled {
        tracing::debug!(task_id = %task_id, "task already settled");
    }
}
