//! The task registry: submit, cancel, inspect.

use crate::cancel::CancellationToken;
use crate::error::{TaskError, TaskFailure};
use crate::record::{SharedRecords, TaskRecord, TaskView};
use crate::runner::{self, TaskContext};
use std::future::Future;
use uuid::Uuid;

/// Owns every task record for the life of the process.
///
/// Cloning yields another handle to the same registry. Records are never
/// evicted.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    records: SharedRecords,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `work` in the background and return its task id at once.
    ///
    /// The record exists (Running, empty log) before the work is spawned.
    pub fn submit<F, Fut>(&self, work: F) -> String
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, TaskFailure>> + Send + 'static,
    {
        let task_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        self.records
            .lock()
            .insert(task_id.clone(), TaskRecord::running(token.clone()));

        tokio::spawn(runner::drive(
            self.records.clone(),
            task_id.clone(),
            token,
            work,
        ));

        tracing::info!(task_id = %task_id, "task submitted");
        task_id
    }

    /// Request cooperative cancellation. Returns before the task settles.
    pub fn cancel(&self, task_id: &str) -> Result<(), TaskError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        let invalid = |reason: String| TaskError::InvalidState {
            task_id: task_id.to_string(),
            reason,
        };
        if record.status.is_terminal() {
            return Err(invalid(format!("status: {}", record.status)));
        }
        if record.cancel_requested {
            return Err(invalid("cancellation already requested".to_string()));
        }

        record.cancel_requested = true;
        record.token.cancel();
        tracing::info!(task_id = %task_id, "task cancellation requested");
        Ok(())
    }

    pub fn status(&self, task_id: &str) -> Result<TaskView, TaskError> {
        self.records
            .lock()
            .get(task_id)
            .map(|record| record.view(task_id))
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))
    }

    /// Wait until the task has settled, then return its final view.
    pub async fn wait(&self, task_id: &str) -> Result<TaskView, TaskError> {
        let mut settled = self
            .records
            .lock()
            .get(task_id)
            .map(|record| record.settled.subscribe())
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        // The record (and its sender) is never removed.
        let _ = settled.wait_for(|done| *done).await;
        self.status(task_id)
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.records.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CANCELLED_DETAIL, TaskStatus};
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn settled(registry: &TaskRegistry, task_id: &str) -> TaskView {
        tokio::time::timeout(Duration::from_secs(5), registry.wait(task_id))
            .await
            .expect("task should settle")
            .expect("task should exist")
    }

    #[tokio::test]
    async fn submit_is_running_then_completes() {
        let registry = TaskRegistry::new();
        let (release, released) = oneshot::channel::<()>();
        let task_id = registry.submit(|ctx| async move {
            ctx.log().line("working");
            let _ = released.await;
            Ok("answer".to_string())
        });

        let view = registry.status(&task_id).expect("task should exist");
        assert_eq!(view.status, TaskStatus::Running);
        assert_eq!(view.result, None);

        let _ = release.send(());
        let view = settled(&registry, &task_id).await;
        assert_eq!(view.status, TaskStatus::Completed);
        assert_eq!(view.result.as_deref(), Some("answer"));
        assert_eq!(view.error, None);
        assert!(view.finished_at.is_some());

        let started = view
            .logs
            .find("Execution Started")
            .expect("start line should be logged");
        let working = view.logs.find("working").expect("work line should be logged");
        let completed = view
            .logs
            .find("Execution Completed")
            .expect("completion line should be logged");
        assert!(started < working && working < completed);
    }

    #[tokio::test]
    async fn completed_task_rejects_cancel_and_keeps_result() {
        let registry = TaskRegistry::new();
        let task_id = registry.submit(|_| async { Ok("done".to_string()) });
        settled(&registry, &task_id).await;

        assert_eq!(
            registry.cancel(&task_id),
            Err(TaskError::InvalidState {
                task_id: task_id.clone(),
                reason: "status: completed".to_string(),
            })
        );
        let view = registry.status(&task_id).expect("task should exist");
        assert_eq!(view.status, TaskStatus::Completed);
        assert_eq!(view.result.as_deref(), Some("done"));
        assert_eq!(view.error, None);
    }

    #[tokio::test]
    async fn failure_is_captured_not_raised() {
        let registry = TaskRegistry::new();
        let task_id = registry.submit(|_| async { Err(TaskFailure::Failed("boom".to_string())) });

        let view = settled(&registry, &task_id).await;
        assert_eq!(view.status, TaskStatus::Failed);
        assert_eq!(view.error.as_deref(), Some("boom"));
        assert_eq!(view.result, None);
        assert!(view.logs.contains("Execution Failed"));
    }

    #[tokio::test]
    async fn cancel_twice_then_settles_cancelled() {
        let registry = TaskRegistry::new();
        let task_id = registry.submit(|_| async {
            std::future::pending::<()>().await;
            Ok(String::new())
        });

        registry.cancel(&task_id).expect("first cancel should succeed");
        assert!(matches!(
            registry.cancel(&task_id),
            Err(TaskError::InvalidState { .. })
        ));

        let view = settled(&registry, &task_id).await;
        assert_eq!(view.status, TaskStatus::Cancelled);
        assert_eq!(view.error.as_deref(), Some(CANCELLED_DETAIL));
        assert!(view.logs.contains("Execution Cancelled"));

        let err = registry
            .cancel(&task_id)
            .expect_err("terminal task cannot be cancelled");
        assert_eq!(
            err,
            TaskError::InvalidState {
                task_id: task_id.clone(),
                reason: "status: cancelled".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn cooperative_checkpoint_observes_cancel() {
        let registry = TaskRegistry::new();
        let (cancelled_tx, cancelled_rx) = oneshot::channel::<()>();
        let (checked_tx, checked_rx) = oneshot::channel::<bool>();
        let task_id = registry.submit(|ctx| async move {
            let _ = cancelled_rx.await;
            let _ = checked_tx.send(ctx.checkpoint().is_err());
            ctx.checkpoint()?;
            Ok("unreachable".to_string())
        });

        registry.cancel(&task_id).expect("cancel should succeed");
        let _ = cancelled_tx.send(());
        let view = settled(&registry, &task_id).await;
        assert_eq!(view.status, TaskStatus::Cancelled);
        // The work is aborted as soon as the runner sees the signal, so it
        // may never reach its checkpoint.
        if let Ok(saw_cancel) = checked_rx.await {
            assert!(saw_cancel);
        }
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let registry = TaskRegistry::new();
        assert_eq!(
            registry.status("nope"),
            Err(TaskError::NotFound("nope".to_string()))
        );
        assert_eq!(
            registry.cancel("nope"),
            Err(TaskError::NotFound("nope".to_string()))
        );
        assert!(matches!(
            registry.wait("nope").await,
            Err(TaskError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn panicking_work_fails_the_task() {
        let registry = TaskRegistry::new();
        let task_id = registry.submit(|_| async {
            if std::hint::black_box(true) {
                panic!("work exploded");
            }
            Ok(String::new())
        });
        let view = settled(&registry, &task_id).await;
        assert_eq!(view.status, TaskStatus::Failed);
        assert_eq!(view.error.as_deref(), Some("task panicked"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tasks_keep_separate_logs() {
        let registry = TaskRegistry::new();
        let ids = (0..8)
            .map(|n| {
                registry.submit(move |ctx| async move {
                    for step in 0..20 {
                        ctx.log().line(format!("task{n} step{step}"));
                        tokio::task::yield_now().await;
                    }
                    Ok(format!("done{n}"))
                })
            })
            .collect::<Vec<_>>();

        for (n, id) in ids.iter().enumerate() {
            let view = settled(&registry, id).await;
            assert_eq!(view.result, Some(format!("done{n}")));
            let steps = view
                .logs
                .lines()
                .filter(|line| line.starts_with("task"))
                .collect::<Vec<_>>();
            let expected = (0..20)
                .map(|step| format!("task{n} step{step}"))
                .collect::<Vec<_>>();
            assert_eq!(steps, expected);
        }
        assert_eq!(registry.task_ids().len(), 8);
    }
}
