use crate::cancel::CancellationToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Detail recorded on every cancelled task.
pub const CANCELLED_DETAIL: &str = "cancelled by caller";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal transition applied by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settlement {
    Completed(String),
    Failed(String),
    Cancelled,
}

pub(crate) struct TaskRecord {
    pub(crate) status: TaskStatus,
    pub(crate) log: String,
    pub(crate) result: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
    pub(crate) token: CancellationToken,
    pub(crate) cancel_requested: bool,
    pub(crate) settled: watch::Sender<bool>,
}

impl TaskRecord {
    pub(crate) fn running(token: CancellationToken) -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            status: TaskStatus::Running,
            log: String::new(),
            result: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            token,
            cancel_requested: false,
            settled,
        }
    }

    /// Move to a terminal state. Returns false when already terminal.
    pub(crate) fn settle(&mut self, settlement: Settlement) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match settlement {
            Settlement::Completed(result) => {
                self.status = TaskStatus::Completed;
                self.result = Some(result);
            }
            Settlement::Failed(detail) => {
                self.status = TaskStatus::Failed;
                self.error = Some(detail);
            }
            Settlement::Cancelled => {
                self.status = TaskStatus::Cancelled;
                self.error = Some(CANCELLED_DETAIL.to_string());
            }
        }
        self.finished_at = Some(Utc::now());
        self.settled.send_replace(true);
        true
    }

    pub(crate) fn view(&self, task_id: &str) -> TaskView {
        TaskView {
            task_id: task_id.to_string(),
            status: self.status,
            logs: self.log.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Snapshot of one task, as returned to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: String,
    pub status: TaskStatus,
    pub logs: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub(crate) struct SharedRecords(Arc<Mutex<BTreeMap<String, TaskRecord>>>);

impl SharedRecords {
    /// A poisoned lock still guards consistent data: every critical section
    /// is a handful of field writes.
    pub(crate) fn lock(&self) -> MutexGuard<'_, BTreeMap<String, TaskRecord>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
