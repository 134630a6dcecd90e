//! Per-task log buffers.

use crate::record::SharedRecords;

/// Append-only log handle bound to one task.
///
/// Cloned into whatever the task calls; every write lands in that task's
/// buffer in emission order and is mirrored to `tracing`.
#[derive(Clone)]
pub struct TaskLog {
    task_id: String,
    records: Option<SharedRecords>,
}

impl TaskLog {
    pub(crate) fn bound(task_id: impl Into<String>, records: SharedRecords) -> Self {
        Self {
            task_id: task_id.into(),
            records: Some(records),
        }
    }

    /// A log with no task record behind it; lines go to `tracing` only.
    pub fn detached(label: impl Into<String>) -> Self {
        Self {
            task_id: label.into(),
            records: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Append `fragment` verbatim.
    pub fn write(&self, fragment: &str) {
        let Some(records) = &self.records else {
            return;
        };
        if let Some(record) = records.lock().get_mut(&self.task_id) {
            record.log.push_str(fragment);
        }
    }

    /// Append `message` as one line.
    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(task_id = %self.task_id, "{message}");
        self.write(&format!("{message}\n"));
    }
}

impl std::fmt::Debug for TaskLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLog")
            .field("task_id", &self.task_id)
            .field("detached", &self.records.is_none())
            .finish()
    }
}
