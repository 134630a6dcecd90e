//! Progress entries written into the graph while an agent task runs.

use crate::log::TaskLog;
use chrono::{DateTime, Datelike, Utc};
use mnemo_graph::{AddNode, Chronology, MutationExecutor, Statement, TemporalAnchor, day_id_of};
use serde_json::{Map, Value};

pub const PROGRESS_NODE_TYPE: &str = "Analysis";

/// Writes one `Analysis` node per task, anchored to the current day.
#[derive(Clone)]
pub struct GraphJournal {
    executor: MutationExecutor,
}

impl GraphJournal {
    pub fn new(executor: MutationExecutor) -> Self {
        Self { executor }
    }

    /// Today's chronology, then the progress node and its anchor.
    pub fn statements(
        task_id: &str,
        model: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Statement>, mnemo_graph::CompileError> {
        let date = now.date_naive();
        let day_id = day_id_of(date);

        let mut properties = Map::new();
        properties.insert("id".into(), Value::String(format!("progress_{task_id}")));
        properties.insert(
            "full_text".into(),
            Value::String(format!(
                "[Status Update] Task ID: {task_id}. Proceeding with model {model}."
            )),
        );
        properties.insert("time".into(), Value::String(now.to_rfc3339()));

        let mut statements = Chronology {
            year: i64::from(date.year()),
            date: date.format("%Y-%m-%d").to_string(),
            day_id: day_id.clone(),
        }
        .compile()?;
        statements.extend(
            AddNode {
                node_type: PROGRESS_NODE_TYPE.to_string(),
                properties,
                anchor: Some(TemporalAnchor {
                    day_id,
                    time: now.format("%H:%M:%S").to_string(),
                }),
                relations: Vec::new(),
            }
            .compile()?,
        );
        Ok(statements)
    }

    /// Record progress. Failures are logged to the task, never returned.
    pub async fn record(&self, log: &TaskLog, model: &str) {
        let task_id = log.task_id();
        let statements = match Self::statements(task_id, model, Utc::now()) {
            Ok(statements) => statements,
            Err(e) => {
                log.line(format!("[{task_id}] Failed to compile progress entry: {e}"));
                return;
            }
        };

        log.line(format!("[{task_id}] Writing progress to the graph..."));
        match self.executor.execute(&statements).await {
            Ok(outcomes) => {
                let applied = outcomes.iter().filter(|o| o.is_success()).count();
                log.line(format!(
                    "[{task_id}] Progress saved: {applied}/{} statements applied",
                    outcomes.len()
                ));
            }
            Err(e) => log.line(format!("[{task_id}] Failed to save progress: {e}")),
        }
    }
}
