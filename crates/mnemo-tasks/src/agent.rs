//! Agent tasks: one completion request, optionally journaled to the graph.

use crate::error::TaskFailure;
use crate::journal::GraphJournal;
use crate::log::TaskLog;
use crate::provider::{CompletionProvider, CompletionRequest, ProviderError};
use crate::registry::TaskRegistry;
use crate::runner::TaskContext;
use std::sync::Arc;

#[derive(Clone)]
pub struct AgentTask {
    provider: Arc<dyn CompletionProvider>,
    journal: Option<GraphJournal>,
}

impl AgentTask {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Option<GraphJournal>) -> Self {
        self.journal = journal;
        self
    }

    /// Task body: checkpoints sit before each external call.
    pub async fn run(
        &self,
        ctx: &TaskContext,
        request: &CompletionRequest,
    ) -> Result<String, TaskFailure> {
        let task_id = ctx.task_id();
        ctx.log()
            .line(format!("[{task_id}] Running prompt with model {}", request.model));

        if let Some(journal) = &self.journal {
            ctx.checkpoint()?;
            journal.record(ctx.log(), &request.model).await;
        }

        ctx.checkpoint()?;
        let text = self.provider.complete(request, ctx.log()).await?;
        ctx.log().line(format!(
            "[{task_id}] Completion received ({} chars)",
            text.chars().count()
        ));
        Ok(text)
    }

    /// Start the task in `registry`; returns its id without waiting.
    pub fn submit(&self, registry: &TaskRegistry, request: CompletionRequest) -> String {
        let agent = self.clone();
        registry.submit(move |ctx| async move { agent.run(&ctx, &request).await })
    }

    /// Run inline, blocking the caller until the provider answers.
    pub async fn run_inline(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let log = TaskLog::detached("inline");
        log.line(format!("[inline] Running prompt with model {}", request.model));
        self.provider.complete(request, &log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{Script, ScriptedProvider};
    use crate::record::TaskStatus;
    use mnemo_graph::{GraphStore, MemoryGraph, MutationExecutor};
    use std::time::Duration;

    async fn settle(registry: &TaskRegistry, task_id: &str) -> crate::TaskView {
        tokio::time::timeout(Duration::from_secs(5), registry.wait(task_id))
            .await
            .expect("task should settle")
            .expect("task should exist")
    }

    #[tokio::test]
    async fn completed_task_carries_provider_text() {
        let provider = Arc::new(ScriptedProvider::reply("forty-two"));
        let registry = TaskRegistry::new();
        let task_id = AgentTask::new(provider.clone())
            .submit(&registry, CompletionRequest::new("q", "gpt-4o"));

        let view = settle(&registry, &task_id).await;
        assert_eq!(view.status, TaskStatus::Completed);
        assert_eq!(view.result.as_deref(), Some("forty-two"));
        assert!(view.logs.contains("[scripted] completing gpt-4o"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn provider_error_fails_task() {
        let provider = Arc::new(ScriptedProvider::new(Script::Fail(ProviderError::Api {
            status: 500,
            body: "down".to_string(),
        })));
        let registry = TaskRegistry::new();
        let task_id =
            AgentTask::new(provider).submit(&registry, CompletionRequest::new("q", "gemini"));

        let view = settle(&registry, &task_id).await;
        assert_eq!(view.status, TaskStatus::Failed);
        assert_eq!(
            view.error.as_deref(),
            Some("API returned status 500: down")
        );
    }

    #[tokio::test]
    async fn hanging_provider_is_cancelled() {
        let provider = Arc::new(ScriptedProvider::new(Script::Hang));
        let registry = TaskRegistry::new();
        let task_id = AgentTask::new(provider.clone())
            .submit(&registry, CompletionRequest::new("q", "gemini"));

        // Let the work reach the provider call before cancelling.
        for _ in 0..50 {
            if provider.calls() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        registry.cancel(&task_id).expect("cancel should succeed");

        let view = settle(&registry, &task_id).await;
        assert_eq!(view.status, TaskStatus::Cancelled);
        assert_eq!(view.result, None);
    }

    #[tokio::test]
    async fn journal_entry_lands_in_graph_and_log() {
        let graph = Arc::new(MemoryGraph::new());
        let agent = AgentTask::new(Arc::new(ScriptedProvider::reply("ok")))
            .with_journal(Some(GraphJournal::new(MutationExecutor::new(graph.clone()))));
        let registry = TaskRegistry::new();
        let task_id = agent.submit(&registry, CompletionRequest::new("q", "gpt-4o"));

        let view = settle(&registry, &task_id).await;
        assert_eq!(view.status, TaskStatus::Completed);
        assert!(view.logs.contains("Progress saved: 5/5 statements applied"));

        let rows = graph
            .query(&format!(
                "MATCH (a:Analysis {{id: \"progress_{task_id}\"}}) RETURN a.full_text"
            ))
            .await
            .expect("read query should run");
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn inline_run_returns_provider_result() {
        let agent = AgentTask::new(Arc::new(ScriptedProvider::reply("inline answer")));
        let text = agent
            .run_inline(&CompletionRequest::new("q", "gpt-4o"))
            .await
            .expect("inline run should succeed");
        assert_eq!(text, "inline answer");
    }
}
