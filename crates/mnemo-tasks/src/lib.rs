//! # mnemo-tasks
//!
//! Cancellable background agent tasks.
//!
//! - [`TaskRegistry`] owns every [`TaskView`]-able record: submit, cancel,
//!   status. Records are process-local and never evicted.
//! - The runner drives each submission to exactly one of Completed, Failed
//!   or Cancelled, racing the work against its [`CancellationToken`].
//! - [`TaskLog`] is the explicit per-task log handle handed to the work.
//! - [`CompletionProvider`] implementations (OpenAI, Gemini) are selected by
//!   model id through [`ModelRouter`].

pub mod agent;
pub mod cancel;
pub mod error;
pub mod gemini;
#[cfg(test)]
mod http_stub;
pub mod journal;
pub mod log;
pub mod openai;
pub mod provider;
pub mod record;
pub mod registry;
pub mod runner;

pub use agent::AgentTask;
pub use cancel::CancellationToken;
pub use error::{TaskError, TaskFailure};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use journal::GraphJournal;
pub use log::TaskLog;
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::{CompletionProvider, CompletionRequest, ModelRouter, ProviderError, ProviderKind};
pub use record::{CANCELLED_DETAIL, TaskStatus, TaskView};
pub use registry::TaskRegistry;
pub use runner::TaskContext;
