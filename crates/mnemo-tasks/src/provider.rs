//! Completion providers and model-identifier routing.

use crate::log::TaskLog;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub model: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            model: model.into(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|s| !s.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error(
        "unsupported model identifier `{0}`: must contain 'gemini', 'gpt', 'o1' or 'o3'"
    )]
    UnsupportedModel(String),

    #[error("{0}")]
    NotConfigured(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response format: {0}")]
    UnexpectedResponse(String),
}

/// Text-generation backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
        log: &TaskLog,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

impl ProviderKind {
    /// Select a provider by case-insensitive substring of the model id.
    pub fn for_model(model: &str) -> Result<Self, ProviderError> {
        let lower = model.to_lowercase();
        if lower.contains("gemini") {
            Ok(Self::Gemini)
        } else if ["gpt", "o1", "o3"].iter().any(|tag| lower.contains(tag)) {
            Ok(Self::OpenAi)
        } else {
            Err(ProviderError::UnsupportedModel(model.to_string()))
        }
    }
}

/// Dispatches each request to the provider its model id selects.
#[derive(Clone)]
pub struct ModelRouter {
    gemini: Arc<dyn CompletionProvider>,
    openai: Arc<dyn CompletionProvider>,
}

impl ModelRouter {
    pub fn new(gemini: Arc<dyn CompletionProvider>, openai: Arc<dyn CompletionProvider>) -> Self {
        Self { gemini, openai }
    }

    pub fn route(&self, model: &str) -> Result<&Arc<dyn CompletionProvider>, ProviderError> {
        Ok(match ProviderKind::for_model(model)? {
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::OpenAi => &self.openai,
        })
    }
}

#[async_trait]
impl CompletionProvider for ModelRouter {
    async fn complete(
        &self,
        request: &CompletionRequest,
        log: &TaskLog,
    ) -> Result<String, ProviderError> {
        self.route(&request.model)?.complete(request, log).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Scripted provider for tests.
    pub(crate) enum Script {
        Reply(String),
        Fail(ProviderError),
        Hang,
    }

    pub(crate) struct ScriptedProvider {
        script: Script,
        pub(crate) seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(script: Script) -> Self {
            Self {
                script,
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn reply(text: &str) -> Self {
            Self::new(Script::Reply(text.to_string()))
        }

        pub(crate) fn calls(&self) -> usize {
            self.seen.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(
            &self,
            request: &CompletionRequest,
            log: &TaskLog,
        ) -> Result<String, ProviderError> {
            self.seen.lock().expect("lock").push(request.clone());
            log.line(format!("[scripted] completing {}", request.model));
            match &self.script {
                Script::Reply(text) => Ok(text.clone()),
                Script::Fail(error) => Err(error.clone()),
                Script::Hang => std::future::pending().await,
            }
        }
    }
}
