use crate::log::TaskLog;
use crate::provider::{CompletionProvider, CompletionRequest, ProviderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }
}

/// Chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

fn chat_request(request: &CompletionRequest) -> ChatRequest<'_> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system_prompt {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });
    ChatRequest {
        model: &request.model,
        messages,
    }
}

fn reply_text(body: &str) -> Result<String, ProviderError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::UnexpectedResponse(format!("{e}: {body}")))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::UnexpectedResponse(body.to_string()))
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
        log: &TaskLog,
    ) -> Result<String, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY not configured".into()))?;

        log.line(format!(
            "[openai] Sending request to OpenAI {}... This might take a while.",
            request.model
        ));
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&chat_request(request))
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = reply_text(&body)?;
        log.line("[openai] Received response from OpenAI API.");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_stub;
    use serde_json::json;

    fn provider(base_url: &str, api_key: Option<&str>) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig {
            api_key: api_key.map(str::to_string),
            base_url: base_url.to_string(),
        })
    }

    #[test]
    fn system_prompt_precedes_user_message() {
        let request = CompletionRequest::new("question", "gpt-4o")
            .with_system_prompt(Some("be brief".to_string()));
        let body = serde_json::to_value(chat_request(&request)).expect("request should serialize");
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "question"}
                ]
            })
        );
    }

    #[test]
    fn reply_without_choices_is_unexpected() {
        assert!(matches!(
            reply_text(r#"{"choices": []}"#),
            Err(ProviderError::UnexpectedResponse(_))
        ));
        assert_eq!(
            reply_text(r#"{"choices": [{"message": {"role": "assistant", "content": "hi"}}]}"#),
            Ok("hi".to_string())
        );
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let err = provider("http://127.0.0.1:9", None)
            .complete(
                &CompletionRequest::new("p", "gpt-4o"),
                &TaskLog::detached("test"),
            )
            .await
            .expect_err("missing key should fail");
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn posts_chat_completion_with_bearer_key() {
        let stub = http_stub::serve(vec![(
            200,
            json!({"choices": [{"message": {"content": "generated"}}]}).to_string(),
        )])
        .await;

        let text = provider(&stub.base_url, Some("sk-test"))
            .complete(
                &CompletionRequest::new("hello", "gpt-4o"),
                &TaskLog::detached("test"),
            )
            .await
            .expect("stub should reply");
        assert_eq!(text, "generated");

        let requests = stub.requests.await.expect("stub should finish");
        let raw = requests[0].to_lowercase();
        assert!(raw.starts_with("post /chat/completions"));
        assert!(raw.contains("authorization: bearer sk-test"));
        assert!(raw.contains(r#""content":"hello""#));
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let stub = http_stub::serve(vec![(429, r#"{"error":"slow down"}"#.to_string())]).await;
        let err = provider(&stub.base_url, Some("sk-test"))
            .complete(
                &CompletionRequest::new("hello", "gpt-4o"),
                &TaskLog::detached("test"),
            )
            .await
            .expect_err("429 should fail");
        assert_eq!(
            err,
            ProviderError::Api {
                status: 429,
                body: r#"{"error":"slow down"}"#.to_string(),
            }
        );
    }
}
