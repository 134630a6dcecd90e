//! Gemini `generateContent` over REST with an OAuth bearer token.
//!
//! The token file is an authorized-user credentials document:
//!
//! ```json
//! { "token": "...", "refresh_token": "...", "client_id": "...",
//!   "client_secret": "...", "token_uri": "...", "expiry": "2025-01-01T00:00:00Z" }
//! ```
//!
//! An expired (or absent) access token is refreshed in memory when the
//! refresh fields are present. The file itself is never rewritten.

use crate::log::TaskLog;
use crate::provider::{CompletionProvider, CompletionRequest, ProviderError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TOKEN_PATH: &str = "credentials/token.json";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub token_path: PathBuf,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AuthorizedUser {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    expiry: Option<String>,
}

/// How to obtain a bearer token from the credentials file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenPlan {
    Use(String),
    Refresh {
        token_uri: String,
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

impl AuthorizedUser {
    fn access(&self) -> Option<&str> {
        self.token
            .as_deref()
            .or(self.access_token.as_deref())
            .filter(|t| !t.is_empty())
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .is_some_and(|expiry| expiry.with_timezone(&Utc) <= now + Duration::seconds(60))
    }

    fn plan(&self, now: DateTime<Utc>) -> Option<TokenPlan> {
        let access = self.access();
        if let Some(token) = access
            && !self.expired(now)
        {
            return Some(TokenPlan::Use(token.to_string()));
        }
        match (&self.refresh_token, &self.client_id, &self.client_secret) {
            (Some(refresh_token), Some(client_id), Some(client_secret)) => {
                Some(TokenPlan::Refresh {
                    token_uri: self
                        .token_uri
                        .clone()
                        .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    refresh_token: refresh_token.clone(),
                })
            }
            _ => access.map(|token| TokenPlan::Use(token.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn bearer_token(&self, log: &TaskLog) -> Result<String, ProviderError> {
        let path = &self.config.token_path;
        let raw = tokio::fs::read_to_string(path).await.map_err(|_| {
            ProviderError::NotConfigured(format!(
                "token file not found at {}; generate it via OAuth first",
                path.display()
            ))
        })?;
        let credentials: AuthorizedUser = serde_json::from_str(&raw).map_err(|e| {
            ProviderError::NotConfigured(format!("invalid token file {}: {e}", path.display()))
        })?;

        match credentials.plan(Utc::now()) {
            Some(TokenPlan::Use(token)) => Ok(token),
            Some(TokenPlan::Refresh {
                token_uri,
                client_id,
                client_secret,
                refresh_token,
            }) => {
                log.line("[gemini] Access token expired; refreshing.");
                let response = self
                    .client
                    .post(&token_uri)
                    .form(&[
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("refresh_token", refresh_token.as_str()),
                        ("grant_type", "refresh_token"),
                    ])
                    .send()
                    .await
                    .map_err(|e| ProviderError::Http(format!("token refresh failed: {e}")))?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }
                response
                    .json::<RefreshResponse>()
                    .await
                    .map(|refreshed| refreshed.access_token)
                    .map_err(|e| ProviderError::UnexpectedResponse(format!("token refresh: {e}")))
            }
            None => Err(ProviderError::NotConfigured(format!(
                "token file {} has no usable token",
                path.display()
            ))),
        }
    }
}

fn generate_body(request: &CompletionRequest) -> Value {
    let mut body = json!({
        "contents": [{ "parts": [{ "text": request.prompt }] }]
    });
    if let Some(system) = &request.system_prompt {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

/// Concatenate the text parts of the first candidate.
fn candidate_text(body: &Value) -> Result<String, ProviderError> {
    let candidate = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .ok_or_else(|| ProviderError::UnexpectedResponse(body.to_string()))?;
    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    Ok(parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect())
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
        log: &TaskLog,
    ) -> Result<String, ProviderError> {
        let token = self.bearer_token(log).await?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            request.model
        );

        log.line(format!(
            "[gemini] Sending request to Gemini {}... This might take a while.",
            request.model
        ));
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&generate_body(request))
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

        let data: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::UnexpectedResponse(format!("{e}: {body}")))?;
        let text = candidate_text(&data)?;
        log.line("[gemini] Received response from Gemini API.");
        Ok(text)
    }
}
