//! Hosted-model messages API client

use super::{AssistantError, IntentModel, MAX_TOKENS};
use crate::config::AssistantConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: [Message<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Messages API client used as the assistant's [`IntentModel`]
#[derive(Clone)]
pub struct LlmIntentClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl LlmIntentClient {
    /// Create a client with an explicit key, endpoint and model
    #[must_use]
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url,
            model,
        }
    }

    /// Client from configuration, `None` without an API key
    #[must_use]
    pub fn from_config(config: &AssistantConfig) -> Option<Self> {
        let key = config.api_key.clone()?;
        Some(Self::new(key, config.api_url.clone(), config.model.clone()))
    }
}

impl std::fmt::Debug for LlmIntentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmIntentClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IntentModel for LlmIntentClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AssistantError> {
        let request = MessagesRequest {
            model: &self.model,
            system,
            messages: [Message {
                role: "user",
                content: user,
            }],
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistantError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .json::<MessagesResponse>()
                    .await
                    .map_err(|e| AssistantError::ResponseParseFailed(e.to_string()))?;
                let text: String = body
                    .content
                    .into_iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text),
                        ContentBlock::Other => None,
                    })
                    .collect();
                Ok(if text.trim().is_empty() { "{}".to_string() } else { text })
            },
            StatusCode::TOO_MANY_REQUESTS => Err(AssistantError::RateLimited),
            StatusCode::UNAUTHORIZED => Err(AssistantError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AssistantError::ApiError {
                    status: status.as_u16(),
                    message: body,
                })
            },
        }
    }
}
