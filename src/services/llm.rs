use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ExternalError;

/// Client for an OpenAI-compatible chat completions endpoint that returns
/// JSON objects.
pub struct LlmClient {
    http: Client,
    api_base: String,
    api_key: String,
    model: String,
}

/// One part of a multimodal user message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileData {
    pub filename: String,
    pub file_data: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ChatMessage<'a> {
    System { content: &'a str },
    User { content: Vec<ContentPart> },
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

impl LlmClient {
    pub fn new(
        api_base: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ad-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Send a system prompt plus user content and parse the reply as `T`.
    ///
    /// `service` names the caller in error messages.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        service: &str,
        system: &str,
        user: Vec<ContentPart>,
        temperature: f32,
    ) -> Result<T, ExternalError> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage::System { content: system },
                ChatMessage::User { content: user },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExternalError::from_reqwest(service, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::from_status(service, status, &body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::from_reqwest(service, e))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ExternalError::transient(service, "empty completion"))?;

        parse_json_reply(service, &content)
    }
}

/// Parse a model reply, tolerating a surrounding markdown code fence.
///
/// A malformed reply is treated as transient: the next sample usually parses.
pub fn parse_json_reply<T: DeserializeOwned>(service: &str, content: &str) -> Result<T, ExternalError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body)
        .map_err(|e| ExternalError::transient(service, format!("malformed model output: {e}")))
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
