use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::constants;
use crate::conversation::{Message, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A role/content pair as the chat-completion endpoint expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        let role = match message.role {
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        };
        Self {
            role,
            content: message.content.clone(),
        }
    }
}

/// Every way a request can fail. Callers handle all of them the same way.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to chat endpoint failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("chat endpoint returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("chat endpoint returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("chat endpoint response has no choices[0].message.content")]
    MissingContent,
}

/// Sends one conversation to the model and returns the reply text.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TransportError>;
}

/// Where and as whom requests are sent.
#[derive(Clone)]
pub struct ApiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize, Debug)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

// Request body for an OpenAI-compatible /chat/completions endpoint
#[derive(Serialize, Debug)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    max_tokens: u32,
    stop: [&'static str; 1],
    temperature: f32,
    top_p: f32,
    top_k: u32,
    frequency_penalty: f32,
    n: u32,
    response_format: ResponseFormat,
}

impl<'a> CompletionRequest<'a> {
    fn new(model: &'a str, messages: &'a [ChatMessage]) -> Self {
        Self {
            model,
            messages,
            stream: false,
            max_tokens: constants::MAX_TOKENS,
            stop: [constants::STOP_MARKER],
            temperature: constants::TEMPERATURE,
            top_p: constants::TOP_P,
            top_k: constants::TOP_K,
            frequency_penalty: constants::FREQUENCY_PENALTY,
            n: 1,
            response_format: ResponseFormat { kind: "text" },
        }
    }
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Pulls `choices[0].message.content` out of a response body.
pub fn extract_content(body: &str) -> Result<String, TransportError> {
    let response: CompletionResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.is_empty())
        .ok_or(TransportError::MissingContent)
}

/// reqwest-backed transport. One attempt per call, no retries.
pub struct HttpChatTransport {
    client: Client,
    config: ApiConfig,
}

impl HttpChatTransport {
    pub fn new(config: ApiConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    #[instrument(skip(self, messages), fields(endpoint = %self.config.endpoint, messages = messages.len()))]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TransportError> {
        let payload = CompletionRequest::new(&self.config.model, messages);
        debug!(?payload, "Sending chat completion request");

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, %body, "Chat endpoint request failed");
            return Err(TransportError::Status { status, body });
        }

        let content = extract_content(&body)?;
        debug!(reply = %content, "Received chat completion");
        Ok(content)
    }
}
