//! Chat-completion client
//!
//! One POST per call, no retries. Whatever goes wrong is classified into a
//! [`Fallback`] so the turn controller can speak it like a normal answer.

use super::config::{CompletionConfig, ModelId};
use crate::fallback::{Fallback, FallbackKind, Reply};
use crate::http::HttpFailure;
use crate::messages::Message;
use crate::{Result, VoicepalError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONNECTION_TEST_PROMPT: &str = "Hello, this is a test message.";
const CONNECTION_TEST_MAX_TOKENS: u32 = 50;
const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces the assistant's next line from the conversation so far
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Ask `model` for a reply to `history`. Never fails: errors come back as
    /// [`Reply::Fallback`].
    async fn complete(&self, model: ModelId, history: &[Message]) -> Reply;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'static str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for ChatMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: message.role().as_str(),
            content: message.content(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client serving every [`ModelId`]
pub struct ChatCompletionClient {
    config: CompletionConfig,
    http: reqwest::Client,
}

impl ChatCompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| VoicepalError::HttpError(e.to_string()))?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    async fn send(
        &self,
        model: ModelId,
        messages: Vec<ChatMessage<'_>>,
        max_tokens: u32,
        timeout: Duration,
    ) -> std::result::Result<String, HttpFailure> {
        let api_key = &self.config.provider(model).api_key;
        let body = ChatRequest {
            model: model.api_name(),
            messages,
            temperature: self.config.temperature,
            max_tokens,
            stream: false,
        };

        let response = self
            .http
            .post(self.config.endpoint(model))
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HttpFailure::from_response(response).await);
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| HttpFailure::Malformed("response contained no choices".to_string()))
    }

    /// Send a short test prompt and describe the outcome in one line
    pub async fn check_connection(&self, model: ModelId) -> String {
        info!("Testing connection to {}", model.display_name());
        let messages = vec![ChatMessage {
            role: "user",
            content: CONNECTION_TEST_PROMPT,
        }];

        match self
            .send(model, messages, CONNECTION_TEST_MAX_TOKENS, CONNECTION_TEST_TIMEOUT)
            .await
        {
            Ok(_) => format!("Connection to {} successful", model.display_name()),
            Err(failure) => {
                warn!("Connection test failed: {}", failure);
                format!("Connection to {} failed: {}", model.display_name(), failure)
            }
        }
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, model: ModelId, history: &[Message]) -> Reply {
        debug!(
            "Requesting completion from {} with {} messages",
            model,
            history.len()
        );
        let messages = history.iter().map(ChatMessage::from).collect();

        match self
            .send(
                model,
                messages,
                self.config.max_tokens,
                self.config.request_timeout(),
            )
            .await
        {
            Ok(content) => Reply::Text(content),
            Err(failure) => {
                warn!("Completion request to {} failed: {}", model, failure);
                Reply::Fallback(classify(failure))
            }
        }
    }
}

/// Map a failed completion exchange onto the fallback the user hears
pub(crate) fn classify(failure: HttpFailure) -> Fallback {
    match failure {
        HttpFailure::Timeout(_) => Fallback::new(FallbackKind::Timeout),
        HttpFailure::Status { status, message } => match status.as_u16() {
            401 => Fallback::new(FallbackKind::AuthError),
            402 => Fallback::new(FallbackKind::QuotaError),
            429 => Fallback::new(FallbackKind::RateLimited),
            500..=599 => Fallback::new(FallbackKind::ServerFault),
            code if message.is_empty() => Fallback::unknown(format!("HTTP {}", code)),
            _ => Fallback::unknown(message),
        },
        HttpFailure::Connect(_) => Fallback::new(FallbackKind::NetworkError),
        HttpFailure::Malformed(detail) => Fallback::unknown(detail),
    }
}
