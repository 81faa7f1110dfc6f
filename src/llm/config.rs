//! Chat-completion configuration

use crate::{Result, VoicepalError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Models the user can talk to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    /// ChatGLM-4 (Zhipu AI)
    #[serde(rename = "glm-4")]
    Glm4,
    /// Deepseek Chat
    #[default]
    #[serde(rename = "deepseek-chat")]
    DeepseekChat,
}

impl ModelId {
    /// Every selectable model, in display order
    pub const ALL: [ModelId; 2] = [ModelId::Glm4, ModelId::DeepseekChat];

    /// Identifier sent in the request body
    pub fn api_name(&self) -> &'static str {
        match self {
            ModelId::Glm4 => "glm-4",
            ModelId::DeepseekChat => "deepseek-chat",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelId::Glm4 => "ChatGLM-4",
            ModelId::DeepseekChat => "Deepseek Chat",
        }
    }

    /// Chat-completions URL used when the configuration names none
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ModelId::Glm4 => "https://open.bigmodel.cn/api/paas/v4/chat/completions",
            ModelId::DeepseekChat => "https://api.deepseek.com/v1/chat/completions",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelId::Glm4 => {
                "Powerful Chinese language model with excellent reasoning capabilities"
            }
            ModelId::DeepseekChat => "Advanced AI model with strong coding and reasoning abilities",
        }
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_name())
    }
}

impl FromStr for ModelId {
    type Err = VoicepalError;

    fn from_str(s: &str) -> Result<Self> {
        ModelId::ALL
            .into_iter()
            .find(|m| m.api_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VoicepalError::ConfigError(format!("Unknown model: {}", s)))
    }
}

/// Endpoint and credential of one chat-completion provider
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Full chat-completions URL; blank means the model's default
    pub endpoint: String,

    /// Bearer credential
    pub api_key: String,
}

impl ProviderConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

/// Configuration for the completion client
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Provider serving `deepseek-chat`
    pub deepseek: ProviderConfig,

    /// Provider serving `glm-4`
    pub zhipu: ProviderConfig,

    /// Temperature for sampling (0.0 = deterministic, 1.0+ = creative)
    pub temperature: f32,

    /// Maximum tokens to generate per response
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            deepseek: ProviderConfig::new(ModelId::DeepseekChat.default_endpoint(), ""),
            zhipu: ProviderConfig::new(ModelId::Glm4.default_endpoint(), ""),
            temperature: 0.7,
            max_tokens: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl CompletionConfig {
    /// Provider that serves the given model
    pub fn provider(&self, model: ModelId) -> &ProviderConfig {
        match model {
            ModelId::Glm4 => &self.zhipu,
            ModelId::DeepseekChat => &self.deepseek,
        }
    }

    /// URL the request for `model` goes to
    pub fn endpoint(&self, model: ModelId) -> &str {
        let endpoint = self.provider(model).endpoint.trim();
        if endpoint.is_empty() {
            model.default_endpoint()
        } else {
            endpoint
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Set the Deepseek provider
    pub fn with_deepseek(mut self, provider: ProviderConfig) -> Self {
        self.deepseek = provider;
        self
    }

    /// Set the Zhipu (ChatGLM) provider
    pub fn with_zhipu(mut self, provider: ProviderConfig) -> Self {
        self.zhipu = provider;
        self
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }
}
