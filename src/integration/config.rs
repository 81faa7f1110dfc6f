//! Configuration for the whole application
//!
//! Loaded from a TOML file where every section and field is optional, then
//! overlaid with API keys from the environment.

use crate::llm::{CompletionConfig, ModelId};
use crate::messages::{DEFAULT_GREETING, DEFAULT_HISTORY_LIMIT};
use crate::speech::{AudioSettings, TranscriptionConfig};
use crate::{Result, VoicepalError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEEPSEEK_API_KEY_ENV: &str = "DEEPSEEK_API_KEY";
pub const ZHIPU_API_KEY_ENV: &str = "ZHIPU_API_KEY";
pub const ASSEMBLYAI_API_KEY_ENV: &str = "ASSEMBLYAI_API_KEY";

/// Turn controller settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Recording is ended automatically after this many seconds
    pub capture_timeout_secs: u64,

    /// Messages kept in the conversation, greeting included
    pub history_limit: usize,

    /// Model used until the user switches
    pub default_model: ModelId,

    /// Speak the greeting when the application starts
    pub greet_on_start: bool,

    /// Opening assistant line of every conversation
    pub greeting: String,

    /// Capacity of the command channel
    pub command_buffer: usize,

    /// Capacity of the event channel; events beyond it are dropped
    pub event_buffer: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            capture_timeout_secs: 30,
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_model: ModelId::default(),
            greet_on_start: true,
            greeting: DEFAULT_GREETING.to_string(),
            command_buffer: 32,
            event_buffer: 256,
        }
    }
}

impl TurnConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs.max(1))
    }

    /// Set the model used until the user switches
    pub fn with_model(mut self, model: ModelId) -> Self {
        self.default_model = model;
        self
    }

    /// Set the history bound
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the automatic end-of-recording timeout, in whole seconds (at least one)
    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the greeting
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }
}

/// Top-level configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub turn: TurnConfig,
    pub completion: CompletionConfig,
    pub transcription: TranscriptionConfig,
    pub audio: AudioSettings,
}

impl AppConfig {
    /// `<config dir>/voicepal/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voicepal").join("config.toml"))
    }

    /// Read a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VoicepalError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config = toml::from_str(&contents).map_err(|e| {
            VoicepalError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the default path if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Fill API keys from the process environment
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Fill API keys from `lookup`; non-empty values win over the file
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let overlay = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                debug!("Using {} from environment", key);
                *target = value.trim().to_string();
            }
        };

        overlay(&mut self.completion.deepseek.api_key, DEEPSEEK_API_KEY_ENV);
        overlay(&mut self.completion.zhipu.api_key, ZHIPU_API_KEY_ENV);
        overlay(&mut self.transcription.api_key, ASSEMBLYAI_API_KEY_ENV);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(VoicepalError::ConfigError(msg));

        if self.turn.history_limit == 0 {
            return invalid("turn.history_limit must be at least 1".into());
        }
        if self.turn.capture_timeout_secs == 0 {
            return invalid("turn.capture_timeout_secs must be at least 1".into());
        }
        if self.turn.command_buffer == 0 || self.turn.event_buffer == 0 {
            return invalid("turn channel buffers must be at least 1".into());
        }
        if self.transcription.max_poll_attempts == 0 {
            return invalid("transcription.max_poll_attempts must be at least 1".into());
        }

        let model = self.turn.default_model;
        if self.completion.provider(model).api_key.trim().is_empty() {
            let env = match model {
                ModelId::DeepseekChat => DEEPSEEK_API_KEY_ENV,
                ModelId::Glm4 => ZHIPU_API_KEY_ENV,
            };
            return invalid(format!(
                "No API key for {} (set {})",
                model.display_name(),
                env
            ));
        }
        if self.transcription.api_key.trim().is_empty() {
            return invalid(format!(
                "No transcription API key (set {})",
                ASSEMBLYAI_API_KEY_ENV
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn with_keys() -> AppConfig {
        AppConfig::default().with_env_from(|key| match key {
            DEEPSEEK_API_KEY_ENV => Some("sk-deepseek".to_string()),
            ASSEMBLYAI_API_KEY_ENV => Some("aai-key".to_string()),
            _ => None,
        })
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.turn.capture_timeout(), Duration::from_secs(30));
        assert_eq!(config.turn.history_limit, 10);
        assert_eq!(config.turn.default_model, ModelId::DeepseekChat);
        assert!(config.turn.greet_on_start);
        assert_eq!(config.audio.rate, 0.9);
    }

    #[test]
    fn test_capture_timeout_never_rounds_to_zero() {
        let turn = TurnConfig::default().with_capture_timeout(Duration::from_millis(500));
        assert_eq!(turn.capture_timeout(), Duration::from_secs(1));

        let turn = TurnConfig::default().with_capture_timeout(Duration::from_secs(45));
        assert_eq!(turn.capture_timeout(), Duration::from_secs(45));

        let turn = TurnConfig {
            capture_timeout_secs: 0,
            ..TurnConfig::default()
        };
        assert_eq!(turn.capture_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_env_overlay() {
        let config = with_keys();
        assert_eq!(config.completion.deepseek.api_key, "sk-deepseek");
        assert_eq!(config.transcription.api_key, "aai-key");
        assert!(config.completion.zhipu.api_key.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_keys() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains(DEEPSEEK_API_KEY_ENV));

        let mut config = with_keys();
        config.turn.default_model = ModelId::Glm4;
        assert!(config.validate().unwrap_err().to_string().contains(ZHIPU_API_KEY_ENV));
    }

    #[test]
    fn test_validate_zero_limits() {
        let mut config = with_keys();
        config.turn.history_limit = 0;
        assert!(config.validate().is_err());

        let mut config = with_keys();
        config.transcription.max_poll_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[turn]
default_model = "glm-4"
history_limit = 6

[completion.zhipu]
api_key = "zhipu-file-key"

[audio]
rate = 1.1
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.turn.default_model, ModelId::Glm4);
        assert_eq!(config.turn.history_limit, 6);
        assert_eq!(config.turn.capture_timeout_secs, 30);
        assert_eq!(config.completion.zhipu.api_key, "zhipu-file-key");
        assert!(config.completion.endpoint(ModelId::Glm4).contains("bigmodel.cn"));
        assert_eq!(config.audio.rate, 1.1);
        assert_eq!(config.audio.voice, "en-US");
    }

    #[test]
    fn test_load_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[turn]\nhistory_limit = \"ten\"").unwrap();

        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, VoicepalError::ConfigError(_)));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load_or_default(Some(&missing)).is_err());
    }
}
