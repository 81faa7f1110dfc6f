//! Voicepal - talk to an AI friend
//!
//! Records the user's speech, sends it to a transcription service, forwards
//! the transcript to a chat-completion model and speaks the reply back.
//!
//! ```text
//! Capture -> Transcribe -> Complete -> Speak
//!    ^                                   |
//!    +---------- Turn Controller --------+
//! ```

pub mod audio;
pub mod fallback;
mod http;
pub mod integration;
pub mod llm;
pub mod messages;
pub mod speech;

pub use fallback::{Fallback, FallbackKind, Reply};
pub use integration::{
    Adapters, AppConfig, TurnCommand, TurnConfig, TurnController, TurnEvent, TurnHandle,
    TurnState,
};
pub use llm::ModelId;
pub use messages::{Conversation, Message, Role, SharedConversation};

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum VoicepalError {
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Playback error: {0}")]
    PlaybackError(String),

    #[error("HTTP client error: {0}")]
    HttpError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: TurnState,
    },
}

impl From<std::io::Error> for VoicepalError {
    fn from(e: std::io::Error) -> Self {
        VoicepalError::IOError(e.to_string())
    }
}

impl VoicepalError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Hardware/device errors may require user intervention
            VoicepalError::AudioDeviceError(_) => false,
            // The user has to grant access in the platform settings
            VoicepalError::PermissionDenied => false,
            VoicepalError::CaptureError(_) => true,
            VoicepalError::PlaybackError(_) => true,
            VoicepalError::HttpError(_) => false,
            VoicepalError::IOError(_) => false,
            VoicepalError::ConfigError(_) => false,
            VoicepalError::ChannelError(_) => false,
            // The caller simply acted at the wrong moment
            VoicepalError::InvalidState { .. } => true,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            VoicepalError::AudioDeviceError(_) => {
                "Audio device error. Please check your microphone/speakers.".to_string()
            }
            VoicepalError::PermissionDenied => {
                "Microphone access was denied. Please allow it in your settings.".to_string()
            }
            VoicepalError::CaptureError(_) => "Recording failed. Please try again.".to_string(),
            VoicepalError::PlaybackError(_) => {
                "Text-to-speech failed. Response will be shown as text.".to_string()
            }
            VoicepalError::HttpError(_) => {
                "Could not set up the network client.".to_string()
            }
            VoicepalError::IOError(_) => "File system error occurred.".to_string(),
            VoicepalError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            VoicepalError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            VoicepalError::InvalidState { .. } => {
                "That action isn't available right now.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, VoicepalError>;
