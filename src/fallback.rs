//! Conversational fallbacks
//!
//! Every adapter boundary turns its faults into one of these kinds before the
//! turn controller sees them. The controller appends and speaks the text just
//! like a real reply, so the message list stays the single thing a front end
//! has to render.

use serde::{Deserialize, Serialize};

/// Failure classes that can reach the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FallbackKind {
    /// Microphone access refused before capture started
    PermissionDenied,
    /// Recording could not be started or stopped for another reason
    CaptureFailed,
    /// No speech detected or an empty transcript came back
    EmptyTranscript,
    /// Polling ran out before the transcription job completed
    TranscriptionTimeout,
    /// The transcription job failed or an upload/submit request failed
    TranscriptionServiceError,
    /// HTTP 401 from the completion API
    AuthError,
    /// HTTP 402 from the completion API
    QuotaError,
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx from the completion API
    ServerFault,
    /// Connection could not be established
    NetworkError,
    /// Completion request timed out
    Timeout,
    /// Anything else the completion call produced
    UnknownCompletionError,
    /// Text-to-speech failed. Logged only; the text is already on screen.
    PlaybackError,
}

impl FallbackKind {
    /// Fixed text spoken and displayed for this kind
    pub fn message(&self) -> &'static str {
        match self {
            FallbackKind::PermissionDenied => {
                "I'm having trouble starting the recording. Please check your microphone permissions and try again."
            }
            FallbackKind::CaptureFailed => {
                "I'm having some technical difficulties right now. Let's try again in a moment."
            }
            FallbackKind::EmptyTranscript => {
                "I didn't hear anything. Could you please try speaking again?"
            }
            FallbackKind::TranscriptionTimeout => {
                "I'm taking a bit longer to process your voice. Could you please try speaking again?"
            }
            FallbackKind::TranscriptionServiceError => {
                "I'm having trouble processing your voice right now. Let's try again!"
            }
            FallbackKind::AuthError => {
                "I'm having trouble with my authentication. Please check my API key."
            }
            FallbackKind::QuotaError => {
                "My account needs more balance. Please check your account balance."
            }
            FallbackKind::RateLimited => {
                "I'm getting too many requests right now. Let's take a short break and try again."
            }
            FallbackKind::ServerFault => {
                "My brain is having some technical difficulties. Let's try again in a moment."
            }
            FallbackKind::NetworkError => {
                "I'm having trouble connecting to the internet. Please check your connection and try again."
            }
            FallbackKind::Timeout => {
                "I'm taking a bit longer to think about your message. Could you try again?"
            }
            FallbackKind::UnknownCompletionError => {
                "I'm having some trouble right now. Please try again!"
            }
            FallbackKind::PlaybackError => "",
        }
    }
}

impl std::fmt::Display for FallbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A classified failure together with the text to show for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub kind: FallbackKind,
    pub text: String,
}

impl Fallback {
    pub fn new(kind: FallbackKind) -> Self {
        Self {
            kind,
            text: kind.message().to_string(),
        }
    }

    /// Unclassified completion failure; the upstream detail is kept in the text
    pub fn unknown(detail: impl AsRef<str>) -> Self {
        let detail = detail.as_ref().trim();
        if detail.is_empty() {
            return Self::new(FallbackKind::UnknownCompletionError);
        }
        Self {
            kind: FallbackKind::UnknownCompletionError,
            text: format!("I'm having some trouble: {}. Please try again!", detail),
        }
    }
}

impl From<FallbackKind> for Fallback {
    fn from(kind: FallbackKind) -> Self {
        Fallback::new(kind)
    }
}

/// What an adapter hands back to the turn controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Fallback(Fallback),
}

impl Reply {
    pub fn fallback(kind: FallbackKind) -> Self {
        Reply::Fallback(Fallback::new(kind))
    }

    /// Text to append and speak, whichever variant this is
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) => text,
            Reply::Fallback(fallback) => &fallback.text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Reply::Text(text) => text,
            Reply::Fallback(fallback) => fallback.text,
        }
    }

    pub fn fallback_kind(&self) -> Option<FallbackKind> {
        match self {
            Reply::Text(_) => None,
            Reply::Fallback(fallback) => Some(fallback.kind),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Reply::Fallback(_))
    }
}

impl From<Fallback> for Reply {
    fn from(fallback: Fallback) -> Self {
        Reply::Fallback(fallback)
    }
}
