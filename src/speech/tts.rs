//! Text-to-speech playback
//!
//! Speech is produced by the platform synthesizer (`espeak-ng`, `espeak` or
//! macOS `say`) running as a child process. Stopping playback kills the child.

use crate::{Result, VoicepalError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Words per minute at `rate == 1.0`
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Voice parameters applied to every playback
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// BCP-47 language tag
    pub voice: String,

    /// Speaking rate (1.0 = normal)
    pub rate: f32,

    /// Pitch multiplier (1.0 = normal)
    pub pitch: f32,

    /// Volume (0.0 to 1.0)
    pub volume: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            voice: "en-US".to_string(),
            rate: 0.9,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// Partial change to [`AudioSettings`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioSettingsUpdate {
    pub voice: Option<String>,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
}

impl AudioSettingsUpdate {
    pub fn rate(rate: f32) -> Self {
        Self {
            rate: Some(rate),
            ..Default::default()
        }
    }

    pub fn pitch(pitch: f32) -> Self {
        Self {
            pitch: Some(pitch),
            ..Default::default()
        }
    }

    pub fn volume(volume: f32) -> Self {
        Self {
            volume: Some(volume),
            ..Default::default()
        }
    }

    pub fn voice(voice: impl Into<String>) -> Self {
        Self {
            voice: Some(voice.into()),
            ..Default::default()
        }
    }

    /// Apply to `settings`. Blank voices and negative or non-finite numbers
    /// are ignored; volume is capped at 1.0.
    pub fn apply(&self, settings: &mut AudioSettings) {
        if let Some(voice) = self.voice.as_deref().map(str::trim) {
            if !voice.is_empty() {
                settings.voice = voice.to_string();
            }
        }
        if let Some(rate) = self.rate.filter(|v| valid(*v)) {
            settings.rate = rate;
        }
        if let Some(pitch) = self.pitch.filter(|v| valid(*v)) {
            settings.pitch = pitch;
        }
        if let Some(volume) = self.volume.filter(|v| valid(*v)) {
            settings.volume = volume.min(1.0);
        }
    }
}

fn valid(value: f32) -> bool {
    value.is_finite() && value >= 0.0
}

/// Device speech output
#[async_trait]
pub trait PlaybackAdapter: Send + Sync {
    /// Speak `text`. Resolves once the audio finished or was stopped.
    async fn speak(&self, text: &str, settings: &AudioSettings) -> Result<()>;

    /// Stop whatever is being spoken right now
    fn stop(&self);
}

/// Strip markup that synthesizers would read out loud
pub fn speakable_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '#' | '`' | '_' | '~'))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Which synthesizer binary was found
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthesizerKind {
    EspeakNg,
    Espeak,
    Say,
}

impl SynthesizerKind {
    const SEARCH_ORDER: [SynthesizerKind; 3] = [
        SynthesizerKind::EspeakNg,
        SynthesizerKind::Espeak,
        SynthesizerKind::Say,
    ];

    pub fn program(&self) -> &'static str {
        match self {
            SynthesizerKind::EspeakNg => "espeak-ng",
            SynthesizerKind::Espeak => "espeak",
            SynthesizerKind::Say => "say",
        }
    }

    /// Command-line arguments for speaking `text` with `settings`
    pub fn args(&self, text: &str, settings: &AudioSettings) -> Vec<String> {
        let words_per_minute = (BASE_WORDS_PER_MINUTE * settings.rate).round().max(80.0) as u32;
        // Avoid the text being parsed as an option
        let text = if text.starts_with('-') {
            format!(" {}", text)
        } else {
            text.to_string()
        };

        match self {
            SynthesizerKind::EspeakNg | SynthesizerKind::Espeak => {
                let pitch = (50.0 * settings.pitch).round().clamp(0.0, 99.0) as u32;
                let amplitude = (100.0 * settings.volume).round().clamp(0.0, 200.0) as u32;
                vec![
                    "-v".to_string(),
                    settings.voice.to_lowercase(),
                    "-s".to_string(),
                    words_per_minute.to_string(),
                    "-p".to_string(),
                    pitch.to_string(),
                    "-a".to_string(),
                    amplitude.to_string(),
                    text,
                ]
            }
            SynthesizerKind::Say => vec![
                "-r".to_string(),
                words_per_minute.to_string(),
                format!("[[volm {:.2}]] {}", settings.volume, text),
            ],
        }
    }
}

/// Speaks through the platform speech synthesizer
pub struct SystemSpeaker {
    kind: SynthesizerKind,
    path: PathBuf,
    current: Mutex<Option<CancellationToken>>,
}

impl SystemSpeaker {
    pub fn new(kind: SynthesizerKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            current: Mutex::new(None),
        }
    }

    /// Look for a synthesizer on `PATH`
    pub fn detect() -> Option<Self> {
        SynthesizerKind::SEARCH_ORDER.into_iter().find_map(|kind| {
            which::which(kind.program()).ok().map(|path| {
                info!("Using speech synthesizer: {}", path.display());
                Self::new(kind, path)
            })
        })
    }

    pub fn kind(&self) -> SynthesizerKind {
        self.kind
    }
}

#[async_trait]
impl PlaybackAdapter for SystemSpeaker {
    async fn speak(&self, text: &str, settings: &AudioSettings) -> Result<()> {
        let text = speakable_text(text);
        if text.is_empty() {
            return Ok(());
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        let mut child = Command::new(&self.path)
            .args(self.kind.args(&text, settings))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                VoicepalError::PlaybackError(format!("Failed to start {}: {}", self.kind.program(), e))
            })?;

        debug!("Speaking {} characters", text.len());

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(VoicepalError::PlaybackError(format!(
                    "{} exited with {}",
                    self.kind.program(),
                    status
                ))),
                Err(e) => Err(VoicepalError::PlaybackError(e.to_string())),
            },
            _ = token.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill synthesizer: {}", e);
                }
                debug!("Playback stopped");
                Ok(())
            }
        }
    }

    fn stop(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }
}

/// Playback stand-in that only logs; replies stay readable on screen
#[derive(Debug, Default)]
pub struct TextOnlySpeaker;

#[async_trait]
impl PlaybackAdapter for TextOnlySpeaker {
    async fn speak(&self, text: &str, _settings: &AudioSettings) -> Result<()> {
        debug!("(text only) {}", text);
        Ok(())
    }

    fn stop(&self) {}
}
