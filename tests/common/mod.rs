//! Scripted adapters for driving the turn controller in tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voicepal::audio::{AudioClip, CaptureAdapter};
use voicepal::llm::CompletionClient;
use voicepal::speech::{AudioSettings, PlaybackAdapter, TranscriptionClient};
use voicepal::{Adapters, Message, ModelId, Reply, VoicepalError};

#[derive(Default)]
pub struct ScriptedCapture {
    start_error: Mutex<Option<VoicepalError>>,
    stop_error: Mutex<Option<VoicepalError>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub cleanups: AtomicUsize,
}

impl ScriptedCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_start(error: VoicepalError) -> Arc<Self> {
        let capture = Self::default();
        *capture.start_error.lock() = Some(error);
        Arc::new(capture)
    }

    pub fn failing_stop(error: VoicepalError) -> Arc<Self> {
        let capture = Self::default();
        *capture.stop_error.lock() = Some(error);
        Arc::new(capture)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureAdapter for ScriptedCapture {
    async fn start(&self) -> voicepal::Result<()> {
        if let Some(error) = self.start_error.lock().clone() {
            return Err(error);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> voicepal::Result<AudioClip> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.stop_error.lock().clone() {
            return Err(error);
        }
        Ok(AudioClip::new(
            vec![0u8; 64],
            "audio/wav",
            Duration::from_secs(2),
        ))
    }

    async fn cleanup(&self) -> voicepal::Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out queued replies, then `default` forever
pub struct ScriptedTranscriber {
    replies: Mutex<VecDeque<Reply>>,
    default: Reply,
    hold: bool,
    pub calls: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn saying(text: &str) -> Arc<Self> {
        Self::scripted(Vec::new(), Reply::Text(text.to_string()))
    }

    pub fn replying(reply: Reply) -> Arc<Self> {
        Self::scripted(Vec::new(), reply)
    }

    pub fn scripted(replies: Vec<Reply>, default: Reply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            default,
            hold: false,
            calls: AtomicUsize::new(0),
        })
    }

    /// Never finishes a transcription
    pub fn holding() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            default: Reply::Text(String::new()),
            hold: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionClient for ScriptedTranscriber {
    async fn transcribe(&self, _clip: &AudioClip) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hold {
            return std::future::pending().await;
        }
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Records every history it is asked to complete
pub struct ScriptedCompleter {
    replies: Mutex<VecDeque<Reply>>,
    default: Reply,
    pub requests: Mutex<Vec<(ModelId, Vec<Message>)>>,
}

impl ScriptedCompleter {
    pub fn answering(text: &str) -> Arc<Self> {
        Self::scripted(Vec::new(), Reply::Text(text.to_string()))
    }

    pub fn replying(reply: Reply) -> Arc<Self> {
        Self::scripted(Vec::new(), reply)
    }

    pub fn scripted(replies: Vec<Reply>, default: Reply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            default,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<(ModelId, Vec<Message>)> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompleter {
    async fn complete(&self, model: ModelId, history: &[Message]) -> Reply {
        self.requests.lock().push((model, history.to_vec()));
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakMode {
    /// Finish right away
    Immediate,
    /// Never finish on its own
    Hold,
    /// Fail every call
    Fail,
}

pub struct RecordingSpeaker {
    mode: SpeakMode,
    pub spoken: Mutex<Vec<(String, AudioSettings)>>,
    pub stops: AtomicUsize,
}

impl RecordingSpeaker {
    pub fn new(mode: SpeakMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            spoken: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|(text, _)| text.clone()).collect()
    }

    pub fn last_settings(&self) -> Option<AudioSettings> {
        self.spoken.lock().last().map(|(_, settings)| settings.clone())
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackAdapter for RecordingSpeaker {
    async fn speak(&self, text: &str, settings: &AudioSettings) -> voicepal::Result<()> {
        self.spoken.lock().push((text.to_string(), settings.clone()));
        match self.mode {
            SpeakMode::Immediate => Ok(()),
            SpeakMode::Hold => std::future::pending().await,
            SpeakMode::Fail => Err(VoicepalError::PlaybackError(
                "synthesizer crashed".to_string(),
            )),
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn adapters(
    capture: &Arc<ScriptedCapture>,
    transcriber: Arc<dyn TranscriptionClient>,
    completer: Arc<dyn CompletionClient>,
    speaker: &Arc<RecordingSpeaker>,
) -> Adapters {
    Adapters {
        capture: capture.clone(),
        transcriber,
        completer,
        playback: speaker.clone(),
    }
}
