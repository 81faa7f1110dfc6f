//! Speech in and out
//!
//! - Speech-to-text through a hosted transcription service
//! - Text-to-speech through the platform synthesizer

pub mod stt;
pub mod tts;

pub use stt::{AssemblyAiClient, PollSchedule, TranscriptionClient, TranscriptionConfig};
pub use tts::{
    AudioSettings, AudioSettingsUpdate, PlaybackAdapter, SynthesizerKind, SystemSpeaker,
    TextOnlySpeaker,
};
