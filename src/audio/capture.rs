//! Speech capture boundary

use super::wav::encode_wav;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// One finished recording, ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Encoded audio file contents
    pub bytes: Vec<u8>,

    /// MIME type of `bytes`
    pub mime_type: &'static str,

    /// Length of the recording
    pub duration: Duration,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, mime_type: &'static str, duration: Duration) -> Self {
        Self {
            bytes,
            mime_type,
            duration,
        }
    }

    /// Encode mono samples as a WAV clip
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Result<Self> {
        let bytes = encode_wav(samples, sample_rate, 1)?;
        let duration = if sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64)
        };
        Ok(Self::new(bytes, "audio/wav", duration))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Device microphone recording
///
/// `start` must fail with [`crate::VoicepalError::PermissionDenied`] when the
/// platform refuses microphone access; any other error is treated as a
/// generic capture failure.
#[async_trait]
pub trait CaptureAdapter: Send + Sync {
    /// Begin recording
    async fn start(&self) -> Result<()>;

    /// Finish recording and hand back what was captured
    async fn stop(&self) -> Result<AudioClip>;

    /// Abandon any recording in progress and release the device
    async fn cleanup(&self) -> Result<()>;
}
