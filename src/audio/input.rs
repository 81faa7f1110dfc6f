use super::capture::{AudioClip, CaptureAdapter};
use super::wav::downmix;
use crate::{Result, VoicepalError};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, PlayStreamError};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

struct Recording {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
    samples: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
}

impl Recording {
    /// Signal the stream thread and wait for it to drop the stream
    fn finish(self) -> (Vec<f32>, u32) {
        let _ = self.stop_tx.send(());
        if self.thread.join().is_err() {
            error!("Capture thread panicked");
        }
        let samples = std::mem::take(&mut *self.samples.lock());
        (samples, self.sample_rate)
    }
}

/// Microphone capture on the default input device
///
/// cpal streams are not `Send`, so each recording owns a dedicated thread
/// that builds the stream, keeps it alive and drops it when told to stop.
pub struct MicrophoneCapture {
    recording: Mutex<Option<Recording>>,
}

impl MicrophoneCapture {
    pub fn new() -> Self {
        Self {
            recording: Mutex::new(None),
        }
    }

    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        self.recording.lock().is_some()
    }

    fn open_stream(
        samples: Arc<Mutex<Vec<f32>>>,
        ready_tx: Sender<Result<u32>>,
        stop_rx: Receiver<()>,
    ) {
        let host = cpal::default_host();
        let Some(device) = host.default_input_device() else {
            let _ = ready_tx.send(Err(VoicepalError::AudioDeviceError(
                "No input device available".into(),
            )));
            return;
        };

        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let config: cpal::StreamConfig = match device.default_input_config() {
            Ok(config) => config.into(),
            Err(e) => {
                let _ = ready_tx.send(Err(VoicepalError::AudioDeviceError(format!(
                    "Failed to get input config: {}",
                    e
                ))));
                return;
            }
        };

        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;
        let sink = Arc::clone(&samples);

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sink.lock().extend(downmix(data, channels));
            },
            |err| error!("Audio input stream error: {}", err),
            None,
        );

        let stream = match stream {
            Ok(stream) => stream,
            Err(BuildStreamError::DeviceNotAvailable) => {
                let _ = ready_tx.send(Err(VoicepalError::PermissionDenied));
                return;
            }
            Err(e) => {
                let _ = ready_tx.send(Err(VoicepalError::AudioDeviceError(format!(
                    "Failed to build input stream: {}",
                    e
                ))));
                return;
            }
        };

        if let Err(e) = stream.play() {
            let err = match e {
                PlayStreamError::DeviceNotAvailable => VoicepalError::PermissionDenied,
                other => VoicepalError::CaptureError(format!(
                    "Failed to start input stream: {}",
                    other
                )),
            };
            let _ = ready_tx.send(Err(err));
            return;
        }

        let _ = ready_tx.send(Ok(sample_rate));

        // Keep the stream alive until stop or until the controller goes away
        let _ = stop_rx.recv();
        drop(stream);
        debug!("Input stream closed");
    }
}

impl Default for MicrophoneCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureAdapter for MicrophoneCapture {
    async fn start(&self) -> Result<()> {
        if self.is_recording() {
            return Err(VoicepalError::CaptureError("Already recording".into()));
        }

        let samples = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);

        let thread_samples = Arc::clone(&samples);
        let thread = std::thread::Builder::new()
            .name("voicepal-capture".into())
            .spawn(move || Self::open_stream(thread_samples, ready_tx, stop_rx))
            .map_err(|e| VoicepalError::CaptureError(format!("Failed to spawn capture thread: {}", e)))?;

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| VoicepalError::CaptureError(e.to_string()))?
            .map_err(|_| VoicepalError::CaptureError("Capture thread exited early".into()));

        let sample_rate = match ready.and_then(|r| r) {
            Ok(rate) => rate,
            Err(e) => {
                let _ = thread.join();
                return Err(e);
            }
        };

        *self.recording.lock() = Some(Recording {
            stop_tx,
            thread,
            samples,
            sample_rate,
        });

        info!("Started audio recording at {} Hz", sample_rate);
        Ok(())
    }

    async fn stop(&self) -> Result<AudioClip> {
        let recording = self
            .recording
            .lock()
            .take()
            .ok_or_else(|| VoicepalError::CaptureError("Not recording".into()))?;

        let (samples, sample_rate) = tokio::task::spawn_blocking(move || recording.finish())
            .await
            .map_err(|e| VoicepalError::CaptureError(e.to_string()))?;

        info!(
            "Stopped audio recording: {:.1}s captured",
            samples.len() as f32 / sample_rate.max(1) as f32
        );
        AudioClip::from_samples(&samples, sample_rate)
    }

    async fn cleanup(&self) -> Result<()> {
        let recording = self.recording.lock().take();
        if let Some(recording) = recording {
            warn!("Discarding recording in progress");
            tokio::task::spawn_blocking(move || recording.finish())
                .await
                .map_err(|e| VoicepalError::CaptureError(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        if let Some(recording) = self.recording.get_mut().take() {
            let _ = recording.stop_tx.send(());
        }
    }
}
