//! Speech-to-text through a hosted transcription API
//!
//! A transcription is three steps: upload the raw audio, submit a job that
//! points at the uploaded file, then poll the job until it settles. Polling
//! is bounded by an attempt counter and a deadline, and the wait between
//! polls can be cancelled.

use crate::audio::AudioClip;
use crate::fallback::{FallbackKind, Reply};
use crate::http::HttpFailure;
use crate::{Result, VoicepalError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Turns a recording into text
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Transcribe `clip`. A completed job yields [`Reply::Text`] (possibly
    /// empty); every failure comes back as [`Reply::Fallback`].
    async fn transcribe(&self, clip: &AudioClip) -> Reply;
}

/// Configuration for the transcription service
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// API root, e.g. `https://api.assemblyai.com/v2`
    pub base_url: String,

    /// Sent verbatim in the `Authorization` header
    pub api_key: String,

    /// Spoken language of the recordings
    pub language_code: String,

    /// Wait between status polls in milliseconds
    pub poll_interval_ms: u64,

    /// Status polls before giving up
    pub max_poll_attempts: u32,

    /// Timeout for the upload and submit requests in seconds
    pub request_timeout_secs: u64,

    /// Timeout for each status poll in seconds
    pub poll_timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.assemblyai.com/v2".to_string(),
            api_key: String::new(),
            language_code: "en".to_string(),
            poll_interval_ms: 1000,
            max_poll_attempts: 30,
            request_timeout_secs: 30,
            poll_timeout_secs: 10,
        }
    }
}

impl TranscriptionConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Set the polling schedule
    pub fn with_poll_schedule(mut self, schedule: PollSchedule) -> Self {
        self.poll_interval_ms = schedule.interval.as_millis() as u64;
        self.max_poll_attempts = schedule.max_attempts;
        self
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

/// How often and how long to poll a transcription job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSchedule {
    /// Latest instant at which another poll may be issued
    pub fn deadline(&self, started: Instant, poll_timeout: Duration) -> Instant {
        started + self.interval * self.max_attempts + poll_timeout
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    language_code: &'a str,
    punctuate: bool,
    format_text: bool,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct TranscriptResponse {
    status: JobStatus,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Where a polled job ended up
#[derive(Debug, PartialEq, Eq)]
enum JobOutcome {
    Completed(String),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Client for AssemblyAI-style upload/submit/poll transcription
pub struct AssemblyAiClient {
    config: TranscriptionConfig,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl AssemblyAiClient {
    pub fn new(config: TranscriptionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| VoicepalError::HttpError(e.to_string()))?;

        Ok(Self {
            config,
            http,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that abandons every job in flight once cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn upload(&self, clip: &AudioClip) -> std::result::Result<String, HttpFailure> {
        let response = self
            .http
            .post(self.url("upload"))
            .header(AUTHORIZATION, &self.config.api_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(self.config.request_timeout())
            .body(clip.bytes.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HttpFailure::from_response(response).await);
        }

        let upload: UploadResponse = response.json().await?;
        Ok(upload.upload_url)
    }

    async fn submit(&self, audio_url: &str) -> std::result::Result<String, HttpFailure> {
        let body = SubmitRequest {
            audio_url,
            language_code: &self.config.language_code,
            punctuate: true,
            format_text: true,
        };

        let response = self
            .http
            .post(self.url("transcript"))
            .header(AUTHORIZATION, &self.config.api_key)
            .timeout(self.config.request_timeout())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HttpFailure::from_response(response).await);
        }

        let job: SubmitResponse = response.json().await?;
        Ok(job.id)
    }

    async fn fetch_status(&self, id: &str) -> std::result::Result<TranscriptResponse, HttpFailure> {
        let response = self
            .http
            .get(self.url(&format!("transcript/{}", id)))
            .header(AUTHORIZATION, &self.config.api_key)
            .timeout(self.config.poll_timeout())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HttpFailure::from_response(response).await);
        }

        Ok(response.json().await?)
    }

    async fn poll(&self, id: &str) -> std::result::Result<JobOutcome, HttpFailure> {
        let schedule = self.config.poll_schedule();
        let deadline = schedule.deadline(Instant::now(), self.config.poll_timeout());

        for attempt in 1..=schedule.max_attempts {
            if Instant::now() >= deadline {
                break;
            }

            let transcript = self.fetch_status(id).await?;
            debug!(
                "Transcription {} poll {}/{}: {:?}",
                id, attempt, schedule.max_attempts, transcript.status
            );

            match transcript.status {
                JobStatus::Completed => {
                    return Ok(JobOutcome::Completed(transcript.text.unwrap_or_default()))
                }
                JobStatus::Error => {
                    return Ok(JobOutcome::Failed(
                        transcript.error.unwrap_or_else(|| "unknown error".to_string()),
                    ))
                }
                JobStatus::Queued | JobStatus::Processing | JobStatus::Unknown => {}
            }

            if attempt == schedule.max_attempts {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(JobOutcome::Cancelled),
                _ = tokio::time::sleep(schedule.interval) => {}
            }
        }

        Ok(JobOutcome::TimedOut)
    }

    async fn run(&self, clip: &AudioClip) -> std::result::Result<JobOutcome, HttpFailure> {
        let audio_url = self.upload(clip).await?;
        debug!("Uploaded {} bytes of audio", clip.bytes.len());

        let id = self.submit(&audio_url).await?;
        info!("Submitted transcription job {}", id);

        self.poll(&id).await
    }
}

#[async_trait]
impl TranscriptionClient for AssemblyAiClient {
    async fn transcribe(&self, clip: &AudioClip) -> Reply {
        if self.cancel.is_cancelled() {
            return Reply::fallback(FallbackKind::TranscriptionServiceError);
        }

        match self.run(clip).await {
            Ok(JobOutcome::Completed(text)) => Reply::Text(text.trim().to_string()),
            Ok(JobOutcome::Failed(error)) => {
                warn!("Transcription job failed: {}", error);
                Reply::fallback(FallbackKind::TranscriptionServiceError)
            }
            Ok(JobOutcome::TimedOut) => {
                warn!("Transcription did not complete in time");
                Reply::fallback(FallbackKind::TranscriptionTimeout)
            }
            Ok(JobOutcome::Cancelled) => {
                info!("Transcription abandoned");
                Reply::fallback(FallbackKind::TranscriptionServiceError)
            }
            Err(failure) => {
                warn!("Transcription request failed: {}", failure);
                Reply::fallback(classify(&failure))
            }
        }
    }
}

/// Map a failed transcription exchange onto the fallback the user hears
pub(crate) fn classify(failure: &HttpFailure) -> FallbackKind {
    match failure {
        HttpFailure::Status { status, .. } if status.as_u16() == 429 => FallbackKind::RateLimited,
        HttpFailure::Timeout(_) => FallbackKind::TranscriptionTimeout,
        _ => FallbackKind::TranscriptionServiceError,
    }
}
