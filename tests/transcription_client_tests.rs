//! HTTP contract tests for the transcription client

use serde_json::json;
use std::time::Duration;
use voicepal::audio::AudioClip;
use voicepal::speech::{AssemblyAiClient, PollSchedule, TranscriptionClient, TranscriptionConfig};
use voicepal::{FallbackKind, Reply};
use wiremock::matchers::{body_bytes, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JOB_ID: &str = "5551722-f677-48a6";

fn client_for(server: &MockServer, max_attempts: u32) -> AssemblyAiClient {
    let config = TranscriptionConfig::new(server.uri(), "aai-key").with_poll_schedule(PollSchedule {
        interval: Duration::from_millis(10),
        max_attempts,
    });
    AssemblyAiClient::new(config).unwrap()
}

fn clip() -> AudioClip {
    AudioClip::new(vec![1, 2, 3, 4], "audio/wav", Duration::from_secs(1))
}

async fn mount_upload_and_submit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upload_url": "https://cdn.example.com/upload/abc"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/transcript"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": JOB_ID,
            "status": "queued"
        })))
        .mount(server)
        .await;
}

fn status(status: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"id": JOB_ID, "status": status}))
}

#[tokio::test]
async fn test_upload_submit_poll() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header("authorization", "aai-key"))
        .and(header("content-type", "application/octet-stream"))
        .and(body_bytes(vec![1u8, 2, 3, 4]))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upload_url": "https://cdn.example.com/upload/abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/transcript"))
        .and(header("authorization", "aai-key"))
        .and(body_partial_json(json!({
            "audio_url": "https://cdn.example.com/upload/abc",
            "language_code": "en",
            "punctuate": true,
            "format_text": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": JOB_ID,
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let poll_path = format!("/transcript/{}", JOB_ID);
    Mock::given(method("GET"))
        .and(path(poll_path.as_str()))
        .respond_with(status("processing"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(poll_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": JOB_ID,
            "status": "completed",
            "text": "  I love hiking.  "
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for(&server, 5).transcribe(&clip()).await;
    assert_eq!(reply, Reply::Text("I love hiking.".to_string()));
}

#[tokio::test]
async fn test_completed_without_text_is_empty() {
    let server = MockServer::start().await;
    mount_upload_and_submit(&server).await;
    Mock::given(method("GET"))
        .respond_with(status("completed"))
        .mount(&server)
        .await;

    let reply = client_for(&server, 3).transcribe(&clip()).await;
    assert_eq!(reply, Reply::Text(String::new()));
}

#[tokio::test]
async fn test_job_error_is_service_error() {
    let server = MockServer::start().await;
    mount_upload_and_submit(&server).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": JOB_ID,
            "status": "error",
            "error": "Audio file could not be decoded"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for(&server, 3).transcribe(&clip()).await;
    assert_eq!(
        reply.fallback_kind(),
        Some(FallbackKind::TranscriptionServiceError)
    );
    assert_eq!(
        reply.text(),
        "I'm having trouble processing your voice right now. Let's try again!"
    );
}

#[tokio::test]
async fn test_poll_exhaustion_is_timeout() {
    let server = MockServer::start().await;
    mount_upload_and_submit(&server).await;
    Mock::given(method("GET"))
        .respond_with(status("processing"))
        .expect(3)
        .mount(&server)
        .await;

    let reply = client_for(&server, 3).transcribe(&clip()).await;
    assert_eq!(
        reply.fallback_kind(),
        Some(FallbackKind::TranscriptionTimeout)
    );
}

#[tokio::test]
async fn test_upload_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": "Too many requests"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/transcript"))
        .respond_with(status("queued"))
        .expect(0)
        .mount(&server)
        .await;

    let reply = client_for(&server, 3).transcribe(&clip()).await;
    assert_eq!(reply.fallback_kind(), Some(FallbackKind::RateLimited));
}

#[tokio::test]
async fn test_submit_failure_is_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upload_url": "https://cdn.example.com/upload/abc"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/transcript"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Authentication error"})),
        )
        .mount(&server)
        .await;

    let reply = client_for(&server, 3).transcribe(&clip()).await;
    assert_eq!(
        reply.fallback_kind(),
        Some(FallbackKind::TranscriptionServiceError)
    );
}

#[tokio::test]
async fn test_poll_request_timeout() {
    let server = MockServer::start().await;
    mount_upload_and_submit(&server).await;
    Mock::given(method("GET"))
        .respond_with(status("processing").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut config = TranscriptionConfig::new(server.uri(), "aai-key");
    config.poll_timeout_secs = 1;
    let client = AssemblyAiClient::new(config).unwrap();

    let reply = client.transcribe(&clip()).await;
    assert_eq!(
        reply.fallback_kind(),
        Some(FallbackKind::TranscriptionTimeout)
    );
}

#[tokio::test]
async fn test_cancel_abandons_polling() {
    let server = MockServer::start().await;
    mount_upload_and_submit(&server).await;
    Mock::given(method("GET"))
        .respond_with(status("processing"))
        .mount(&server)
        .await;

    let config = TranscriptionConfig::new(server.uri(), "aai-key").with_poll_schedule(PollSchedule {
        interval: Duration::from_secs(60),
        max_attempts: 30,
    });
    let client = AssemblyAiClient::new(config).unwrap();
    let token = client.cancellation_token();

    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let reply = tokio::time::timeout(Duration::from_secs(10), client.transcribe(&clip()))
        .await
        .expect("cancellation should end polling");
    cancel.await.unwrap();

    assert_eq!(
        reply.fallback_kind(),
        Some(FallbackKind::TranscriptionServiceError)
    );
}
