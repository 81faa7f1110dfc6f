//! Shared plumbing for the two HTTP clients

use reqwest::StatusCode;
use thiserror::Error;

/// Longest upstream error detail carried into a fallback line
const MAX_DETAIL_CHARS: usize = 160;

/// A failed HTTP exchange before it is classified into a fallback
#[derive(Error, Debug)]
pub(crate) enum HttpFailure {
    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl HttpFailure {
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        HttpFailure::Status {
            status,
            message: extract_error_message(&body),
        }
    }
}

impl From<reqwest::Error> for HttpFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpFailure::Timeout(err.to_string())
        } else if err.is_decode() {
            HttpFailure::Malformed(err.to_string())
        } else {
            HttpFailure::Connect(err.to_string())
        }
    }
}

/// Pull `error.message` (or a plain `error` string) out of an API error body
///
/// Anything else (HTML error pages, unrelated JSON) yields an empty string,
/// so callers describe the failure by its status code instead.
pub(crate) fn extract_error_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            error
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| error.as_str())
                .map(|m| m.trim().to_string())
        })
        .unwrap_or_default();

    match message.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((cut, _)) => format!("{}...", message[..cut].trim_end()),
        None => message,
    }
}
