//! # Paperless Error Types Module
//!
//! This module defines the error taxonomy for calls to the Paperless-NGX API.
//! Handlers turn every variant into a chat message; none of them is fatal to
//! the dispatcher.

use reqwest::StatusCode;
use thiserror::Error;

/// Longest response body excerpt kept in an error message
const MAX_BODY_EXCERPT: usize = 200;

/// Errors returned by Paperless API operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaperlessError {
    /// The API token is missing, invalid or was revoked
    #[error("Paperless rejected the API token")]
    Unauthorized,
    /// A referenced document, entity or the inbox tag does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Network failure, timeout or a 5xx answer
    #[error("Paperless is unavailable: {0}")]
    RemoteUnavailable(String),
    /// The service refused the request (validation errors and the like)
    #[error("Paperless rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The consumer reported a failed upload task
    #[error("upload failed: {0}")]
    UploadFailed(String),
    /// The response could not be decoded
    #[error("unexpected response from Paperless: {0}")]
    InvalidResponse(String),
}

impl PaperlessError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = excerpt(body);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized,
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                Self::RemoteUnavailable(format!("HTTP {status}"))
            }
            s if s.is_server_error() => Self::RemoteUnavailable(format!("HTTP {status}")),
            s => Self::Rejected {
                status: s.as_u16(),
                message,
            },
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }
}

impl From<reqwest::Error> for PaperlessError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, "");
        }
        if err.is_decode() {
            return Self::InvalidResponse(err.to_string());
        }
        if err.is_timeout() {
            return Self::RemoteUnavailable("request timed out".to_string());
        }
        Self::RemoteUnavailable(err.to_string())
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_BODY_EXCERPT {
        let cut: String = trimmed.chars().take(MAX_BODY_EXCERPT).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}
