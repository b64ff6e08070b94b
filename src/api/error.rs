//! Errors raised at the backend / object-storage boundary.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Backend API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No token in local storage; the request was never sent.
    #[error("not signed in: no API token stored for this backend")]
    MissingToken,

    /// Content type rejected before requesting a grant.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Connection, timeout, or 5xx. Safe to retry by hand.
    #[error("network error: {0}")]
    Transient(String),

    /// The backend does not know this inspection.
    #[error("unknown inspection: {0}")]
    UnknownInspection(String),

    /// Backend refused the request (4xx). Not retryable.
    #[error("HTTP status {status} error: {body}")]
    Rejected { status: StatusCode, body: String },

    /// Response body did not match the expected shape.
    #[error("invalid response: {0}")]
    Parse(String),

    /// The photo file no longer holds the bytes recorded at capture.
    #[error("photo file changed since capture: {0}; retake the photo")]
    PhotoChanged(PathBuf),

    /// Reading the local photo file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Whether a manual retry may succeed without user changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Parse(e.to_string())
        } else {
            ApiError::Transient(e.to_string())
        }
    }
}

/// Map a non-2xx status onto the error taxonomy.
pub fn classify_status(status: StatusCode, body: String) -> ApiError {
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        ApiError::Transient(format!("HTTP status {status}: {body}"))
    } else {
        ApiError::Rejected { status, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable());
    }

    #[test]
    fn test_client_errors_are_final() {
        let e = classify_status(StatusCode::BAD_REQUEST, "bad".into());
        assert!(!e.is_retryable());
        assert_eq!(e.to_string(), "HTTP status 400 Bad Request error: bad");
    }
}
