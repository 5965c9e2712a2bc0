use thiserror::Error;

use crate::error::LocateError;

/// A single failed exchange with the places service.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - API key may be invalid")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..end],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            408 => ApiError::Timeout,
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::Rejected(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Map the `status` field of a places response body.
    pub fn from_body_status(status: &str, message: Option<&str>) -> Self {
        let detail = message.map(Self::truncate_body).unwrap_or_else(|| status.to_string());
        match status {
            "OVER_QUERY_LIMIT" => ApiError::RateLimited,
            "UNKNOWN_ERROR" => ApiError::ServerError(detail),
            "REQUEST_DENIED" => ApiError::AccessDenied(detail),
            "NOT_FOUND" => ApiError::NotFound(detail),
            "INVALID_REQUEST" => ApiError::Rejected(detail),
            other => ApiError::InvalidResponse(format!("Unexpected status {}: {}", other, detail)),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RateLimited | ApiError::ServerError(_) | ApiError::Timeout => true,
            // Includes bodies cut off mid-transfer and undecodable payloads
            ApiError::NetworkError(_) => true,
            ApiError::InvalidResponse(_) => true,
            ApiError::AccessDenied(_)
            | ApiError::Unauthorized
            | ApiError::NotFound(_)
            | ApiError::Rejected(_) => false,
        }
    }

    /// Convert a permanent failure into the caller-facing error.
    pub fn into_rejected(self) -> LocateError {
        LocateError::UpstreamRejected(self.to_string())
    }

    /// Convert the last transient failure once retries are exhausted.
    pub fn into_unavailable(self, attempts: u32) -> LocateError {
        LocateError::UpstreamUnavailable {
            attempts,
            reason: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(ApiError::from_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(ApiError::from_status(StatusCode::REQUEST_TIMEOUT, "").is_transient());

        assert!(!ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_transient());
        assert!(!ApiError::from_status(StatusCode::FORBIDDEN, "").is_transient());
        assert!(!ApiError::from_status(StatusCode::BAD_REQUEST, "").is_transient());
        assert!(!ApiError::from_status(StatusCode::NOT_FOUND, "").is_transient());
    }

    #[test]
    fn test_body_status_classification() {
        assert!(ApiError::from_body_status("OVER_QUERY_LIMIT", None).is_transient());
        assert!(ApiError::from_body_status("UNKNOWN_ERROR", None).is_transient());
        assert!(!ApiError::from_body_status("REQUEST_DENIED", Some("The provided API key is invalid.")).is_transient());
        assert!(!ApiError::from_body_status("INVALID_REQUEST", None).is_transient());
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 100);
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let msg = err.to_string();
        assert!(msg.contains("truncated"));
        assert!(msg.len() < body.len());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(MAX_ERROR_BODY_LENGTH);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_conversions() {
        assert!(ApiError::Unauthorized.into_rejected().is_rejected());
        match ApiError::RateLimited.into_unavailable(4) {
            LocateError::UpstreamUnavailable { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected {:?}", other),
        }
    }
}
