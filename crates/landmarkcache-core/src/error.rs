//! Error types surfaced by the retrieval engine.
//!
//! Every public operation returns [`Result`]. Transient upstream failures are
//! retried inside the places client and only reach callers as
//! [`LocateError::UpstreamUnavailable`] once the retry budget is spent.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `LocateError`.
pub type Result<T> = std::result::Result<T, LocateError>;

#[derive(Error, Debug)]
pub enum LocateError {
    /// Malformed or out-of-range coordinate input. Raised before any I/O.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Remote service failed transiently and retries were exhausted.
    #[error("Places service unavailable after {attempts} attempt(s): {reason}")]
    UpstreamUnavailable { attempts: u32, reason: String },

    /// Remote service refused the request (bad key, invalid request).
    #[error("Places service rejected the request: {0}")]
    UpstreamRejected(String),

    /// An atomic cache write failed. Prior cache state is left intact.
    #[error("Failed to write cache file {}: {source}", path.display())]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Requested image is neither cached nor resolvable.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller cancelled the lookup.
    #[error("Lookup cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LocateError {
    pub fn cache_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LocateError::CacheWrite {
            path: path.into(),
            source,
        }
    }

    /// Whether the error is a permanent upstream refusal.
    pub fn is_rejected(&self) -> bool {
        matches!(self, LocateError::UpstreamRejected(_))
    }

    /// Whether a stale cache entry may stand in for this failure.
    pub fn allows_degraded(&self) -> bool {
        matches!(self, LocateError::UpstreamUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_allows_degraded() {
        let unavailable = LocateError::UpstreamUnavailable {
            attempts: 3,
            reason: "timeout".to_string(),
        };
        assert!(unavailable.allows_degraded());
        assert!(!LocateError::UpstreamRejected("bad key".into()).allows_degraded());
        assert!(!LocateError::Cancelled.allows_degraded());
    }

    #[test]
    fn test_cache_write_message_includes_path() {
        let err = LocateError::cache_write(
            "/tmp/cache/x.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/cache/x.json"));
        assert!(msg.contains("denied"));
    }
}
