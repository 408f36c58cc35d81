//! Error and retry-policy types for the migration domain.
//!
//! [`MigrationError`] covers conditions that abort a unit of work or the whole
//! run. [`RemoteError`] is the typed failure every [`crate::RemoteClient`] call
//! produces, and [`CheckpointError`] is the failure of the durable progress
//! store to record state.
//!
//! [`RetryPolicy`] is a cross-cutting concern: the transport adapter asks a
//! [`RemoteError`] for its policy before deciding to re-issue a request.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// ## Rules
///
/// - `Retryable` errors: network failures, secondary rate-limit responses
///   (429), and gateway errors (502, 503, 504).
/// - `NonRetryable` errors: everything else, including validation failures
///   (422) and permission failures (401, 403, 404).
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Remote API errors
// ---------------------------------------------------------------------------

/// A failed call to the remote platform API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// HTTP status code; `None` when the request never produced a response.
    pub status: Option<u16>,
    /// Human-readable description, including the platform's own message.
    pub message: String,
    /// Delay requested by the platform before retrying, if any.
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "remote API error {code}: {}", self.message),
            None => write!(f, "network error: {}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

impl RemoteError {
    /// Creates an error for a response with the given status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            retry_after: None,
        }
    }

    /// Creates an error for a request that produced no response.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attaches the platform's requested retry delay.
    #[must_use]
    pub fn with_retry_after(mut self, after: Duration) -> Self {
        self.retry_after = Some(after);
        self
    }

    /// `true` for the validation failure the platform returns when a resource
    /// with the requested name already exists.
    pub fn is_already_exists(&self) -> bool {
        self.status == Some(422)
    }

    /// Classifies the error for the transport's retry loop.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.status {
            None | Some(429) | Some(502) | Some(503) | Some(504) => RetryPolicy::Retryable {
                after: self.retry_after,
            },
            Some(_) => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoint persistence errors
// ---------------------------------------------------------------------------

/// The progress store could not durably record state.
///
/// Reading never produces this error: an unreadable document is treated as
/// empty. Only writes fail, because progress that was not persisted must not
/// be reported as persisted.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to write checkpoint document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialise checkpoint document: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Errors that abort a unit of work, a repository, or the whole run.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A remote API call failed and the failure is not benign for the
    /// current unit.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Progress could not be persisted.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// An operator requested shutdown; the run stopped at a unit boundary.
    #[error("migration interrupted")]
    Interrupted,

    /// The run settings are invalid. Produced before any remote call.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprocessable_entity_is_already_exists() {
        assert!(RemoteError::http(422, "name already exists").is_already_exists());
        assert!(!RemoteError::http(403, "forbidden").is_already_exists());
        assert!(!RemoteError::network("reset").is_already_exists());
    }

    #[test]
    fn retry_policy_follows_status() {
        assert_eq!(
            RemoteError::http(429, "slow down")
                .with_retry_after(Duration::from_secs(5))
                .retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(5))
            }
        );
        assert_eq!(
            RemoteError::network("timeout").retry_policy(),
            RetryPolicy::Retryable { after: None }
        );
        assert_eq!(
            RemoteError::http(422, "invalid").retry_policy(),
            RetryPolicy::NonRetryable
        );
    }

    #[test]
    fn display_includes_status_when_present() {
        assert_eq!(
            RemoteError::http(404, "Not Found").to_string(),
            "remote API error 404: Not Found"
        );
        assert_eq!(
            RemoteError::network("dns").to_string(),
            "network error: dns"
        );
    }
}
