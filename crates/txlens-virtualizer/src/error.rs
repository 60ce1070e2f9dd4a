//! Engine error types.
//!
//! Nothing here is fatal to a session: network errors degrade to "data
//! temporarily missing", queue timeouts fail only the logical operation,
//! and raced operations are rejected with a boolean, never an error.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single network request, after classification.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// The call failed before any response arrived (DNS, socket, stream cut).
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response arrived but carried a non-2xx status.
    #[error("protocol failure: status {status}")]
    Protocol { status: u16 },

    /// The bounded attempt timer fired before the call resolved.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl NetworkError {
    /// Whether the retry loop should try again. Transport failures and
    /// timeouts always retry; protocol failures retry unless the caller's
    /// policy classifies them as final.
    pub fn is_retryable(&self, retry_protocol_errors: bool) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Protocol { .. } => retry_protocol_errors,
        }
    }
}

/// Failure of a queued operation.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The operation's own deadline elapsed while it ran. Distinct from
    /// [`NetworkError::Timeout`] so callers can tell the two apart.
    #[error("queued operation '{id}' timed out after {timeout:?}")]
    Timeout { id: String, timeout: Duration },
}
