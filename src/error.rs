//! Error types for stores and configuration.
use std::time::Duration;
use thiserror::Error;

/// Boxed error used to carry backend-specific failures across the store seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure to execute an operation against the shared store.
///
/// The `Display` text of this error is what ends up in `ProtectResponse::info`
/// when the fail-closed policy is active, so every variant renders a non-empty message.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend reported an error (connectivity, script failure, protocol error).
    #[error("store backend error: {0}")]
    Backend(#[source] BoxError),
    /// The store did not answer within the configured timeout.
    #[error("command timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    /// The store answered with something the admission protocol does not define.
    #[error("invalid response: {0}")]
    InvalidReply(String),
}

impl StoreError {
    /// Wrap any backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        StoreError::Backend(err.into())
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error came from decoding an unexpected reply.
    pub fn is_invalid_reply(&self) -> bool {
        matches!(self, Self::InvalidReply(_))
    }
}

/// Errors raised while building a [`Tollbooth`](crate::Tollbooth) from settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace { namespace: String, reason: &'static str },
    #[error("invalid route {path:?}: {reason}")]
    InvalidRoute { path: String, reason: &'static str },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("read config failed: {0}")]
    Io(#[from] std::io::Error),
}
