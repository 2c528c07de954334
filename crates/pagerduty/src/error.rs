//! Error types for the PagerDuty clients.

use thiserror::Error;

/// Errors that can occur while talking to the PagerDuty REST API.
///
/// An entity that simply does not exist is not an error: lookups return
/// `Ok(None)` for that case.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, TLS, reset).
    #[error("{method} {path} failed: {source}")]
    Request {
        method: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-2xx status.
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    /// A 2xx body could not be decoded into the expected shape.
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// A create call succeeded but the response carried no entity.
    #[error("create response from {path} did not contain the new entity")]
    MissingEntity { path: String },

    /// The run deadline fired or the run was cancelled.
    #[error("request to {path} cancelled")]
    Cancelled { path: String },

    /// A domain role has no platform counterpart in the role mapping.
    #[error("role '{0}' has no platform mapping")]
    UnmappedRole(String),

    /// Invalid client configuration (base URL, token).
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status for [`ApiError::Status`] errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the error came from cancellation rather than the API.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result alias used by every client in this crate.
pub type ApiResult<T> = Result<T, ApiError>;
