//! Backend client error types.

use thiserror::Error;

use crate::auth::SyncError;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur talking to the storefront backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Connection failed.
    #[error("Failed to connect to backend at {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// 401 from the backend.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 403 from the backend.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 404 from the backend.
    #[error("Not found: {0}")]
    NotFound(String),

    /// 409 from the backend.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 5xx from the backend.
    #[error("Backend error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Any other refusal, including `success: false` on a 2xx.
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The configured backend URL is not usable.
    #[error("Invalid backend URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl BackendError {
    /// Check if a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::RequestFailed(_)
                | BackendError::ConnectionFailed { .. }
                | BackendError::Server { .. }
                | BackendError::ParseError(_)
        )
    }
}

impl BackendError {
    /// Map a refused password sign-in or registration, keeping the backend's
    /// message for the shopper. Other failures map as usual.
    pub fn into_rejection(self) -> SyncError {
        match self {
            BackendError::Unauthorized(message)
            | BackendError::Forbidden(message)
            | BackendError::NotFound(message)
            | BackendError::Conflict(message)
            | BackendError::Rejected { message, .. } => SyncError::Rejected(message),
            other => other.into(),
        }
    }
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        let message = err.to_string();
        match err {
            BackendError::RequestFailed(_)
            | BackendError::ConnectionFailed { .. }
            | BackendError::Server { .. }
            | BackendError::ParseError(_) => SyncError::Network(message),
            BackendError::InvalidUrl { .. } => SyncError::Misconfigured(message),
            BackendError::Conflict(_) => SyncError::AccountConflict(message),
            BackendError::Unauthorized(_)
            | BackendError::Forbidden(_)
            | BackendError::NotFound(_)
            | BackendError::Rejected { .. } => SyncError::InvalidToken(message),
        }
    }
}
