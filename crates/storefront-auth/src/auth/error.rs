//! Backend session sync errors.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Why a provider identity could not be reconciled with a backend account.
///
/// `Clone` so a single in-flight sync can hand the same outcome to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The backend could not be reached or answered with a server error.
    /// Worth one retry.
    #[error("network error: {0}")]
    Network(String),

    /// The backend rejected the token or the account no longer exists.
    #[error("invalid or expired token: {0}")]
    InvalidToken(String),

    /// The identity resolved to an account owned by a different identity.
    #[error("account conflict: {0}")]
    AccountConflict(String),

    /// The identity provider could not supply a token.
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The backend refused a password sign-in or registration. Holds the
    /// backend's own message.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The client is configured with an unusable backend address.
    #[error("misconfigured: {0}")]
    Misconfigured(String),
}

impl SyncError {
    /// Check if a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Network(_) => "network_error",
            SyncError::InvalidToken(_) => "invalid_token",
            SyncError::AccountConflict(_) => "account_conflict",
            SyncError::ProviderUnavailable(_) => "provider_unavailable",
            SyncError::Rejected(_) => "rejected",
            SyncError::Misconfigured(_) => "misconfigured",
        }
    }

    /// Message suitable for showing to the shopper.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Network(_) => {
                "We couldn't reach the store. Check your connection and try again.".to_string()
            }
            SyncError::InvalidToken(_) => "Your session has expired. Please sign in again.".to_string(),
            SyncError::AccountConflict(detail) => format!(
                "An account already exists with this email using a different sign-in method. ({})",
                detail
            ),
            SyncError::ProviderUnavailable(detail) if !detail.is_empty() => detail.clone(),
            SyncError::ProviderUnavailable(_) => {
                "Sign-in is temporarily unavailable. Please try again.".to_string()
            }
            SyncError::Rejected(message) if !message.is_empty() => message.clone(),
            SyncError::Rejected(_) => "Sign-in failed. Please try again.".to_string(),
            SyncError::Misconfigured(_) => {
                "The store is not configured correctly. Please contact support.".to_string()
            }
        }
    }
}
