//! Identity provider errors.

use thiserror::Error;

use crate::auth::SyncError;

/// Errors reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// No user is signed in with the provider.
    #[error("no active session")]
    NoActiveSession,

    /// The provider reported an error code.
    #[error("provider error {code}: {message}")]
    Provider { code: String, message: String },

    /// The provider could not be reached.
    #[error("provider unreachable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Build from a provider error code such as `auth/popup-blocked`.
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Message suitable for showing to the shopper.
    pub fn user_message(&self) -> String {
        let (code, message) = match self {
            ProviderError::NoActiveSession => {
                return "You are signed out. Please sign in again.".to_string();
            }
            ProviderError::Unavailable(_) => {
                return "Network error. Please check your connection and try again.".to_string();
            }
            ProviderError::Provider { code, message } => (code.as_str(), message.as_str()),
        };

        let known = match code {
            "auth/popup-closed-by-user" => "Sign-in was cancelled. Please try again.",
            "auth/popup-blocked" => "Pop-up was blocked. Please allow pop-ups and try again.",
            "auth/network-request-failed" => {
                "Network error. Please check your connection and try again."
            }
            "auth/account-exists-with-different-credential" => {
                "An account already exists with this email using a different sign-in method."
            }
            "auth/user-not-found" => "No account found with this email. Please register first.",
            "auth/wrong-password" => "Incorrect password. Please try again.",
            "auth/invalid-email" => "Invalid email address format.",
            "auth/user-disabled" => "This account has been disabled. Please contact support.",
            "auth/invalid-credential" => {
                "Invalid credentials. Please check your email and password."
            }
            _ if !message.is_empty() => return message.to_string(),
            _ => "Authentication failed. Please try again.",
        };
        known.to_string()
    }
}

impl From<ProviderError> for SyncError {
    fn from(err: ProviderError) -> Self {
        SyncError::ProviderUnavailable(err.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_map_to_messages() {
        let err = ProviderError::from_code("auth/popup-blocked", "");
        assert_eq!(
            err.user_message(),
            "Pop-up was blocked. Please allow pop-ups and try again."
        );
        let err = ProviderError::from_code("auth/wrong-password", "ignored");
        assert_eq!(err.user_message(), "Incorrect password. Please try again.");
    }

    #[test]
    fn test_unknown_code_uses_provider_message() {
        let err = ProviderError::from_code("auth/quota-exceeded", "Quota exceeded.");
        assert_eq!(err.user_message(), "Quota exceeded.");

        let err = ProviderError::from_code("auth/internal-error", "");
        assert_eq!(err.user_message(), "Authentication failed. Please try again.");
    }

    #[test]
    fn test_converts_to_provider_unavailable() {
        let sync: SyncError = ProviderError::from_code("auth/popup-blocked", "").into();
        assert_eq!(
            sync.user_message(),
            "Pop-up was blocked. Please allow pop-ups and try again."
        );
        assert!(!sync.is_transient());
    }
}
