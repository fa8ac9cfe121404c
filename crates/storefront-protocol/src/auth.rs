//! Auth request and response bodies.

use serde::{Deserialize, Serialize};

use crate::Role;

/// Account record returned inside every auth response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Backend account id.
    pub id: String,
    pub role: Role,
    pub email: String,
    #[serde(rename = "userName", default)]
    pub user_name: String,
}

/// Response envelope shared by all auth endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRecord>,
}

impl AuthResponse {
    /// Successful response carrying an account.
    pub fn ok(user: UserRecord) -> Self {
        Self {
            success: true,
            message: None,
            user: Some(user),
        }
    }

    /// Failed response with a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            user: None,
        }
    }

    /// The account, if the backend reported success and included one.
    pub fn into_user(self) -> Option<UserRecord> {
        if self.success { self.user } else { None }
    }
}

/// Body of `POST /social-login`.
///
/// The bearer token is also sent in the `Authorization` header; the backend
/// verifies the header and upserts the account keyed by `uid` or `email`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialLoginRequest {
    pub token: String,
    pub uid: String,
    pub email: String,
    pub name: String,
    pub provider: String,
}

/// Body of `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordLoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "userName")]
    pub user_name: String,
    pub email: String,
    pub password: String,
}
