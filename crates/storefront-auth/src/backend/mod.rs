//! Storefront backend auth API.
//!
//! [`SessionBackend`] is the seam the sync service talks to;
//! [`BackendClient`] implements it over HTTP with a cookie jar holding the
//! backend's session cookie.

mod client;
mod credential;
mod error;

use async_trait::async_trait;
use storefront_protocol::{RegisterRequest, SocialLoginRequest, UserRecord};

pub use client::{BackendClient, BackendConfig};
pub use credential::{CredentialFile, PersistedCredential};
pub use error::{BackendError, BackendResult};

/// Backend auth operations.
#[async_trait]
pub trait SessionBackend: Send + Sync + 'static {
    /// Exchange a provider token for an account, creating it on first
    /// sign-in (`POST /social-login`).
    async fn social_login(&self, request: &SocialLoginRequest) -> BackendResult<UserRecord>;

    /// Resolve the current account (`GET /check-auth`) from the bearer token
    /// if given, else from the session cookie.
    async fn check_auth(&self, bearer: Option<&str>) -> BackendResult<UserRecord>;

    /// Password sign-in (`POST /login`).
    async fn password_login(&self, email: &str, password: &str) -> BackendResult<UserRecord>;

    /// Create an account with a password (`POST /register`).
    async fn register(&self, request: &RegisterRequest) -> BackendResult<UserRecord>;

    /// End the backend session (`POST /logout`). The locally held session
    /// cookie is dropped even if the request fails.
    async fn logout(&self) -> BackendResult<()>;

    /// Value of the locally held session cookie, if any.
    fn session_credential(&self) -> Option<String>;
}
