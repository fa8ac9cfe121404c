//! Storefront backend HTTP client.

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::RwLock;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use storefront_protocol::{
    AuthResponse, PasswordLoginRequest, RegisterRequest, SocialLoginRequest, UserRecord,
};

use super::SessionBackend;
use super::error::{BackendError, BackendResult};

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the storefront API server (e.g., "http://localhost:5000").
    pub base_url: String,
    /// Path prefix of the auth routes.
    pub api_prefix: String,
    /// Per-request timeout in seconds. Bounds how long a sync can stay pending.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            api_prefix: "/api/auth".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Extract a cookie value from a `Cookie` header value.
fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            Some(value.trim())
        } else {
            None
        }
    })
}

/// HTTP client plus the cookie jar it writes the session cookie into.
struct HttpSession {
    client: Client,
    jar: Arc<Jar>,
}

impl HttpSession {
    fn build(timeout: Duration) -> BackendResult<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, jar })
    }
}

/// Client for the storefront auth API.
pub struct BackendClient {
    base: Url,
    /// Base URL joined with the auth prefix, without trailing slash.
    auth_base: String,
    cookie_name: String,
    timeout: Duration,
    session: RwLock<HttpSession>,
}

impl BackendClient {
    /// Create a new backend client.
    pub fn new(config: &BackendConfig, cookie_name: impl Into<String>) -> BackendResult<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| BackendError::InvalidUrl {
            url: config.base_url.clone(),
            message: e.to_string(),
        })?;
        let auth_base = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.api_prefix.trim_matches('/')
        );
        let timeout = Duration::from_secs(config.timeout_secs);

        Ok(Self {
            base,
            auth_base: auth_base.trim_end_matches('/').to_string(),
            cookie_name: cookie_name.into(),
            timeout,
            session: RwLock::new(HttpSession::build(timeout)?),
        })
    }

    /// Base URL of the backend.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Put a previously persisted session cookie back into the jar.
    pub fn restore_credential(&self, value: &str) {
        let cookie = format!("{}={}; Path=/", self.cookie_name, value);
        self.session.read().jar.add_cookie_str(&cookie, &self.base);
        debug!("restored session cookie '{}'", self.cookie_name);
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.auth_base, path)
    }

    fn http(&self) -> Client {
        self.session.read().client.clone()
    }

    /// Drop the session cookie by starting a fresh jar.
    fn reset_session(&self) {
        match HttpSession::build(self.timeout) {
            Ok(fresh) => *self.session.write() = fresh,
            Err(e) => {
                warn!("failed to rebuild HTTP client, expiring cookie instead: {}", e);
                let expired = format!("{}=; Path=/; Max-Age=0", self.cookie_name);
                self.session.read().jar.add_cookie_str(&expired, &self.base);
            }
        }
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> BackendResult<Response> {
        request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                BackendError::ConnectionFailed {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            } else {
                BackendError::RequestFailed(e)
            }
        })
    }

    /// Handle response and parse the auth envelope or error.
    async fn handle_response(response: Response) -> BackendResult<UserRecord> {
        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<AuthResponse> = serde_json::from_str(&body).ok();

        if status.is_success() {
            let parsed = parsed.ok_or_else(|| {
                BackendError::ParseError(format!("unexpected body from {}", status))
            })?;
            let message = parsed.message.clone();
            return parsed.into_user().ok_or_else(|| BackendError::Rejected {
                status: status.as_u16(),
                message: message.unwrap_or_else(|| "no account in response".to_string()),
            });
        }

        Err(Self::status_error(status, parsed.and_then(|p| p.message)))
    }

    fn status_error(status: StatusCode, message: Option<String>) -> BackendError {
        let message = message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });
        match status {
            StatusCode::UNAUTHORIZED => BackendError::Unauthorized(message),
            StatusCode::FORBIDDEN => BackendError::Forbidden(message),
            StatusCode::NOT_FOUND => BackendError::NotFound(message),
            StatusCode::CONFLICT => BackendError::Conflict(message),
            s if s.is_server_error() => BackendError::Server {
                status: s.as_u16(),
                message,
            },
            s => BackendError::Rejected {
                status: s.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl SessionBackend for BackendClient {
    async fn social_login(&self, request: &SocialLoginRequest) -> BackendResult<UserRecord> {
        let url = self.endpoint("social-login");
        debug!("POST {} uid={}", url, request.uid);
        let builder = self
            .http()
            .post(&url)
            .bearer_auth(&request.token)
            .json(request);
        let response = self.send(&url, builder).await?;
        Self::handle_response(response).await
    }

    async fn check_auth(&self, bearer: Option<&str>) -> BackendResult<UserRecord> {
        let url = self.endpoint("check-auth");
        debug!("GET {} bearer={}", url, bearer.is_some());
        let mut builder = self
            .http()
            .get(&url)
            .header(
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, proxy-revalidate",
            );
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        let response = self.send(&url, builder).await?;
        Self::handle_response(response).await
    }

    async fn password_login(&self, email: &str, password: &str) -> BackendResult<UserRecord> {
        let url = self.endpoint("login");
        debug!("POST {} email={}", url, email);
        let body = PasswordLoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.send(&url, self.http().post(&url).json(&body)).await?;
        Self::handle_response(response).await
    }

    async fn register(&self, request: &RegisterRequest) -> BackendResult<UserRecord> {
        let url = self.endpoint("register");
        debug!("POST {} email={}", url, request.email);
        let response = self.send(&url, self.http().post(&url).json(request)).await?;
        Self::handle_response(response).await
    }

    async fn logout(&self) -> BackendResult<()> {
        let url = self.endpoint("logout");
        debug!("POST {}", url);
        let result = match self.send(&url, self.http().post(&url)).await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let status = response.status();
                let parsed: Option<AuthResponse> = response.json().await.ok();
                Err(Self::status_error(status, parsed.and_then(|p| p.message)))
            }
            Err(e) => Err(e),
        };
        self.reset_session();
        result
    }

    fn session_credential(&self) -> Option<String> {
        let session = self.session.read();
        let cookies = session.jar.cookies(&self.base)?;
        let cookies = cookies.to_str().ok()?;
        token_from_cookie_header(cookies, &self.cookie_name)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}
