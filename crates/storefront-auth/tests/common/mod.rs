//! Test utilities and common setup.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use storefront_auth::auth::AuthConfig;
use storefront_auth::backend::{BackendError, BackendResult, SessionBackend};
use storefront_auth::session::{Identity, Session, SessionStore};
use storefront_protocol::{AuthResponse, RegisterRequest, Role, SocialLoginRequest, UserRecord};

pub fn user(id: &str, email: &str, role: Role) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        role,
        email: email.to_string(),
        user_name: email.split('@').next().unwrap_or_default().to_string(),
    }
}

pub fn ann() -> Identity {
    Identity::new("uid-ann", "ann@example.com").with_display_name("Ann")
}

pub fn bob() -> Identity {
    Identity::new("uid-bob", "bob@example.com").with_display_name("Bob")
}

/// Auth config with a short retry delay.
pub fn fast_config() -> AuthConfig {
    AuthConfig {
        retry_delay_ms: 5,
        ..AuthConfig::default()
    }
}

/// Wait until the store satisfies `pred`, failing the test after a few
/// seconds.
pub async fn wait_for(store: &SessionStore, pred: impl FnMut(&Session) -> bool) -> Session {
    let mut rx = store.subscribe();
    let session = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for session state")
        .expect("session store dropped");
    session.clone()
}

/// Canned backend answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Account(UserRecord),
    Unauthorized,
    Conflict,
    Unreachable,
}

impl Reply {
    fn into_result(self) -> BackendResult<UserRecord> {
        match self {
            Reply::Account(user) => Ok(user),
            Reply::Unauthorized => Err(BackendError::Unauthorized("Invalid token".to_string())),
            Reply::Conflict => Err(BackendError::Conflict("Account already linked".to_string())),
            Reply::Unreachable => Err(BackendError::ConnectionFailed {
                url: "http://backend.test".to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct Script {
    /// Social-login replies by bearer token.
    social: HashMap<String, Reply>,
    /// Check-auth reply when only the session cookie is sent.
    cookie: Option<Reply>,
    /// Password accounts by email.
    passwords: HashMap<String, (String, UserRecord)>,
    /// Held social-login calls by token.
    gates: HashMap<String, Arc<Semaphore>>,
    credential: Option<String>,
    fail_logout: bool,
    /// Held logout calls.
    logout_gate: Option<Arc<Semaphore>>,
}

/// In-process backend answering from a script. Counts calls and can hold
/// social-login responses for a token until released.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
    pub social_calls: AtomicUsize,
    pub check_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_social(&self, token: &str, reply: Reply) {
        self.script.lock().social.insert(token.to_string(), reply);
    }

    pub fn on_cookie(&self, reply: Reply) {
        self.script.lock().cookie = Some(reply);
    }

    pub fn with_password(&self, email: &str, password: &str, account: UserRecord) {
        self.script
            .lock()
            .passwords
            .insert(email.to_string(), (password.to_string(), account));
    }

    pub fn set_credential(&self, value: Option<&str>) {
        self.script.lock().credential = value.map(str::to_string);
    }

    pub fn fail_logout(&self) {
        self.script.lock().fail_logout = true;
    }

    /// Hold logout calls until [`release_logout`](Self::release_logout).
    pub fn hold_logout(&self) {
        self.script.lock().logout_gate = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_logout(&self) {
        if let Some(gate) = self.script.lock().logout_gate.take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Hold social-login calls for `token` until [`release`](Self::release).
    pub fn hold(&self, token: &str) {
        self.script
            .lock()
            .gates
            .insert(token.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, token: &str) {
        if let Some(gate) = self.script.lock().gates.remove(token) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn social_calls(&self) -> usize {
        self.social_calls.load(Ordering::SeqCst)
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn social_reply(&self, token: &str) -> Reply {
        self.script
            .lock()
            .social
            .get(token)
            .cloned()
            .unwrap_or(Reply::Unauthorized)
    }
}

#[async_trait]
impl SessionBackend for ScriptedBackend {
    async fn social_login(&self, request: &SocialLoginRequest) -> BackendResult<UserRecord> {
        self.social_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.script.lock().gates.get(&request.token).cloned();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
        self.social_reply(&request.token).into_result()
    }

    async fn check_auth(&self, bearer: Option<&str>) -> BackendResult<UserRecord> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        match bearer {
            Some(token) => self.social_reply(token).into_result(),
            None => self
                .script
                .lock()
                .cookie
                .clone()
                .unwrap_or(Reply::Unauthorized)
                .into_result(),
        }
    }

    async fn password_login(&self, email: &str, password: &str) -> BackendResult<UserRecord> {
        let mut script = self.script.lock();
        match script.passwords.get(email).cloned() {
            Some((expected, account)) if expected == password => {
                script.credential = Some(format!("cookie-{}", account.id));
                Ok(account)
            }
            _ => Err(BackendError::Unauthorized(
                "Incorrect password! Please try again".to_string(),
            )),
        }
    }

    async fn register(&self, request: &RegisterRequest) -> BackendResult<UserRecord> {
        let mut script = self.script.lock();
        if script.passwords.contains_key(&request.email) {
            return Err(BackendError::Conflict(
                "User already exists with the same email! Please try again".to_string(),
            ));
        }
        let account = user(&format!("acct-{}", request.user_name), &request.email, Role::User);
        script.passwords.insert(
            request.email.clone(),
            (request.password.clone(), account.clone()),
        );
        script.credential = Some(format!("cookie-{}", account.id));
        Ok(account)
    }

    async fn logout(&self) -> BackendResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.script.lock().logout_gate.clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
        let mut script = self.script.lock();
        script.credential = None;
        if script.fail_logout {
            return Err(BackendError::Server {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn session_credential(&self) -> Option<String> {
        self.script.lock().credential.clone()
    }
}

/// State of the mock storefront auth API.
#[derive(Clone, Default)]
pub struct MockApi {
    pub social_calls: Arc<AtomicUsize>,
    pub logout_calls: Arc<AtomicUsize>,
}

pub const GOOD_TOKEN: &str = "good-token";
pub const SESSION_COOKIE: &str = "sess-123";

fn envelope(status: StatusCode, body: AuthResponse) -> Response {
    (status, Json(body)).into_response()
}

fn with_session_cookie(user: UserRecord) -> Response {
    (
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            format!("token={}; Path=/; HttpOnly", SESSION_COOKIE),
        )],
        Json(AuthResponse::ok(user)),
    )
        .into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn has_session_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(';').any(|pair| pair.trim() == format!("token={}", SESSION_COOKIE)))
}

async fn social_login(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Json(body): Json<SocialLoginRequest>,
) -> Response {
    api.social_calls.fetch_add(1, Ordering::SeqCst);
    match bearer(&headers).as_deref() {
        Some(GOOD_TOKEN) if body.token == GOOD_TOKEN => {
            with_session_cookie(user("acct-ann", &body.email, Role::User))
        }
        Some("conflict-token") => envelope(
            StatusCode::CONFLICT,
            AuthResponse::failure("Account already linked to another sign-in"),
        ),
        Some("broken-token") => envelope(
            StatusCode::INTERNAL_SERVER_ERROR,
            AuthResponse::failure("Social login failed"),
        ),
        Some("refused-token") => envelope(
            StatusCode::OK,
            AuthResponse::failure("Email is required"),
        ),
        _ => envelope(
            StatusCode::UNAUTHORIZED,
            AuthResponse::failure("Invalid or expired token"),
        ),
    }
}

async fn check_auth(headers: HeaderMap) -> Response {
    if bearer(&headers).as_deref() == Some(GOOD_TOKEN) || has_session_cookie(&headers) {
        return envelope(
            StatusCode::OK,
            AuthResponse::ok(user("acct-ann", "ann@example.com", Role::Admin)),
        );
    }
    envelope(
        StatusCode::UNAUTHORIZED,
        AuthResponse::failure("Unauthorised user!"),
    )
}

async fn login(Json(body): Json<serde_json::Value>) -> Response {
    if body["email"] == "ann@example.com" && body["password"] == "hunter2" {
        return with_session_cookie(user("acct-ann", "ann@example.com", Role::User));
    }
    envelope(
        StatusCode::OK,
        AuthResponse::failure("Incorrect password! Please try again"),
    )
}

async fn register(Json(body): Json<RegisterRequest>) -> Response {
    if body.email == "ann@example.com" {
        return envelope(
            StatusCode::OK,
            AuthResponse::failure("User already exists with the same email! Please try again"),
        );
    }
    with_session_cookie(user("acct-new", &body.email, Role::User))
}

async fn logout(State(api): State<MockApi>) -> Response {
    api.logout_calls.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::OK,
        [(header::SET_COOKIE, "token=; Path=/; Max-Age=0")],
        Json(serde_json::json!({ "success": true, "message": "Logged out successfully!" })),
    )
        .into_response()
}

/// Router mimicking the storefront's `/api/auth` routes.
pub fn mock_router(api: MockApi) -> Router {
    Router::new()
        .route("/api/auth/social-login", post(social_login))
        .route("/api/auth/check-auth", get(check_auth))
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/logout", post(logout))
        .with_state(api)
}

/// Serve the mock API on an ephemeral port.
pub async fn spawn_mock_api() -> (SocketAddr, MockApi) {
    let api = MockApi::default();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = mock_router(api.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, api)
}
