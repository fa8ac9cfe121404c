//! Backend session sync service.

use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use storefront_protocol::{RegisterRequest, SocialLoginRequest};
use tracing::{debug, info, warn};

use super::SingleFlight;
use crate::auth::{AuthConfig, SessionClaims, SyncError, SyncResult};
use crate::backend::{BackendError, SessionBackend};
use crate::session::{Account, Identity};

/// Run `op` up to `attempts` times while it fails transiently.
async fn with_retry<T, F, Fut>(attempts: u32, delay: Duration, what: &str, mut op: F) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(attempt, error = %err, "{} failed transiently, retrying", what);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Social login followed by a check-auth confirmation with the same token.
async fn exchange_token(
    backend: &dyn SessionBackend,
    identity: &Identity,
    token: &str,
    provider_name: &str,
) -> SyncResult<Account> {
    let request = SocialLoginRequest {
        token: token.to_string(),
        uid: identity.external_id.clone(),
        email: identity.email.clone(),
        name: identity.preferred_name().to_string(),
        provider: provider_name.to_string(),
    };
    let upserted = backend.social_login(&request).await?;

    let user = match backend.check_auth(Some(token)).await {
        Ok(confirmed) => confirmed,
        Err(err) => {
            debug!(error = %err, "check-auth after social login failed, using social login account");
            upserted
        }
    };

    let account = Account::from(user);
    if !identity.matches_account(&account) {
        return Err(SyncError::AccountConflict(format!(
            "identity {} resolved to account {} owned by another email",
            identity.external_id, account.account_id
        )));
    }
    Ok(account)
}

async fn confirm_cookie(backend: &dyn SessionBackend) -> SyncResult<Account> {
    let user = backend.check_auth(None).await?;
    Ok(Account::from(user))
}

/// Reconciles provider identities and session cookies with backend accounts.
///
/// Concurrent syncs for the same token (or the same session cookie) share a
/// single backend round trip.
pub struct SessionSync {
    backend: Arc<dyn SessionBackend>,
    config: AuthConfig,
    flights: SingleFlight<SyncResult<Account>>,
}

impl SessionSync {
    pub fn new(backend: Arc<dyn SessionBackend>, config: AuthConfig) -> Self {
        Self {
            backend,
            config,
            flights: SingleFlight::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn SessionBackend> {
        &self.backend
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Number of credentials with a sync in flight.
    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }

    /// Exchange a provider token for the identity's backend account.
    pub async fn sync(&self, identity: &Identity, token: &str) -> SyncResult<Account> {
        let key = format!("bearer:{}", token);
        self.flights
            .run(&key, || {
                let backend = self.backend.clone();
                let identity = identity.clone();
                let token = token.to_string();
                let provider_name = self.config.provider_name.clone();
                let attempts = self.config.sync_attempts();
                let delay = self.config.retry_delay();
                async move {
                    info!(external_id = %identity.external_id, "syncing provider identity");
                    let result = with_retry(attempts, delay, "token exchange", || {
                        exchange_token(backend.as_ref(), &identity, &token, &provider_name)
                    })
                    .await;
                    match &result {
                        Ok(account) => info!(
                            external_id = %identity.external_id,
                            account_id = %account.account_id,
                            role = %account.role,
                            "provider identity synced"
                        ),
                        Err(err) => warn!(
                            external_id = %identity.external_id,
                            code = err.code(),
                            error = %err,
                            "provider identity sync failed"
                        ),
                    }
                    result
                }
                .boxed()
            })
            .await
    }

    /// Resolve the account behind the locally held session cookie.
    ///
    /// `Ok(None)` when no cookie is held or it has already expired locally.
    pub async fn check_session(&self) -> SyncResult<Option<Account>> {
        let Some(credential) = self.backend.session_credential() else {
            debug!("no session cookie held");
            return Ok(None);
        };

        match SessionClaims::decode_unverified(&credential) {
            Ok(claims) if claims.is_expired(self.config.expiry_leeway_secs) => {
                debug!(account_id = %claims.id, "session cookie expired locally");
                return Ok(None);
            }
            Ok(_) => {}
            Err(err) => debug!(error = %err, "session cookie is opaque, asking backend"),
        }

        let key = format!("cookie:{}", credential);
        let account = self
            .flights
            .run(&key, || {
                let backend = self.backend.clone();
                let attempts = self.config.sync_attempts();
                let delay = self.config.retry_delay();
                async move {
                    with_retry(attempts, delay, "session check", || {
                        confirm_cookie(backend.as_ref())
                    })
                    .await
                }
                .boxed()
            })
            .await?;
        Ok(Some(account))
    }

    /// Password sign-in. On success the backend's session cookie is held.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> SyncResult<Account> {
        let user = self
            .backend
            .password_login(email, password)
            .await
            .map_err(BackendError::into_rejection)?;
        Ok(Account::from(user))
    }

    /// Register a password account. On success the backend's session cookie
    /// is held.
    pub async fn register(&self, request: &RegisterRequest) -> SyncResult<Account> {
        let user = self
            .backend
            .register(request)
            .await
            .map_err(BackendError::into_rejection)?;
        Ok(Account::from(user))
    }
}
