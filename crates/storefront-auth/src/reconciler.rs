//! Auth reconciler: drives the session store from identity provider events.
//!
//! Every provider event and every explicit action (sign-out, password
//! sign-in) takes the next sequence number. A sync result is applied only if
//! its sequence number is still the latest when it arrives, and that check
//! happens under the same lock as the store transition, so an older sync can
//! never overwrite the outcome of a newer one.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storefront_protocol::RegisterRequest;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{SyncError, SyncResult};
use crate::identity::{IdentityEvent, IdentityProvider, IdentitySubscription};
use crate::session::{Account, Identity, Session, SessionOrigin, SessionStore};
use crate::sync::SessionSync;

/// Size of the notice broadcast channel.
const NOTICE_BUFFER_SIZE: usize = 32;

/// User-facing messages raised while reconciling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthNotice {
    /// The backend could not be reached; shown as a non-blocking banner.
    Transient { message: String },
    /// The provider identity belongs to a different backend account.
    AccountConflict { message: String },
    /// The credential was rejected; the shopper has to sign in again.
    SessionExpired,
    /// No provider token and no usable session cookie.
    ProviderUnavailable { message: String },
}

type Resolved = Option<(Account, SessionOrigin)>;

#[derive(Debug, Default)]
struct Gate {
    seq: u64,
    last_event: Option<IdentityEvent>,
    /// Last session that was successfully authenticated.
    last_valid: Option<Session>,
    closed: bool,
}

impl Gate {
    fn advance(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn is_current(&self, seq: u64) -> bool {
        !self.closed && self.seq == seq
    }
}

/// Two sign-outs, or two sign-ins for the same external id and email.
fn same_event(a: &IdentityEvent, b: &IdentityEvent) -> bool {
    match (a, b) {
        (IdentityEvent::SignedOut, IdentityEvent::SignedOut) => true,
        (IdentityEvent::SignedIn(a), IdentityEvent::SignedIn(b)) => {
            a.external_id == b.external_id && a.email.eq_ignore_ascii_case(&b.email)
        }
        _ => false,
    }
}

/// Whether a previous session may stand in when syncing `identity` fails
/// transiently.
fn covers(previous: &Session, identity: Option<&Identity>) -> bool {
    match identity {
        Some(identity) => previous
            .identity()
            .is_some_and(|prev| prev.external_id == identity.external_id),
        None => previous.origin() == Some(SessionOrigin::Cookie),
    }
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    sync: Arc<SessionSync>,
    store: SessionStore,
    gate: Mutex<Gate>,
    notices: broadcast::Sender<AuthNotice>,
    /// Sequence number of the last applied event or action.
    settled: watch::Sender<u64>,
}

impl Inner {
    fn notify(&self, notice: AuthNotice) {
        debug!(?notice, "auth notice");
        // No receivers is fine.
        let _ = self.notices.send(notice);
    }

    fn handle_event(self: &Arc<Self>, event: IdentityEvent) {
        let seq = {
            let mut gate = self.gate.lock();
            if gate.closed {
                return;
            }
            if gate
                .last_event
                .as_ref()
                .is_some_and(|last| same_event(last, &event))
            {
                debug!(seq = gate.seq, "ignoring redelivered identity event");
                return;
            }
            let seq = gate.advance();
            gate.last_event = Some(event.clone());
            self.store.set_pending(event.identity().cloned());
            seq
        };

        match event.identity() {
            Some(identity) => info!(seq, external_id = %identity.external_id, "identity signed in"),
            None => info!(seq, "identity signed out"),
        }

        let inner = self.clone();
        tokio::spawn(async move {
            inner.reconcile(seq, event).await;
        });
    }

    async fn reconcile(&self, seq: u64, event: IdentityEvent) {
        let identity = event.identity();
        let result = match identity {
            Some(identity) => match self.provider.id_token(true).await {
                Ok(token) => self
                    .sync
                    .sync(identity, &token)
                    .await
                    .map(|account| Some((account, SessionOrigin::Provider))),
                Err(err) => {
                    warn!(seq, error = %err, "no provider token, falling back to session cookie");
                    match self.check_cookie().await {
                        Ok(None) => Err(SyncError::from(err)),
                        other => other,
                    }
                }
            },
            None => self.check_cookie().await,
        };
        self.settle(seq, identity, result);
    }

    async fn check_cookie(&self) -> SyncResult<Resolved> {
        let account = self.sync.check_session().await?;
        Ok(account.map(|account| (account, SessionOrigin::Cookie)))
    }

    /// Apply the outcome of sync `seq` if it is still the latest.
    fn settle(&self, seq: u64, identity: Option<&Identity>, result: SyncResult<Resolved>) {
        let mut gate = self.gate.lock();
        if !gate.is_current(seq) {
            debug!(seq, latest = gate.seq, closed = gate.closed, "discarding stale sync result");
            return;
        }

        match result {
            Ok(Some((account, origin))) => {
                let account_id = account.account_id.clone();
                if self.store.set_authenticated(account, origin) {
                    gate.last_valid = Some(self.store.snapshot());
                    info!(seq, account_id = %account_id, origin = ?origin, "session established");
                }
            }
            Ok(None) => {
                self.store.clear();
                gate.last_valid = None;
                debug!(seq, "no session to restore");
            }
            Err(err @ SyncError::Network(_)) => {
                match gate.last_valid.clone().filter(|prev| covers(prev, identity)) {
                    Some(previous) => self.restore(&previous),
                    None => {
                        self.store.clear();
                        gate.last_valid = None;
                    }
                }
                // A redelivered event should retry.
                gate.last_event = None;
                warn!(seq, error = %err, "session sync failed transiently");
                self.notify(AuthNotice::Transient {
                    message: err.user_message(),
                });
            }
            Err(err @ SyncError::AccountConflict(_)) => {
                match gate.last_valid.clone() {
                    Some(previous) => self.restore(&previous),
                    None => self.store.clear(),
                }
                warn!(seq, error = %err, "account conflict");
                self.notify(AuthNotice::AccountConflict {
                    message: err.user_message(),
                });
            }
            Err(err @ (SyncError::InvalidToken(_) | SyncError::Rejected(_))) => {
                self.store.clear();
                gate.last_valid = None;
                info!(seq, error = %err, "credential rejected");
                self.notify(AuthNotice::SessionExpired);
            }
            Err(err @ (SyncError::ProviderUnavailable(_) | SyncError::Misconfigured(_))) => {
                self.store.clear();
                gate.last_valid = None;
                warn!(seq, error = %err, "no session available");
                self.notify(AuthNotice::ProviderUnavailable {
                    message: err.user_message(),
                });
            }
        }
        self.settled.send_replace(seq);
    }

    /// Put a previously authenticated session back. Caller holds the gate.
    fn restore(&self, previous: &Session) {
        let (Some(account), Some(origin)) = (previous.account().cloned(), previous.origin())
        else {
            self.store.clear();
            return;
        };
        if self.store.snapshot().identity() != previous.identity() {
            self.store.set_pending(previous.identity().cloned());
        }
        let account_id = account.account_id.clone();
        self.store.set_authenticated(account, origin);
        debug!(account_id = %account_id, "previous session restored");
    }

    /// Start an explicit action, superseding any sync in flight.
    fn begin_action(&self) -> u64 {
        let mut gate = self.gate.lock();
        let seq = gate.advance();
        gate.last_event = None;
        self.store.set_pending(None);
        seq
    }

    /// Apply the result of a password sign-in or registration.
    fn finish_action(&self, seq: u64, result: &SyncResult<Account>) {
        let mut gate = self.gate.lock();
        if !gate.is_current(seq) {
            debug!(seq, latest = gate.seq, "discarding superseded sign-in result");
            return;
        }
        match result {
            Ok(account) => {
                if self
                    .store
                    .set_authenticated(account.clone(), SessionOrigin::Cookie)
                {
                    gate.last_valid = Some(self.store.snapshot());
                    info!(seq, account_id = %account.account_id, "signed in with password");
                }
            }
            Err(err) => {
                match gate.last_valid.clone() {
                    Some(previous) => self.restore(&previous),
                    None => self.store.clear(),
                }
                debug!(seq, error = %err, "password sign-in failed");
            }
        }
        self.settled.send_replace(seq);
    }
}

/// Keeps a [`SessionStore`] in line with an identity provider and the
/// storefront backend.
pub struct AuthReconciler {
    inner: Arc<Inner>,
    stop: Arc<Notify>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl AuthReconciler {
    /// Subscribe to `provider` and start reconciling. Must be called from
    /// within a tokio runtime.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        sync: Arc<SessionSync>,
        store: SessionStore,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_BUFFER_SIZE);
        let subscription = provider.subscribe();
        let inner = Arc::new(Inner {
            provider,
            sync,
            store,
            gate: Mutex::new(Gate::default()),
            notices,
            settled: watch::Sender::new(0),
        });
        let stop = Arc::new(Notify::new());
        let event_loop = tokio::spawn(run(inner.clone(), subscription, stop.clone()));

        info!("auth reconciler started");
        Self {
            inner,
            stop,
            event_loop: Mutex::new(Some(event_loop)),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn snapshot(&self) -> Session {
        self.inner.store.snapshot()
    }

    /// Receive user-facing notices raised from now on.
    pub fn notices(&self) -> broadcast::Receiver<AuthNotice> {
        self.inner.notices.subscribe()
    }

    /// Wait until the latest event or action has been applied, then return
    /// the session.
    pub async fn settled(&self) -> Session {
        let mut rx = self.inner.settled.subscribe();
        loop {
            let latest = self.inner.gate.lock().seq;
            if latest > 0 && *rx.borrow_and_update() >= latest {
                return self.snapshot();
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    /// Sign out of both the provider and the backend.
    ///
    /// Both calls are always made; failures are logged. The store ends
    /// `NotAuthenticated` either way and syncs still in flight are discarded,
    /// unless a provider event arrives while the calls run: that event wins.
    pub async fn sign_out(&self) {
        let seq = {
            let mut gate = self.inner.gate.lock();
            let seq = gate.advance();
            gate.last_valid = None;
            gate.last_event = Some(IdentityEvent::SignedOut);
            self.inner.store.clear();
            seq
        };
        info!(seq, "signing out");

        let (provider, backend) = tokio::join!(
            self.inner.provider.sign_out(),
            self.inner.sync.backend().logout()
        );
        if let Err(err) = provider {
            warn!(error = %err, "provider sign-out failed");
        }
        if let Err(err) = backend {
            warn!(error = %err, "backend logout failed");
        }

        let mut gate = self.inner.gate.lock();
        if gate.seq != seq {
            info!(seq, latest = gate.seq, "sign-out superseded by a newer event");
            return;
        }
        gate.last_valid = None;
        gate.last_event = Some(IdentityEvent::SignedOut);
        self.inner.store.clear();
        self.inner.settled.send_replace(seq);
    }

    /// Sign in with email and password. The session is authenticated with
    /// the backend's session cookie.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> SyncResult<Account> {
        let seq = self.inner.begin_action();
        let result = self.inner.sync.sign_in_with_password(email, password).await;
        self.inner.finish_action(seq, &result);
        result
    }

    /// Register a password account and sign in with it.
    pub async fn register(&self, request: &RegisterRequest) -> SyncResult<Account> {
        let seq = self.inner.begin_action();
        let result = self.inner.sync.register(request).await;
        self.inner.finish_action(seq, &result);
        result
    }

    /// Stop listening to the provider. Syncs in flight run to completion but
    /// their results are dropped.
    pub async fn shutdown(&self) {
        self.inner.gate.lock().closed = true;
        self.stop.notify_one();

        let handle = self.event_loop.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "identity event loop ended abnormally");
            }
        }
        info!("auth reconciler stopped");
    }
}

impl Drop for AuthReconciler {
    fn drop(&mut self) {
        self.inner.gate.lock().closed = true;
        self.stop.notify_one();
    }
}

async fn run(inner: Arc<Inner>, mut subscription: IdentitySubscription, stop: Arc<Notify>) {
    let cancelled = loop {
        tokio::select! {
            _ = stop.notified() => break true,
            event = subscription.next() => match event {
                Some(event) => inner.handle_event(event),
                None => break false,
            },
        }
    };

    if cancelled {
        subscription.cancel();
        debug!("identity subscription cancelled");
    } else {
        debug!("identity provider closed the subscription");
    }
}
