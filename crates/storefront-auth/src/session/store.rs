//! Process-wide session store with change notification.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{Account, Identity, Session, SessionOrigin, SessionStatus};

/// Holds the current [`Session`] and notifies subscribers on every change.
///
/// Each transition replaces the whole session inside a single
/// `watch::Sender::send_if_modified`, so subscribers never observe a partial
/// update. Transitions that would not change anything do not notify.
#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store in the `NotAuthenticated` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::not_authenticated());
        Self { tx: Arc::new(tx) }
    }

    /// Current session by value.
    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    /// Subscribe to session changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Move to `Pending`, recording the identity being reconciled (if any).
    /// Allowed from any state.
    pub fn set_pending(&self, identity: Option<Identity>) {
        self.tx.send_if_modified(|session| {
            let next = Session::pending(identity);
            if *session == next {
                return false;
            }
            debug!(
                from = ?session.status(),
                external_id = next.identity().map(|i| i.external_id.as_str()),
                "session pending"
            );
            *session = next;
            true
        });
    }

    /// Move to `Authenticated` with the given account.
    ///
    /// Allowed from `Pending`, or from `Authenticated` to refresh the role.
    /// A recorded identity that does not belong to the account is dropped.
    /// Returns `false` (and leaves the state untouched) when called from
    /// `NotAuthenticated`.
    pub fn set_authenticated(&self, account: Account, origin: SessionOrigin) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|session| {
            if session.status() == SessionStatus::NotAuthenticated {
                warn!(
                    account_id = %account.account_id,
                    "ignoring authenticate without a pending sign-in"
                );
                return false;
            }
            applied = true;

            let identity = match session.identity() {
                Some(identity) if identity.matches_account(&account) => Some(identity.clone()),
                Some(identity) => {
                    debug!(
                        external_id = %identity.external_id,
                        account_id = %account.account_id,
                        "dropping identity that does not match account"
                    );
                    None
                }
                None => None,
            };

            let next = Session::authenticated(identity, account.clone(), origin);
            if *session == next {
                return false;
            }
            debug!(
                account_id = %account.account_id,
                role = %account.role,
                origin = ?origin,
                "session authenticated"
            );
            *session = next;
            true
        });
        applied
    }

    /// Move to `NotAuthenticated`, dropping identity and account.
    /// Allowed from any state.
    pub fn clear(&self) {
        self.tx.send_if_modified(|session| {
            if session.status() == SessionStatus::NotAuthenticated && session.identity().is_none()
            {
                return false;
            }
            debug!(from = ?session.status(), "session cleared");
            *session = Session::not_authenticated();
            true
        });
    }
}
