//! Identity provider contract.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::ProviderError;
use crate::session::Identity;

/// A change in the provider's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    SignedIn(Identity),
    SignedOut,
}

impl From<Option<Identity>> for IdentityEvent {
    fn from(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => IdentityEvent::SignedIn(identity),
            None => IdentityEvent::SignedOut,
        }
    }
}

impl IdentityEvent {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityEvent::SignedIn(identity) => Some(identity),
            IdentityEvent::SignedOut => None,
        }
    }
}

/// Live registration for identity events.
///
/// Delivery is at-least-once: the same identity may arrive more than once.
/// Dropping the subscription (or calling [`cancel`](Self::cancel)) stops
/// delivery.
#[derive(Debug)]
pub struct IdentitySubscription {
    rx: mpsc::UnboundedReceiver<IdentityEvent>,
}

impl IdentitySubscription {
    /// Wrap the receiving half of a provider's event channel.
    pub fn new(rx: mpsc::UnboundedReceiver<IdentityEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event. `None` once the provider has gone away or the
    /// subscription was cancelled.
    pub async fn next(&mut self) -> Option<IdentityEvent> {
        self.rx.recv().await
    }

    /// Stop delivery. Events already queued are discarded.
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Register for identity changes. The current state is delivered first.
    fn subscribe(&self) -> IdentitySubscription;

    /// Get a bearer token for the signed-in identity.
    ///
    /// `force_refresh` asks the provider for a newly minted token instead of a
    /// cached one.
    async fn id_token(&self, force_refresh: bool) -> Result<String, ProviderError>;

    /// End the provider session.
    async fn sign_out(&self) -> Result<(), ProviderError>;
}
