//! In-process identity provider.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::{IdentityEvent, IdentityProvider, IdentitySubscription, ProviderError};
use crate::session::Identity;

#[derive(Debug, Default)]
struct LocalState {
    current: Option<(Identity, String)>,
    subscribers: Vec<mpsc::UnboundedSender<IdentityEvent>>,
    token_error: Option<ProviderError>,
    sign_out_error: Option<ProviderError>,
}

impl LocalState {
    fn current_event(&self) -> IdentityEvent {
        match &self.current {
            Some((identity, _)) => IdentityEvent::SignedIn(identity.clone()),
            None => IdentityEvent::SignedOut,
        }
    }

    fn broadcast(&mut self, event: IdentityEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Identity provider driven from within the process.
///
/// Used when the embedding application already holds the provider session
/// (for example a token handed to the CLI) and in tests. Cloning shares the
/// same provider session.
#[derive(Debug, Clone, Default)]
pub struct LocalIdentityProvider {
    state: Arc<Mutex<LocalState>>,
    token_requests: Arc<AtomicUsize>,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that starts signed in.
    pub fn signed_in(identity: Identity, token: impl Into<String>) -> Self {
        let provider = Self::new();
        provider.state.lock().current = Some((identity, token.into()));
        provider
    }

    /// Sign in (or switch to) an identity and notify subscribers.
    pub fn sign_in(&self, identity: Identity, token: impl Into<String>) {
        let mut state = self.state.lock();
        state.current = Some((identity.clone(), token.into()));
        state.broadcast(IdentityEvent::SignedIn(identity));
    }

    /// Replace the token of the signed-in identity without an event.
    pub fn rotate_token(&self, token: impl Into<String>) {
        if let Some((_, current)) = self.state.lock().current.as_mut() {
            *current = token.into();
        }
    }

    /// Deliver the current state again, as providers may do on reconnect.
    pub fn redeliver(&self) {
        let mut state = self.state.lock();
        let event = state.current_event();
        state.broadcast(event);
    }

    /// Make subsequent token requests fail.
    pub fn fail_tokens_with(&self, error: Option<ProviderError>) {
        self.state.lock().token_error = error;
    }

    /// Make subsequent sign-out requests fail. The local session is still
    /// ended.
    pub fn fail_sign_out_with(&self, error: Option<ProviderError>) {
        self.state.lock().sign_out_error = error;
    }

    /// Number of token requests served so far.
    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn subscribe(&self) -> IdentitySubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let _ = tx.send(state.current_event());
        state.subscribers.push(tx);
        IdentitySubscription::new(rx)
    }

    async fn id_token(&self, _force_refresh: bool) -> Result<String, ProviderError> {
        self.token_requests.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if let Some(err) = &state.token_error {
            return Err(err.clone());
        }
        state
            .current
            .as_ref()
            .map(|(_, token)| token.clone())
            .ok_or(ProviderError::NoActiveSession)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.current = None;
        state.broadcast(IdentityEvent::SignedOut);
        match &state.sign_out_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
