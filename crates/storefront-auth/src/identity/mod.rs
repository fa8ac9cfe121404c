//! Identity provider boundary.
//!
//! The external identity provider is opaque. This module fixes the contract
//! the reconciler consumes: a multi-fire stream of sign-in/sign-out events
//! and on-demand bearer tokens.

mod error;
mod local;
mod provider;

pub use error::ProviderError;
pub use local::LocalIdentityProvider;
pub use provider::{IdentityEvent, IdentityProvider, IdentitySubscription};
