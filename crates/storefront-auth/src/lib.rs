//! Storefront session reconciliation.
//!
//! Keeps the storefront's notion of "who is signed in" consistent across two
//! identity sources: an external identity provider issuing bearer tokens, and
//! the backend's own session cookie. The pieces, leaves first:
//!
//! - [`session::SessionStore`]: the current session, with change notification
//! - [`identity::IdentityProvider`]: the provider's event stream and tokens
//! - [`sync::SessionSync`]: token to backend account exchange, single-flight
//!   per token
//! - [`guard::RouteGuard`]: session and path to a navigation decision
//! - [`reconciler::AuthReconciler`]: wires provider events through sync into
//!   the store, last event wins

pub mod auth;
pub mod backend;
pub mod delivery;
pub mod guard;
pub mod identity;
pub mod reconciler;
pub mod session;
pub mod sync;

pub use guard::{PathCategory, RouteConfig, RouteDecision, RouteGuard};
pub use reconciler::{AuthNotice, AuthReconciler};
pub use session::{Session, SessionStatus, SessionStore};
