//! Session state.
//!
//! The [`SessionStore`] is the single source of truth for who is signed in.
//! Everything else reads snapshots or subscribes to changes.

mod models;
mod store;

pub use models::{Access, Account, Identity, Session, SessionOrigin, SessionStatus};
pub use store::SessionStore;
