//! Authentication primitives shared by the session components.
//!
//! Provides:
//! - The sync error taxonomy surfaced by backend session sync
//! - Decoding of the backend-issued session credential
//! - Auth tuning knobs (cookie name, retry policy, expiry leeway)

mod claims;
mod config;
mod error;

pub use claims::{ClaimsError, SessionClaims};
pub use config::{AuthConfig, ConfigValidationError};
pub use error::{SyncError, SyncResult};
pub use storefront_protocol::Role;
