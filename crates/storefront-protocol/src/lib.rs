//! Wire types for the storefront auth API.
//!
//! Every auth endpoint answers with the same [`AuthResponse`] envelope. The
//! request bodies mirror what the storefront backend expects under
//! `/api/auth`.

mod auth;
mod role;

pub use auth::{
    AuthResponse, PasswordLoginRequest, RegisterRequest, SocialLoginRequest, UserRecord,
};
pub use role::Role;
