//! Session data model.

use serde::{Deserialize, Serialize};
use storefront_protocol::{Role, UserRecord};

/// Authentication status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    NotAuthenticated,
    /// A sign-in or session check is in flight.
    Pending,
    Authenticated,
}

/// An identity as reported by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-side user id.
    pub external_id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(external_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            email: email.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name to register with the backend: the display name, or the local
    /// part of the email.
    pub fn preferred_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }

    /// Check whether this identity belongs to the given account.
    pub fn matches_account(&self, account: &Account) -> bool {
        self.email.eq_ignore_ascii_case(&account.email)
    }
}

/// The application's own account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub role: Role,
    pub email: String,
    pub user_name: String,
}

impl From<UserRecord> for Account {
    fn from(user: UserRecord) -> Self {
        Self {
            account_id: user.id,
            role: user.role,
            email: user.email,
            user_name: user.user_name,
        }
    }
}

/// Where an authenticated session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    /// Identity provider token exchanged with the backend.
    Provider,
    /// Backend session cookie (password login or a previously issued session).
    Cookie,
}

/// Coarse access level derived from a session, as seen by the route guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    Pending,
    Anonymous,
    User,
    Admin,
}

/// Snapshot of the authentication state.
///
/// `account` and `origin` are present exactly when the status is
/// [`SessionStatus::Authenticated`]; the constructors are the only way to
/// build one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    account: Option<Account>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<SessionOrigin>,
}

impl Session {
    pub fn not_authenticated() -> Self {
        Self::default()
    }

    pub fn pending(identity: Option<Identity>) -> Self {
        Self {
            status: SessionStatus::Pending,
            identity,
            account: None,
            origin: None,
        }
    }

    pub fn authenticated(
        identity: Option<Identity>,
        account: Account,
        origin: SessionOrigin,
    ) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            identity,
            account: Some(account),
            origin: Some(origin),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn origin(&self) -> Option<SessionOrigin> {
        self.origin
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn role(&self) -> Option<Role> {
        self.account.as_ref().map(|a| a.role)
    }

    /// Access level for routing decisions.
    pub fn access(&self) -> Access {
        match (self.status, self.role()) {
            (SessionStatus::Pending, _) => Access::Pending,
            (SessionStatus::Authenticated, Some(Role::Admin)) => Access::Admin,
            (SessionStatus::Authenticated, Some(Role::User)) => Access::User,
            _ => Access::Anonymous,
        }
    }
}
