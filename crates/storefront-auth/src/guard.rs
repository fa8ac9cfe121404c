//! Route guard: maps the current session and a requested path to a
//! navigation decision.
//!
//! Precedence, highest first: a pending session always shows the loading
//! placeholder; the root path is always redirected; role rules are checked
//! before the generic authenticated / not-authenticated rules.

use serde::{Deserialize, Serialize};

use crate::session::{Access, Session};

/// Route layout of the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Where unauthenticated visitors are sent.
    pub login: String,
    /// Landing page for signed-in customers.
    pub shop_home: String,
    /// Landing page for administrators.
    pub admin_dashboard: String,
    /// Shown to customers who request an admin page.
    pub unauthorized: String,
    pub auth_prefix: String,
    pub admin_prefix: String,
    pub shop_prefix: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            shop_home: "/shop/home".to_string(),
            admin_dashboard: "/admin/dashboard".to_string(),
            unauthorized: "/unauthorized".to_string(),
            auth_prefix: "/auth".to_string(),
            admin_prefix: "/admin".to_string(),
            shop_prefix: "/shop".to_string(),
        }
    }
}

/// Coarse category of a requested path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathCategory {
    Root,
    Auth,
    Admin,
    Shop,
    Other,
}

impl std::fmt::Display for PathCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PathCategory::Root => "root",
            PathCategory::Auth => "auth",
            PathCategory::Admin => "admin",
            PathCategory::Shop => "shop",
            PathCategory::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RouteDecision {
    /// Render the requested page.
    Allow,
    /// Session still resolving; show a placeholder and do not navigate.
    Loading,
    /// Navigate elsewhere. `return_to` is the originally requested path when
    /// it should be restored after sign-in.
    Redirect {
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        return_to: Option<String>,
    },
}

impl RouteDecision {
    fn redirect(to: &str) -> Self {
        RouteDecision::Redirect {
            to: to.to_string(),
            return_to: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, RouteDecision::Allow)
    }

    pub fn redirect_to(&self) -> Option<&str> {
        match self {
            RouteDecision::Redirect { to, .. } => Some(to),
            _ => None,
        }
    }

    pub fn return_to(&self) -> Option<&str> {
        match self {
            RouteDecision::Redirect { return_to, .. } => return_to.as_deref(),
            _ => None,
        }
    }
}

/// Strip query and fragment, collapse trailing slashes.
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Segment-aware prefix match: `/admin` matches `/admin` and `/admin/x`, not
/// `/administrator`.
fn under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Stateless guard evaluated on every navigation.
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    routes: RouteConfig,
}

impl RouteGuard {
    pub fn new(routes: RouteConfig) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &RouteConfig {
        &self.routes
    }

    pub fn categorize(&self, path: &str) -> PathCategory {
        let path = normalize(path);
        if path == "/" {
            PathCategory::Root
        } else if under(path, &self.routes.auth_prefix) {
            PathCategory::Auth
        } else if under(path, &self.routes.admin_prefix) {
            PathCategory::Admin
        } else if under(path, &self.routes.shop_prefix) {
            PathCategory::Shop
        } else {
            PathCategory::Other
        }
    }

    pub fn decide(&self, session: &Session, path: &str) -> RouteDecision {
        self.decide_for(session.access(), path)
    }

    pub fn decide_for(&self, access: Access, path: &str) -> RouteDecision {
        let category = self.categorize(path);
        let routes = &self.routes;

        match (access, category) {
            (Access::Pending, _) => RouteDecision::Loading,

            (Access::Anonymous, PathCategory::Root) => RouteDecision::redirect(&routes.login),
            (Access::User, PathCategory::Root) => RouteDecision::redirect(&routes.shop_home),
            (Access::Admin, PathCategory::Root) => RouteDecision::redirect(&routes.admin_dashboard),

            (Access::Admin, PathCategory::Auth | PathCategory::Shop) => {
                RouteDecision::redirect(&routes.admin_dashboard)
            }
            (Access::Admin, PathCategory::Admin | PathCategory::Other) => RouteDecision::Allow,

            (Access::User, PathCategory::Admin) => RouteDecision::redirect(&routes.unauthorized),
            (Access::User, PathCategory::Auth) => RouteDecision::redirect(&routes.shop_home),
            (Access::User, PathCategory::Shop | PathCategory::Other) => RouteDecision::Allow,

            (Access::Anonymous, PathCategory::Auth) => RouteDecision::Allow,
            (Access::Anonymous, _) => RouteDecision::Redirect {
                to: routes.login.clone(),
                return_to: Some(path.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::session::{Account, Identity, SessionOrigin};

    fn guard() -> RouteGuard {
        RouteGuard::default()
    }

    fn signed_in(role: Role) -> Session {
        let account = Account {
            account_id: "acct-1".to_string(),
            role,
            email: "ann@example.com".to_string(),
            user_name: "ann".to_string(),
        };
        Session::authenticated(
            Some(Identity::new("uid-1", "ann@example.com")),
            account,
            SessionOrigin::Provider,
        )
    }

    #[test]
    fn test_categorize() {
        let guard = guard();
        assert_eq!(guard.categorize("/"), PathCategory::Root);
        assert_eq!(guard.categorize(""), PathCategory::Root);
        assert_eq!(guard.categorize("/?ref=mail"), PathCategory::Root);
        assert_eq!(guard.categorize("/auth/login"), PathCategory::Auth);
        assert_eq!(guard.categorize("/auth"), PathCategory::Auth);
        assert_eq!(guard.categorize("/admin/products/"), PathCategory::Admin);
        assert_eq!(guard.categorize("/shop/listing?category=men"), PathCategory::Shop);
        assert_eq!(guard.categorize("/administrator"), PathCategory::Other);
        assert_eq!(guard.categorize("/unauthorized"), PathCategory::Other);
    }

    #[test]
    fn test_not_authenticated_root_goes_to_login() {
        let decision = guard().decide(&Session::not_authenticated(), "/");
        assert_eq!(decision.redirect_to(), Some("/auth/login"));
        assert_eq!(decision.return_to(), None);
    }

    #[test]
    fn test_not_authenticated_keeps_requested_path() {
        let decision = guard().decide(&Session::not_authenticated(), "/shop/checkout?step=2");
        assert_eq!(decision.redirect_to(), Some("/auth/login"));
        assert_eq!(decision.return_to(), Some("/shop/checkout?step=2"));
    }

    #[test]
    fn test_not_authenticated_may_visit_auth_pages() {
        let guard = guard();
        let session = Session::not_authenticated();
        assert!(guard.decide(&session, "/auth/login").is_allowed());
        assert!(guard.decide(&session, "/auth/register").is_allowed());
    }

    #[test]
    fn test_pending_never_redirects() {
        let guard = guard();
        let session = Session::pending(Some(Identity::new("uid-1", "ann@example.com")));
        for path in ["/", "/auth/login", "/admin/dashboard", "/shop/home", "/about"] {
            assert_eq!(guard.decide(&session, path), RouteDecision::Loading);
        }
        assert_eq!(guard.decide(&Session::pending(None), "/"), RouteDecision::Loading);
    }

    #[test]
    fn test_user_routes() {
        let guard = guard();
        let session = signed_in(Role::User);
        assert_eq!(guard.decide(&session, "/").redirect_to(), Some("/shop/home"));
        assert_eq!(guard.decide(&session, "/auth/login").redirect_to(), Some("/shop/home"));
        assert_eq!(
            guard.decide(&session, "/admin/dashboard").redirect_to(),
            Some("/unauthorized")
        );
        assert!(guard.decide(&session, "/shop/cart").is_allowed());
        assert!(guard.decide(&session, "/unauthorized").is_allowed());
    }

    #[test]
    fn test_admin_routes() {
        let guard = guard();
        let session = signed_in(Role::Admin);
        assert_eq!(guard.decide(&session, "/").redirect_to(), Some("/admin/dashboard"));
        assert_eq!(
            guard.decide(&session, "/auth/register").redirect_to(),
            Some("/admin/dashboard")
        );
        assert_eq!(
            guard.decide(&session, "/shop/home").redirect_to(),
            Some("/admin/dashboard")
        );
        assert!(guard.decide(&session, "/admin/orders").is_allowed());
        assert!(guard.decide(&session, "/about").is_allowed());
    }

    #[test]
    fn test_custom_routes() {
        let guard = RouteGuard::new(RouteConfig {
            login: "/signin".to_string(),
            auth_prefix: "/signin".to_string(),
            ..RouteConfig::default()
        });
        let session = Session::not_authenticated();
        assert!(guard.decide(&session, "/signin").is_allowed());
        assert_eq!(guard.decide(&session, "/").redirect_to(), Some("/signin"));
    }

    #[test]
    fn test_decision_serializes_tagged() {
        let json = serde_json::to_value(RouteDecision::redirect("/auth/login")).unwrap();
        assert_eq!(json["decision"], "redirect");
        assert_eq!(json["to"], "/auth/login");
        assert!(json.get("return_to").is_none());
    }
}
