//! Route entry checks.

use console_config_and_utils::Config;
use secure_scoped_storage::SessionSnapshot;

/// Access requirements of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMeta {
    pub path: String,
    pub requires_auth: bool,
    pub requires_admin: bool,
}

impl RouteMeta {
    pub fn public(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            requires_auth: false,
            requires_admin: false,
        }
    }

    pub fn authenticated(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            requires_auth: true,
            requires_admin: false,
        }
    }

    pub fn admin(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            requires_auth: true,
            requires_admin: true,
        }
    }
}

/// Result of a route check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Redirect(String),
}

/// Well-known console routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub login: String,
    pub console: String,
    pub portal: String,
}

impl Routes {
    pub fn from_config(config: &Config) -> Self {
        Self {
            login: config.login_route.clone(),
            console: config.console_route.clone(),
            portal: config.portal_route.clone(),
        }
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Decide whether `route` may be entered with the given session.
pub fn check_route(routes: &Routes, route: &RouteMeta, session: &SessionSnapshot) -> GuardDecision {
    let logged_in = session.is_logged_in();

    if route.requires_auth && !logged_in {
        return GuardDecision::Redirect(routes.login.clone());
    }

    if route.requires_admin {
        let is_admin = session
            .identity
            .as_ref()
            .map(|identity| identity.is_admin())
            .unwrap_or(false);
        if !is_admin {
            return GuardDecision::Redirect(routes.portal.clone());
        }
    }

    if route.path == routes.login && logged_in {
        return GuardDecision::Redirect(routes.console.clone());
    }

    GuardDecision::Proceed
}
