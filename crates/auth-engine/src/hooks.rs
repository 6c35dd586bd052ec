//! Seam to the user interface: notices and navigation.

use std::fmt;
use tracing::{info, warn};

/// User-visible notice emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Forbidden,
    NotFound,
    ServerError,
    /// Other failed status, with the backend's message when it sent one.
    RequestFailed(String),
    NetworkError,
    SessionExpired,
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Forbidden => "Forbidden, insufficient permissions",
            Notice::NotFound => "Resource not found",
            Notice::ServerError => "Internal server error",
            Notice::RequestFailed(message) => message,
            Notice::NetworkError => "Network error, please check your connection",
            Notice::SessionExpired => "Session expired, please log in again",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Callbacks into whatever presents the console.
pub trait UiHooks: Send + Sync {
    /// Show a notice to the user.
    fn notify(&self, notice: Notice);

    /// Path of the screen currently shown, if any.
    fn current_route(&self) -> Option<String>;

    /// Move to another screen.
    fn navigate(&self, route: &str);
}

/// Hooks for headless use: notices and navigation requests go to the log.
#[derive(Debug, Default)]
pub struct LoggingUiHooks;

impl UiHooks for LoggingUiHooks {
    fn notify(&self, notice: Notice) {
        warn!(notice = %notice, "User notice");
    }

    fn current_route(&self) -> Option<String> {
        None
    }

    fn navigate(&self, route: &str) {
        info!(route, "Navigation requested");
    }
}
