//! Startup wiring shared by every command.

use crate::output::{self, OutputFormat};
use anyhow::{Context as _, Result};
use auth_engine::{ConsoleSession, Notice, UiHooks};
use console_config_and_utils::{Config, Paths, STORAGE_SECRET};
use parking_lot::Mutex;
use secure_scoped_storage::{create_credential_manager, init_storage_migration, MigrationOutcome};
use std::sync::Arc;
use tracing::{info, warn};

/// Terminal stand-in for the console UI: notices go to stderr and the
/// "current route" is whatever the last navigation asked for.
pub struct TerminalHooks {
    format: OutputFormat,
    login_route: String,
    route: Mutex<Option<String>>,
}

impl TerminalHooks {
    pub fn new(format: OutputFormat, login_route: impl Into<String>) -> Self {
        Self {
            format,
            login_route: login_route.into(),
            route: Mutex::new(None),
        }
    }
}

impl UiHooks for TerminalHooks {
    fn notify(&self, notice: Notice) {
        output::print_error(&notice.to_string(), &self.format);
    }

    fn current_route(&self) -> Option<String> {
        self.route.lock().clone()
    }

    fn navigate(&self, route: &str) {
        info!(route, "Navigation requested");
        *self.route.lock() = Some(route.to_string());
        if route == self.login_route {
            output::print_error(
                "Session ended. Run 'console-session login' to sign in again",
                &self.format,
            );
        }
    }
}

/// Everything a command needs.
pub struct ConsoleContext {
    pub paths: Paths,
    pub config: Config,
    pub session: ConsoleSession,
    pub migration: MigrationOutcome,
}

impl ConsoleContext {
    /// Open storage, run the legacy migration, then build the session.
    ///
    /// Migration runs before any credential is read.
    pub fn open(paths: Paths, config: Config, format: OutputFormat) -> Result<Self> {
        let credentials = create_credential_manager(&paths.durable_storage_file(), STORAGE_SECRET)
            .context("failed to open credential storage")?;

        let migration = init_storage_migration(&credentials);
        if let MigrationOutcome::Failed(reason) = &migration {
            warn!(%reason, "Legacy storage migration failed, will retry on next start");
        }

        let hooks = Arc::new(TerminalHooks::new(format, config.login_route.clone()));
        let session = ConsoleSession::from_config(&config, Arc::new(credentials), hooks)
            .context("failed to set up the API client")?;

        Ok(Self {
            paths,
            config,
            session,
            migration,
        })
    }
}
