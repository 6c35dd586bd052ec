//! Configuration management for the console session tools.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default API base URL (can be overridden at compile time via CONSOLE_API_BASE_URL).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("CONSOLE_API_BASE_URL") {
    Some(url) => url,
    None => "http://localhost:8080/api/v1",
};

/// Application-wide storage secret (compile-time only, via CONSOLE_STORAGE_KEY).
///
/// Shared by every install. It keys the storage obfuscation, it is not a
/// per-user secret.
pub const STORAGE_SECRET: &str = match option_env!("CONSOLE_STORAGE_KEY") {
    Some(key) => key,
    None => "eiam-platform-2024",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Unauthenticated entry route.
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// Landing route for administrators.
pub const DEFAULT_CONSOLE_ROUTE: &str = "/console";

/// Landing route for regular users.
pub const DEFAULT_PORTAL_ROUTE: &str = "/portal";

/// Console session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Base URL every API path is resolved against.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_login_route")]
    pub login_route: String,
    #[serde(default = "default_console_route")]
    pub console_route: String,
    #[serde(default = "default_portal_route")]
    pub portal_route: String,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_login_route() -> String {
    DEFAULT_LOGIN_ROUTE.to_string()
}

fn default_console_route() -> String {
    DEFAULT_CONSOLE_ROUTE.to_string()
}

fn default_portal_route() -> String {
    DEFAULT_PORTAL_ROUTE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_base_url: default_api_base_url(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            login_route: default_login_route(),
            console_route: default_console_route(),
            portal_route: default_portal_route(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("CONSOLE_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(base_url) = std::env::var("CONSOLE_API_BASE_URL") {
            if !base_url.trim().is_empty() {
                self.api_base_url = base_url.trim().to_string();
            }
        }
    }

    fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        if self.request_timeout_ms == 0 {
            return Err(CoreError::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if !self.login_route.starts_with('/') {
            return Err(CoreError::Config(format!(
                "login_route must be an absolute route, got {:?}",
                self.login_route
            )));
        }
        Ok(())
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// Get the per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.login_route, "/login");
        assert_eq!(config.console_route, "/console");
        assert_eq!(config.portal_route, "/portal");
    }

    #[test]
    fn test_config_load_from_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(&config_path, r#"{ "log_level": "debug" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.request_timeout_ms = 2_500;
        config.portal_route = "/me".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.request_timeout_ms, 2_500);
        assert_eq!(loaded.portal_route, "/me");
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.login_route, DEFAULT_LOGIN_ROUTE);
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.request_timeout_ms = 0;
        config.save(&paths).unwrap();

        assert!(matches!(Config::load(&paths), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.api_base_url = "not a valid url".to_string();

        assert!(config.api_base_url().is_err());
    }

    #[test]
    fn test_storage_secret_is_set() {
        assert!(!STORAGE_SECRET.is_empty());
    }
}
