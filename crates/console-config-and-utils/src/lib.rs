//! Configuration, paths, errors and logging setup shared by the console crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_CONSOLE_ROUTE, DEFAULT_LOGIN_ROUTE, DEFAULT_LOG_LEVEL,
    DEFAULT_PORTAL_ROUTE, DEFAULT_REQUEST_TIMEOUT_MS, STORAGE_SECRET,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
