//! CLI command implementations.

mod api;
mod auth;
mod storage;

pub use api::request;
pub use auth::{login, logout, refresh, status, whoami};
pub use storage::{check_route, migrate};
