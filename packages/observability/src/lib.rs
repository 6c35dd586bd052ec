//! # Observability
//!
//! Centralized `tracing` setup for the console session tools.
//!
//! Services call [`init`] or [`init_with_config`] once at startup and use the
//! standard `tracing` macros everywhere else. Two sinks are available:
//!
//! - a compact, human-readable layer on stderr
//! - an append-only JSONL file (one event per line) for `tail -f | jq`
//!
//! The filter comes from `RUST_LOG` when set, otherwise from
//! [`LogConfig::default_level`].
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "console-session".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

mod writer;

pub use writer::{CentralLogWriter, WriterFactory};

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, attached to the startup event of every sink.
    pub service_name: String,

    /// Default filter directive (e.g. "debug", "info,auth_engine=trace").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    /// JSONL log file. No file sink when `None`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize logging with default settings (stderr only).
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place.
pub fn init_with_config(config: LogConfig) {
    let file_layer = config.log_path.as_ref().and_then(|path| {
        match CentralLogWriter::new(path) {
            Ok(writer) => Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(WriterFactory::new(writer))
                    .with_filter(build_filter(&config.default_level)),
            ),
            Err(e) => {
                eprintln!("failed to open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(build_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            log_path = ?config.log_path,
            "observability initialized"
        );
    }
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros so services can use `observability::info!()`.
pub use tracing::{debug, error, info, instrument, trace, warn};

pub use tracing::Level;
