//! Logging initialization.
//!
//! Thin wrapper over the observability package so every console entry point
//! configures tracing the same way: compact stderr output plus a JSONL file
//! under `<base>/logs/console.jsonl`.

use crate::Paths;
use observability::LogConfig;

/// Initialize the logging system.
///
/// * `level` - Default filter (trace, debug, info, warn, error); `RUST_LOG` wins.
/// * `paths` - When given, events are also appended to the JSONL log file.
///
/// ```ignore
/// init_logging("info", Some(&paths));
/// tracing::info!("console session started");
/// ```
pub fn init_logging(level: &str, paths: Option<&Paths>) {
    let log_path = paths.map(Paths::log_file);

    observability::init_with_config(LogConfig {
        service_name: "console-session".into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        log_path,
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
