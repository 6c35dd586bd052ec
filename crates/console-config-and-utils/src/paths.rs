//! File system paths for the console session tools.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Name of the base directory under the user's home.
const BASE_DIR_NAME: &str = ".eiam-console";

/// Manages file system paths.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.eiam-console)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.eiam-console`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (<base>/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Directory holding durable storage.
    pub fn storage_dir(&self) -> PathBuf {
        self.base_dir.join("storage")
    }

    /// File backing the durable storage scope (<base>/storage/durable.json).
    pub fn durable_storage_file(&self) -> PathBuf {
        self.storage_dir().join("durable.json")
    }

    /// Get the logs directory (<base>/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (<base>/logs/console.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("console.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.storage_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
