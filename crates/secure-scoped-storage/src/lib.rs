//! Scoped credential storage for the console.
//!
//! Items live in one of two scopes: **ephemeral** (in-process, gone when
//! the process exits) and **durable** (a JSON file that survives restarts).
//! Each logical item has a fixed [`ItemConfig`] naming its scope, whether
//! it is obfuscated at rest, and its lifetime.
//!
//! Storage faults stay inside this crate: reads degrade to absent and
//! writes report [`WriteOutcome::Dropped`].

mod cipher;
mod credentials;
mod file;
mod keys;
mod memory;
mod migration;
mod store;
mod traits;

pub use cipher::{StorageCipher, KEY_SIZE, NONCE_SIZE};
pub use credentials::{CredentialManager, SessionSnapshot, UserIdentity, ADMIN_ROLES};
pub use file::FileBackend;
pub use keys::{ItemConfig, ItemConfigs, Scope, StorageKeys};
pub use memory::MemoryBackend;
pub use migration::{init_storage_migration, LegacyMigration, MigrationOutcome, MigrationState};
pub use store::{EncryptedScopedStore, WriteOutcome};
pub use traits::ScopeBackend;

use std::path::Path;
use thiserror::Error;

/// Error type for backend operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The write would exceed the backend's capacity
    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a store with an in-memory ephemeral scope and a durable scope
/// persisted at `durable_path`.
pub fn create_store(durable_path: &Path, secret: &str) -> StorageResult<EncryptedScopedStore> {
    Ok(EncryptedScopedStore::new(
        Box::new(MemoryBackend::new()),
        Box::new(FileBackend::new(durable_path)),
        StorageCipher::from_secret(secret)?,
    ))
}

/// Create a CredentialManager over the default store layout.
pub fn create_credential_manager(
    durable_path: &Path,
    secret: &str,
) -> StorageResult<CredentialManager> {
    Ok(CredentialManager::new(create_store(durable_path, secret)?))
}
