//! One-time migration of plaintext credentials left by older console builds.
//!
//! Older builds kept `access_token`, `refresh_token` and the identity as
//! raw strings in durable storage. The migration moves them into the
//! credential layout, deletes the plaintext copies and records a durable
//! completion marker. It only counts a value as legacy when the store cannot
//! read it as one of its own protected items, so a refresh token written by
//! the current layout under the same key is never mistaken for legacy data.

use crate::{CredentialManager, ItemConfigs, Scope, StorageKeys, UserIdentity, WriteOutcome};
use chrono::Utc;
use tracing::{debug, error, info, warn};

/// Persisted migration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Done,
}

/// Result of one migration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Marker present or no legacy data found.
    NotNeeded,
    /// Legacy data moved and cleaned up.
    Migrated { tokens: bool, identity: bool },
    /// Nothing was deleted and no marker was written; the next start retries.
    Failed(String),
}

/// Migration driver over a credential manager.
pub struct LegacyMigration<'a> {
    credentials: &'a CredentialManager,
}

impl<'a> LegacyMigration<'a> {
    pub fn new(credentials: &'a CredentialManager) -> Self {
        Self { credentials }
    }

    /// Marker-derived state.
    pub fn state(&self) -> MigrationState {
        match self.durable_raw(StorageKeys::MIGRATION_MARKER) {
            Some(_) => MigrationState::Done,
            None => MigrationState::Pending,
        }
    }

    /// Marker absent and a legacy token present. Does not modify storage.
    pub fn needs_migration(&self) -> bool {
        if self.state() == MigrationState::Done {
            return false;
        }

        self.legacy_value(StorageKeys::ACCESS_TOKEN).is_some()
            || self.legacy_value(StorageKeys::REFRESH_TOKEN).is_some()
    }

    /// Migrate if needed.
    pub fn migrate(&self) -> MigrationOutcome {
        if !self.needs_migration() {
            return MigrationOutcome::NotNeeded;
        }

        info!("Migrating legacy credential storage");

        let tokens = match self.migrate_tokens() {
            Ok(migrated) => migrated,
            Err(reason) => return self.fail(reason),
        };

        let identity = match self.migrate_identity() {
            Ok(migrated) => migrated,
            Err(reason) => return self.fail(reason),
        };

        self.cleanup_legacy_data();

        let marker = Utc::now().to_rfc3339();
        if let Err(e) = self
            .credentials
            .store()
            .backend(Scope::Durable)
            .set(StorageKeys::MIGRATION_MARKER, &marker)
        {
            return self.fail(format!("failed to write migration marker: {}", e));
        }

        info!(tokens, identity, "Legacy credential storage migrated");
        MigrationOutcome::Migrated { tokens, identity }
    }

    /// Drop the marker and migrate again.
    pub fn force_migrate(&self) -> MigrationOutcome {
        if let Err(e) = self
            .credentials
            .store()
            .backend(Scope::Durable)
            .delete(StorageKeys::MIGRATION_MARKER)
        {
            return self.fail(format!("failed to remove migration marker: {}", e));
        }
        self.migrate()
    }

    fn migrate_tokens(&self) -> Result<bool, String> {
        let access = self.legacy_value(StorageKeys::ACCESS_TOKEN);
        let refresh = self.legacy_value(StorageKeys::REFRESH_TOKEN);

        match (access, refresh) {
            (Some(access), Some(refresh)) => {
                debug!("Migrating legacy token pair");
                match self.credentials.set_tokens(&access, &refresh) {
                    WriteOutcome::Stored => Ok(true),
                    WriteOutcome::Dropped => Err("token pair could not be stored".to_string()),
                }
            }
            _ => {
                debug!("Incomplete legacy token pair, not migrating tokens");
                Ok(false)
            }
        }
    }

    fn migrate_identity(&self) -> Result<bool, String> {
        for key in StorageKeys::LEGACY_IDENTITY_ALIASES {
            let Some(raw) = self.legacy_value(key) else {
                continue;
            };

            let identity = match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value @ serde_json::Value::Object(_)) => {
                    match serde_json::from_value::<UserIdentity>(value) {
                        Ok(identity) => identity,
                        Err(e) => {
                            warn!(key, error = %e, "Skipping unreadable legacy identity");
                            continue;
                        }
                    }
                }
                Ok(_) => {
                    warn!(key, "Skipping legacy identity that is not an object");
                    continue;
                }
                Err(e) => {
                    warn!(key, error = %e, "Skipping unparsable legacy identity");
                    continue;
                }
            };

            debug!(key, "Migrating legacy identity");
            return match self.credentials.set_identity(&identity) {
                WriteOutcome::Stored => Ok(true),
                WriteOutcome::Dropped => Err("identity could not be stored".to_string()),
            };
        }

        Ok(false)
    }

    fn cleanup_legacy_data(&self) {
        let backend = self.credentials.store().backend(Scope::Durable);
        let keys = [StorageKeys::ACCESS_TOKEN, StorageKeys::REFRESH_TOKEN]
            .into_iter()
            .chain(StorageKeys::LEGACY_IDENTITY_ALIASES);

        for key in keys {
            if self.legacy_value(key).is_none() {
                continue;
            }
            if let Err(e) = backend.delete(key) {
                warn!(key, error = %e, "Failed to delete legacy value");
            }
        }
    }

    /// Raw durable value under `key` that the current layout does not own.
    fn legacy_value(&self, key: &str) -> Option<String> {
        let raw = self.durable_raw(key)?;

        if key == ItemConfigs::REFRESH_TOKEN.key
            && self.credentials.store().is_protected(&ItemConfigs::REFRESH_TOKEN)
        {
            return None;
        }

        Some(raw)
    }

    fn durable_raw(&self, key: &str) -> Option<String> {
        match self.credentials.store().backend(Scope::Durable).get(key) {
            Ok(Some(raw)) if !raw.is_empty() => Some(raw),
            Ok(_) => None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read durable storage during migration");
                None
            }
        }
    }

    fn fail(&self, reason: String) -> MigrationOutcome {
        error!(%reason, "Legacy credential migration failed, will retry on next start");
        MigrationOutcome::Failed(reason)
    }
}

/// Startup entry point: migrate if needed. Never fails; the outcome is logged
/// and returned for callers that want to report it.
pub fn init_storage_migration(credentials: &CredentialManager) -> MigrationOutcome {
    let migration = LegacyMigration::new(credentials);
    let outcome = migration.migrate();
    if outcome == MigrationOutcome::NotNeeded {
        debug!("No legacy credential storage to migrate");
    }
    outcome
}
