//! Encrypted scoped store.
//!
//! Wraps every value in an envelope carrying its write time and optional
//! expiry, obfuscates it when the item is configured as encrypted, and
//! routes it to the backend of its scope.
//!
//! Storage faults never reach the caller: reads degrade to `None`, writes
//! report [`WriteOutcome::Dropped`], and the cause is logged.

use crate::{ItemConfig, Scope, ScopeBackend, StorageCipher, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Result of a store write.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value is persisted.
    Stored,
    /// The value could not be persisted; the previous value (if any) is untouched.
    Dropped,
}

impl WriteOutcome {
    pub fn is_stored(self) -> bool {
        matches!(self, WriteOutcome::Stored)
    }

    /// `Stored` only when both outcomes are `Stored`.
    pub fn and(self, other: WriteOutcome) -> WriteOutcome {
        if self.is_stored() && other.is_stored() {
            WriteOutcome::Stored
        } else {
            WriteOutcome::Dropped
        }
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T: Serialize> {
    value: &'a T,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    value: T,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

/// Key/value store with per-item scope, obfuscation and expiry.
pub struct EncryptedScopedStore {
    ephemeral: Box<dyn ScopeBackend>,
    durable: Box<dyn ScopeBackend>,
    cipher: StorageCipher,
}

impl EncryptedScopedStore {
    /// Create a store over the two scope backends.
    pub fn new(
        ephemeral: Box<dyn ScopeBackend>,
        durable: Box<dyn ScopeBackend>,
        cipher: StorageCipher,
    ) -> Self {
        Self {
            ephemeral,
            durable,
            cipher,
        }
    }

    /// Raw backend of a scope, bypassing envelopes and obfuscation.
    pub fn backend(&self, scope: Scope) -> &dyn ScopeBackend {
        match scope {
            Scope::Ephemeral => self.ephemeral.as_ref(),
            Scope::Durable => self.durable.as_ref(),
        }
    }

    /// Persist `value` under `config`.
    pub fn write<T: Serialize>(&self, config: &ItemConfig, value: &T) -> WriteOutcome {
        match self.try_write(config, value) {
            Ok(()) => {
                debug!(key = config.key, scope = ?config.scope, "stored item");
                WriteOutcome::Stored
            }
            Err(e) => {
                warn!(key = config.key, scope = ?config.scope, error = %e, "failed to store item");
                WriteOutcome::Dropped
            }
        }
    }

    fn try_write<T: Serialize>(&self, config: &ItemConfig, value: &T) -> StorageResult<()> {
        let now = Utc::now();
        let expires_at = match config.ttl {
            Some(ttl) => Some(
                now + chrono::Duration::from_std(ttl)
                    .map_err(|e| StorageError::Encoding(format!("ttl out of range: {}", e)))?,
            ),
            None => None,
        };

        let mut text = serde_json::to_string(&EnvelopeRef {
            value,
            created_at: now,
            expires_at,
        })
        .map_err(|e| StorageError::Encoding(e.to_string()))?;

        if config.encrypted {
            text = self.cipher.seal(&text)?;
        }

        self.backend(config.scope).set(config.key, &text)
    }

    /// Load the value under `config`. Missing, unreadable and expired items
    /// are all `None`; expired items are deleted on the way.
    pub fn read<T: DeserializeOwned>(&self, config: &ItemConfig) -> Option<T> {
        let envelope = match self.load_envelope::<T>(config) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = config.key, scope = ?config.scope, error = %e, "unreadable item treated as absent");
                return None;
            }
        };

        if let Some(expires_at) = envelope.expires_at {
            if Utc::now() > expires_at {
                debug!(key = config.key, %expires_at, "item expired, removing");
                self.remove(config);
                return None;
            }
        }

        Some(envelope.value)
    }

    fn load_envelope<T: DeserializeOwned>(
        &self,
        config: &ItemConfig,
    ) -> StorageResult<Option<Envelope<T>>> {
        let raw = match self.backend(config.scope).get(config.key)? {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(None),
        };

        let text = if config.encrypted {
            self.cipher.open(&raw)?
        } else {
            raw
        };

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| StorageError::Encoding(e.to_string()))
    }

    /// Delete the item under `config`. Idempotent.
    pub fn remove(&self, config: &ItemConfig) {
        if let Err(e) = self.backend(config.scope).delete(config.key) {
            warn!(key = config.key, scope = ?config.scope, error = %e, "failed to remove item");
        }
    }

    /// Delete every item of a scope.
    pub fn clear_scope(&self, scope: Scope) {
        match self.backend(scope).clear() {
            Ok(()) => debug!(?scope, "cleared scope"),
            Err(e) => warn!(?scope, error = %e, "failed to clear scope"),
        }
    }

    /// Whether the item exists and has not expired.
    pub fn has_valid(&self, config: &ItemConfig) -> bool {
        self.read::<serde_json::Value>(config).is_some()
    }

    /// Whether the raw value under `config.key` is an envelope written by this
    /// store for `config` (decrypts and parses), regardless of expiry.
    pub fn is_protected(&self, config: &ItemConfig) -> bool {
        matches!(
            self.load_envelope::<serde_json::Value>(config),
            Ok(Some(_))
        )
    }
}
