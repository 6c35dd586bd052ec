//! Storage keys and the fixed per-item configuration table.

use std::time::Duration;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Storage lifetime class of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Lives as long as the current process.
    Ephemeral,
    /// Survives restarts.
    Durable,
}

/// How one logical item is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemConfig {
    pub key: &'static str,
    pub scope: Scope,
    pub encrypted: bool,
    /// Lifetime from the moment of write; `None` never expires.
    pub ttl: Option<Duration>,
}

impl ItemConfig {
    /// Copy of this config with a different lifetime.
    pub const fn with_ttl(self, ttl: Option<Duration>) -> Self {
        Self { ttl, ..self }
    }
}

/// Storage keys used by the console
pub struct StorageKeys;

impl StorageKeys {
    /// Short-lived bearer token
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Long-lived token exchanged for a new pair
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Cached identity of the signed-in user (JSON)
    pub const USER_INFO: &'static str = "user_info";

    /// UI preferences (JSON)
    pub const USER_PREFERENCES: &'static str = "user_preferences";

    /// Completion timestamp of the legacy storage migration
    pub const MIGRATION_MARKER: &'static str = "storage_migration_completed";

    /// Identity keys written by older console builds, in lookup order
    pub const LEGACY_IDENTITY_ALIASES: [&'static str; 3] = ["user_info", "current_user", "user_data"];
}

/// The credential configuration table.
pub struct ItemConfigs;

impl ItemConfigs {
    pub const ACCESS_TOKEN: ItemConfig = ItemConfig {
        key: StorageKeys::ACCESS_TOKEN,
        scope: Scope::Ephemeral,
        encrypted: true,
        ttl: Some(Duration::from_secs(DAY)),
    };

    pub const REFRESH_TOKEN: ItemConfig = ItemConfig {
        key: StorageKeys::REFRESH_TOKEN,
        scope: Scope::Durable,
        encrypted: true,
        ttl: Some(Duration::from_secs(7 * DAY)),
    };

    pub const USER_INFO: ItemConfig = ItemConfig {
        key: StorageKeys::USER_INFO,
        scope: Scope::Ephemeral,
        encrypted: false,
        ttl: None,
    };

    pub const USER_PREFERENCES: ItemConfig = ItemConfig {
        key: StorageKeys::USER_PREFERENCES,
        scope: Scope::Durable,
        encrypted: false,
        ttl: None,
    };
}
