//! High-level API for the console's credentials.

use crate::{EncryptedScopedStore, ItemConfigs, WriteOutcome};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Roles that grant access to administrative routes.
pub const ADMIN_ROLES: [&str; 2] = ["admin", "SYSTEM_ADMIN"];

/// Identity of the signed-in user as returned by the backend.
///
/// Fields the console does not interpret are kept in `extra` and written
/// back unchanged. Known fields accept `null` and non-string scalars, which
/// older clients and some backend versions produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub username: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub display_name: String,
    #[serde(default, deserialize_with = "lenient_roles")]
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(scalar_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// A list of roles, a single role, or nothing.
fn lenient_roles<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_to_string).collect(),
        Value::Null => Vec::new(),
        single => scalar_to_string(single).into_iter().collect(),
    })
}

impl UserIdentity {
    /// Whether the identity carries an administrative role marker.
    pub fn is_admin(&self) -> bool {
        self.roles
            .iter()
            .any(|role| ADMIN_ROLES.contains(&role.as_str()))
    }
}

/// Access token and identity observed together.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub access_token: Option<String>,
    pub identity: Option<UserIdentity>,
}

impl SessionSnapshot {
    pub fn is_logged_in(&self) -> bool {
        self.access_token.is_some() && self.identity.is_some()
    }
}

/// Typed access to tokens, identity and preferences.
///
/// Session teardown and session snapshots take the same lock, so a reader
/// never sees tokens without identity (or the reverse) from a teardown in
/// progress.
pub struct CredentialManager {
    store: EncryptedScopedStore,
    session_lock: RwLock<()>,
}

impl CredentialManager {
    pub fn new(store: EncryptedScopedStore) -> Self {
        Self {
            store,
            session_lock: RwLock::new(()),
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &EncryptedScopedStore {
        &self.store
    }

    // ==========================================
    // Tokens
    // ==========================================

    /// Store a new token pair.
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str) -> WriteOutcome {
        let _guard = self.session_lock.write();
        let access = self.store.write(&ItemConfigs::ACCESS_TOKEN, &access_token);
        let refresh = self.store.write(&ItemConfigs::REFRESH_TOKEN, &refresh_token);
        access.and(refresh)
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.read(&ItemConfigs::ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.read(&ItemConfigs::REFRESH_TOKEN)
    }

    pub fn clear_tokens(&self) {
        let _guard = self.session_lock.write();
        self.clear_tokens_locked();
    }

    fn clear_tokens_locked(&self) {
        self.store.remove(&ItemConfigs::ACCESS_TOKEN);
        self.store.remove(&ItemConfigs::REFRESH_TOKEN);
    }

    /// Both tokens present and unexpired.
    pub fn has_valid_tokens(&self) -> bool {
        self.store.has_valid(&ItemConfigs::ACCESS_TOKEN)
            && self.store.has_valid(&ItemConfigs::REFRESH_TOKEN)
    }

    // ==========================================
    // Identity
    // ==========================================

    pub fn set_identity(&self, identity: &UserIdentity) -> WriteOutcome {
        let _guard = self.session_lock.write();
        self.store.write(&ItemConfigs::USER_INFO, identity)
    }

    pub fn identity(&self) -> Option<UserIdentity> {
        self.store.read(&ItemConfigs::USER_INFO)
    }

    pub fn clear_identity(&self) {
        let _guard = self.session_lock.write();
        self.store.remove(&ItemConfigs::USER_INFO);
    }

    // ==========================================
    // Session
    // ==========================================

    /// Remove tokens and identity as one step.
    pub fn destroy_session(&self) {
        let _guard = self.session_lock.write();
        self.clear_tokens_locked();
        self.store.remove(&ItemConfigs::USER_INFO);
        tracing::info!("Session destroyed");
    }

    /// Read access token and identity as one step.
    pub fn session_snapshot(&self) -> SessionSnapshot {
        let _guard = self.session_lock.read();
        SessionSnapshot {
            access_token: self.store.read(&ItemConfigs::ACCESS_TOKEN),
            identity: self.store.read(&ItemConfigs::USER_INFO),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.session_snapshot().is_logged_in()
    }

    // ==========================================
    // Preferences
    // ==========================================

    pub fn set_preferences(&self, preferences: &Value) -> WriteOutcome {
        self.store.write(&ItemConfigs::USER_PREFERENCES, preferences)
    }

    pub fn preferences(&self) -> Option<Value> {
        self.store.read(&ItemConfigs::USER_PREFERENCES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryBackend, Scope, StorageCipher};
    use serde_json::json;
    use std::sync::Arc;

    fn manager() -> CredentialManager {
        CredentialManager::new(EncryptedScopedStore::new(
            Box::new(MemoryBackend::new()),
            Box::new(MemoryBackend::new()),
            StorageCipher::from_secret("credentials-test").unwrap(),
        ))
    }

    fn alice() -> UserIdentity {
        UserIdentity {
            id: "u-1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            display_name: "Alice".to_string(),
            roles: vec!["user".to_string()],
            extra: Map::new(),
        }
    }

    #[test]
    fn test_tokens() {
        let manager = manager();
        assert!(!manager.has_valid_tokens());

        assert!(manager.set_tokens("access-1", "refresh-1").is_stored());
        assert_eq!(manager.access_token(), Some("access-1".to_string()));
        assert_eq!(manager.refresh_token(), Some("refresh-1".to_string()));
        assert!(manager.has_valid_tokens());

        manager.clear_tokens();
        assert_eq!(manager.access_token(), None);
        assert_eq!(manager.refresh_token(), None);
    }

    #[test]
    fn test_tokens_land_in_their_scopes() {
        let manager = manager();
        let _ = manager.set_tokens("a", "r");

        let store = manager.store();
        assert!(store.backend(Scope::Ephemeral).has("access_token").unwrap());
        assert!(store.backend(Scope::Durable).has("refresh_token").unwrap());
    }

    #[test]
    fn test_logged_in_requires_token_and_identity() {
        let manager = manager();

        let _ = manager.set_tokens("a", "r");
        assert!(!manager.is_logged_in());

        let _ = manager.set_identity(&alice());
        assert!(manager.is_logged_in());

        manager.clear_identity();
        assert!(!manager.is_logged_in());
    }

    #[test]
    fn test_destroy_session() {
        let manager = manager();
        let _ = manager.set_tokens("a", "r");
        let _ = manager.set_identity(&alice());
        let _ = manager.set_preferences(&json!({ "theme": "dark" }));

        manager.destroy_session();

        let snapshot = manager.session_snapshot();
        assert!(snapshot.access_token.is_none());
        assert!(snapshot.identity.is_none());
        assert!(manager.refresh_token().is_none());
        // Preferences survive a logout.
        assert_eq!(manager.preferences(), Some(json!({ "theme": "dark" })));
    }

    #[test]
    fn test_snapshot_never_half_destroyed() {
        let manager = Arc::new(manager());
        let _ = manager.set_tokens("a", "r");
        let _ = manager.set_identity(&alice());

        let reader = {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let snapshot = manager.session_snapshot();
                    assert_eq!(
                        snapshot.access_token.is_some(),
                        snapshot.identity.is_some(),
                        "observed a partially destroyed session"
                    );
                }
            })
        };

        for _ in 0..100 {
            manager.destroy_session();
            let _guard = manager.session_lock.write();
            let _ = manager.store.write(&ItemConfigs::ACCESS_TOKEN, &"a");
            let _ = manager.store.write(&ItemConfigs::USER_INFO, &alice());
        }

        reader.join().unwrap();
    }

    #[test]
    fn test_identity_preserves_unknown_fields() {
        let manager = manager();
        let identity: UserIdentity = serde_json::from_value(json!({
            "id": "u-2",
            "username": "bob",
            "roles": ["SYSTEM_ADMIN"],
            "organization_id": "org-9",
            "enable_otp": true
        }))
        .unwrap();

        let _ = manager.set_identity(&identity);
        let loaded = manager.identity().unwrap();

        assert_eq!(loaded.username, "bob");
        assert_eq!(loaded.email, "");
        assert_eq!(loaded.extra.get("organization_id"), Some(&json!("org-9")));
        assert_eq!(loaded.extra.get("enable_otp"), Some(&json!(true)));
        assert!(loaded.is_admin());
    }

    #[test]
    fn test_identity_tolerates_null_and_numeric_fields() {
        let identity: UserIdentity = serde_json::from_value(json!({
            "id": 42,
            "username": "carol",
            "email": null,
            "display_name": null,
            "roles": ["admin", null, 7]
        }))
        .unwrap();

        assert_eq!(identity.id, "42");
        assert_eq!(identity.username, "carol");
        assert_eq!(identity.email, "");
        assert_eq!(identity.roles, vec!["admin".to_string(), "7".to_string()]);
        assert!(identity.is_admin());
        assert!(identity.extra.is_empty());

        let single: UserIdentity =
            serde_json::from_value(json!({ "roles": "SYSTEM_ADMIN" })).unwrap();
        assert!(single.is_admin());

        let none: UserIdentity = serde_json::from_value(json!({ "roles": null })).unwrap();
        assert!(none.roles.is_empty());
    }

    #[test]
    fn test_is_admin() {
        let mut identity = alice();
        assert!(!identity.is_admin());

        identity.roles.push("admin".to_string());
        assert!(identity.is_admin());
    }
}
