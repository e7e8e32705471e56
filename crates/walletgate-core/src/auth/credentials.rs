use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::cipher::CredentialCipher;
use super::pin::PinHasher;
use crate::store::{keys, SessionStore, SessionStoreExt};

/// Stored credentials expire 30 days after PIN setup.
pub const CREDENTIAL_TTL_DAYS: i64 = 30;

/// Credentials cached for PIN unlock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    pub username: String,
    pub encrypted_password: String,
    /// Creation time in epoch milliseconds
    pub timestamp: i64,
}

impl StoredCredentials {
    pub fn new(username: impl Into<String>, encrypted_password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            encrypted_password: encrypted_password.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// An unreadable timestamp counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.created_at() {
            Some(created) => now - created > ttl,
            None => true,
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(Utc::now(), ttl)
    }

    /// Days left before expiry (for display)
    pub fn days_until_expiry(&self, ttl: Duration) -> i64 {
        match self.created_at() {
            Some(created) => (created + ttl - Utc::now()).num_days().max(0),
            None => 0,
        }
    }
}

/// PIN-unlock persistence: encrypted credentials, PIN hash and the enabled flag.
pub struct CredentialVault {
    store: Arc<dyn SessionStore>,
    cipher: CredentialCipher,
    ttl: Duration,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn SessionStore>, cipher: CredentialCipher, ttl: Duration) -> Self {
        Self { store, cipher, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Load stored credentials. Expired or unreadable records are purged
    /// and reported as absent.
    pub async fn lookup(&self) -> Result<Option<StoredCredentials>> {
        match self.store.get::<StoredCredentials>(keys::STORED_CREDENTIALS).await {
            Ok(Some(credentials)) if credentials.is_expired(self.ttl) => {
                info!(username = %credentials.username, "Stored credentials expired, purging");
                self.purge_credentials().await?;
                Ok(None)
            }
            Ok(found) => Ok(found),
            Err(e) => {
                warn!(error = %e, "Stored credentials unreadable, purging");
                self.purge_credentials().await?;
                Ok(None)
            }
        }
    }

    pub async fn has_credentials(&self) -> Result<bool> {
        Ok(self.lookup().await?.is_some())
    }

    async fn purge_credentials(&self) -> Result<()> {
        self.store
            .remove_item(keys::STORED_CREDENTIALS)
            .await
            .context("Failed to purge stored credentials")
    }

    /// Encrypt and persist credentials for later PIN unlock.
    pub async fn save(&self, username: &str, password: &str) -> Result<StoredCredentials> {
        let encrypted = self.cipher.encrypt(password)?;
        let credentials = StoredCredentials::new(username, encrypted);
        self.store
            .set(keys::STORED_CREDENTIALS, &credentials)
            .await
            .context("Failed to save stored credentials")?;
        debug!(username, "Stored credentials for PIN unlock");
        Ok(credentials)
    }

    /// Decrypt the password of a stored record.
    pub fn reveal(&self, credentials: &StoredCredentials) -> Result<String> {
        self.cipher.decrypt(&credentials.encrypted_password)
    }

    /// Hash the PIN and mark PIN login enabled.
    pub async fn enable_pin(&self, pin: &str) -> Result<()> {
        let hash = PinHasher::hash(pin)?;
        self.store
            .set_item(keys::PIN_HASH, Value::String(hash))
            .await
            .context("Failed to save PIN hash")?;
        self.store
            .set_item(keys::PIN_ENABLED, Value::Bool(true))
            .await
            .context("Failed to save PIN flag")?;
        self.reset_pin_failures().await
    }

    pub async fn verify_pin(&self, pin: &str) -> Result<bool> {
        let hash: Option<String> = self.store.get(keys::PIN_HASH).await?;
        Ok(hash.map(|h| PinHasher::verify(pin, &h)).unwrap_or(false))
    }

    /// Count a wrong PIN. The count is persisted so restarting the app
    /// does not grant fresh attempts. Returns the new count.
    pub async fn record_pin_failure(&self) -> Result<u32> {
        let failures = self.store.get::<u32>(keys::PIN_FAILURES).await?.unwrap_or(0);
        let failures = failures.saturating_add(1);
        self.store
            .set(keys::PIN_FAILURES, &failures)
            .await
            .context("Failed to save PIN failure count")?;
        Ok(failures)
    }

    pub async fn reset_pin_failures(&self) -> Result<()> {
        self.store
            .remove_item(keys::PIN_FAILURES)
            .await
            .context("Failed to reset PIN failure count")
    }

    /// PIN login is enabled when the flag is set and a hash exists.
    pub async fn pin_enabled(&self) -> Result<bool> {
        let enabled: Option<bool> = self.store.get(keys::PIN_ENABLED).await?;
        if !enabled.unwrap_or(false) {
            return Ok(false);
        }
        Ok(self.store.get_item(keys::PIN_HASH).await?.is_some())
    }

    /// Remove every PIN-related record. Each removal is attempted even if
    /// an earlier one fails; returns how many failed.
    pub async fn clear_all(&self) -> usize {
        let mut failures = 0;
        for key in keys::PIN_KEYS {
            if let Err(e) = self.store.remove_item(key).await {
                warn!(key, error = %e, "Failed to remove PIN record");
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;

    fn vault(store: Arc<MemorySessionStore>) -> CredentialVault {
        CredentialVault::new(
            store,
            CredentialCipher::ephemeral(),
            Duration::days(CREDENTIAL_TTL_DAYS),
        )
    }

    #[test]
    fn test_expiry() {
        let ttl = Duration::days(CREDENTIAL_TTL_DAYS);
        let mut credentials = StoredCredentials::new("ada", "sealed");
        assert!(!credentials.is_expired(ttl));
        assert!(credentials.days_until_expiry(ttl) >= 29);

        credentials.timestamp = (Utc::now() - Duration::days(31)).timestamp_millis();
        assert!(credentials.is_expired(ttl));
        assert_eq!(credentials.days_until_expiry(ttl), 0);
    }

    #[test]
    fn test_invalid_timestamp_is_expired() {
        let mut credentials = StoredCredentials::new("ada", "sealed");
        credentials.timestamp = i64::MAX;
        assert!(credentials.is_expired(Duration::days(CREDENTIAL_TTL_DAYS)));
    }

    #[tokio::test]
    async fn test_save_lookup_reveal() {
        let store = Arc::new(MemorySessionStore::new());
        let vault = vault(store.clone());

        let saved = vault.save("ada", "hunter2").await.unwrap();
        assert_ne!(saved.encrypted_password, "hunter2");

        let found = vault.lookup().await.unwrap().unwrap();
        assert_eq!(found.username, "ada");
        assert_eq!(vault.reveal(&found).unwrap(), "hunter2");
    }

    #[tokio::test]
    async fn test_lookup_purges_expired_record() {
        let store = Arc::new(MemorySessionStore::new());
        let vault = vault(store.clone());

        let mut old = StoredCredentials::new("ada", "sealed");
        old.timestamp = (Utc::now() - Duration::days(31)).timestamp_millis();
        store.set(keys::STORED_CREDENTIALS, &old).await.unwrap();

        assert!(vault.lookup().await.unwrap().is_none());
        assert!(!store.contains(keys::STORED_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_lookup_purges_unreadable_record() {
        let store = Arc::new(MemorySessionStore::new());
        let vault = vault(store.clone());
        store
            .set_item(keys::STORED_CREDENTIALS, Value::from(12))
            .await
            .unwrap();

        assert!(!vault.has_credentials().await.unwrap());
        assert!(!store.contains(keys::STORED_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_pin_lifecycle() {
        let store = Arc::new(MemorySessionStore::new());
        let vault = vault(store.clone());
        assert!(!vault.pin_enabled().await.unwrap());
        assert!(!vault.verify_pin("1234").await.unwrap());

        vault.enable_pin("1234").await.unwrap();
        assert!(vault.pin_enabled().await.unwrap());
        assert!(vault.verify_pin("1234").await.unwrap());
        assert!(!vault.verify_pin("9999").await.unwrap());

        vault.save("ada", "hunter2").await.unwrap();
        vault.record_pin_failure().await.unwrap();
        assert_eq!(vault.clear_all().await, 0);
        for key in keys::PIN_KEYS {
            assert!(!store.contains(key), "{} should be removed", key);
        }
        assert!(!vault.pin_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_pin_failures_survive_new_vault() {
        let store = Arc::new(MemorySessionStore::new());
        let first = vault(store.clone());
        assert_eq!(first.record_pin_failure().await.unwrap(), 1);
        assert_eq!(first.record_pin_failure().await.unwrap(), 2);

        let second = vault(store.clone());
        assert_eq!(second.record_pin_failure().await.unwrap(), 3);

        second.enable_pin("1234").await.unwrap();
        assert!(!store.contains(keys::PIN_FAILURES));
        assert_eq!(second.record_pin_failure().await.unwrap(), 1);
    }
}
