//! Durable key-value persistence for session state.
//!
//! This module provides the `SessionStore` boundary the session manager
//! writes through, plus two implementations:
//! - `FileSessionStore`: one JSON file per key, survives restarts
//! - `MemorySessionStore`: process-local, used by tests and ephemeral hosts
//!
//! Organization and settings are wrapped in `CachedData` so callers can
//! tell how old the tenant configuration is.

pub mod cached;
pub mod file;
pub mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::models::{AppSettings, Organization};

pub use cached::CachedData;
pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

/// Keys written by the session manager. No other component writes them.
pub mod keys {
    pub const ORGANIZATION: &str = "organization";
    pub const APP_SETTINGS: &str = "app_settings";
    pub const WALLET_BALANCE: &str = "wallet_balance";
    pub const STORED_CREDENTIALS: &str = "stored_credentials";
    pub const PIN_HASH: &str = "pin_hash";
    pub const PIN_ENABLED: &str = "pin_enabled";
    pub const PIN_FAILURES: &str = "pin_failures";

    /// Keys holding the authenticated user's data. The profile itself is
    /// never persisted; a relaunch re-fetches it with the held token.
    pub const SESSION_KEYS: [&str; 1] = [WALLET_BALANCE];

    /// Keys backing the PIN-unlock shortcut.
    pub const PIN_KEYS: [&str; 4] = [STORED_CREDENTIALS, PIN_HASH, PIN_ENABLED, PIN_FAILURES];
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<Value>>;

    async fn set_item(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a key. Removing a key that does not exist is not an error.
    async fn remove_item(&self, key: &str) -> Result<()>;
}

/// Typed accessors available on every store.
#[async_trait]
pub trait SessionStoreExt: SessionStore {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get_item(key).await? {
            Some(value) => {
                let parsed = serde_json::from_value(value)
                    .with_context(|| format!("Failed to parse stored value: {}", key))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .with_context(|| format!("Failed to serialize value: {}", key))?;
        self.set_item(key, value).await
    }

    // ===== Organization =====

    async fn load_organization(&self) -> Result<Option<CachedData<Organization>>> {
        self.get(keys::ORGANIZATION).await
    }

    async fn save_organization(&self, organization: &Organization) -> Result<()> {
        self.set(keys::ORGANIZATION, &CachedData::new(organization)).await
    }

    // ===== App Settings =====

    async fn load_app_settings(&self) -> Result<Option<CachedData<AppSettings>>> {
        self.get(keys::APP_SETTINGS).await
    }

    async fn save_app_settings(&self, settings: &AppSettings) -> Result<()> {
        self.set(keys::APP_SETTINGS, &CachedData::new(settings)).await
    }

    // ===== Wallet Balance =====

    async fn load_wallet_balance(&self) -> Result<Option<f64>> {
        self.get(keys::WALLET_BALANCE).await
    }

    async fn save_wallet_balance(&self, balance: f64) -> Result<()> {
        self.set(keys::WALLET_BALANCE, &balance).await
    }
}

impl<S: SessionStore + ?Sized> SessionStoreExt for S {}
