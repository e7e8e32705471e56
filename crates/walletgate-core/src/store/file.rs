use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::SessionStore;

/// Application name used for the default data directory
const APP_NAME: &str = "walletgate";

/// Stores each key as `<dir>/<key>.json`.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Store rooted at the platform data directory.
    pub fn in_data_dir() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Self::new(data_dir.join(APP_NAME))
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn item_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            bail!("Invalid store key: {:?}", key);
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        let path = self.item_path(key)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read store file: {}", key))
            }
        };

        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse store file: {}", key))?;
        Ok(Some(value))
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<()> {
        let path = self.item_path(key)?;
        let contents = serde_json::to_string_pretty(&value)?;

        // Write then rename so a crash never leaves a half-written file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write store file: {}", key))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace store file: {}", key))?;
        debug!(key, "Stored item");
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.item_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove store file: {}", key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Organization;
    use crate::store::{keys, SessionStoreExt};

    fn test_store() -> (tempfile::TempDir, FileSessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("store")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_missing_key_reads_as_none() {
        let (_dir, store) = test_store();
        assert!(store.get_item(keys::PIN_HASH).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let (dir, store) = test_store();
        let org: Organization =
            serde_json::from_str(r#"{"id": "1", "name": "Acme Pay"}"#).unwrap();
        store.save_organization(&org).await.unwrap();
        store.save_wallet_balance(42.5).await.unwrap();
        drop(store);

        let reopened = FileSessionStore::new(dir.path().join("store")).unwrap();
        let cached = reopened.load_organization().await.unwrap().unwrap();
        assert_eq!(cached.data, org);
        assert_eq!(reopened.load_wallet_balance().await.unwrap(), Some(42.5));
    }

    #[tokio::test]
    async fn test_remove_item() {
        let (_dir, store) = test_store();
        store.set_item(keys::PIN_ENABLED, Value::Bool(true)).await.unwrap();
        store.remove_item(keys::PIN_ENABLED).await.unwrap();
        assert!(store.get_item(keys::PIN_ENABLED).await.unwrap().is_none());

        // Second removal is a no-op
        store.remove_item(keys::PIN_ENABLED).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let (_dir, store) = test_store();
        assert!(store.get_item("../escape").await.is_err());
        assert!(store.set_item("", Value::Null).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let (_dir, store) = test_store();
        std::fs::write(store.dir().join("wallet_balance.json"), "{not json").unwrap();
        assert!(store.get_item(keys::WALLET_BALANCE).await.is_err());
    }
}
