use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use keyring::Entry;
use tracing::info;

use super::cipher::{generate_key, KEY_LEN};

const SERVICE_NAME: &str = "walletgate";

/// Keychain account holding the credential encryption key
const DEVICE_KEY_ACCOUNT: &str = "device-key";

/// Keychain account holding the bearer token
const TOKEN_ACCOUNT: &str = "auth-token";

/// OS keychain access for the secrets that must never touch the data directory.
#[derive(Debug, Clone)]
pub struct Keychain {
    service: String,
}

impl Default for Keychain {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl Keychain {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> Result<Entry> {
        Entry::new(&self.service, account).context("Failed to create keyring entry")
    }

    /// Load the device key, generating and storing one on first use.
    pub fn load_or_create_device_key(&self) -> Result<[u8; KEY_LEN]> {
        let entry = self.entry(DEVICE_KEY_ACCOUNT)?;
        match entry.get_password() {
            Ok(encoded) => {
                let bytes = STANDARD
                    .decode(encoded.trim())
                    .context("Device key in keychain is not valid base64")?;
                if bytes.len() != KEY_LEN {
                    bail!("Device key in keychain has the wrong length");
                }
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&bytes);
                Ok(key)
            }
            Err(keyring::Error::NoEntry) => {
                let key = generate_key();
                entry
                    .set_password(&STANDARD.encode(key))
                    .context("Failed to store device key in keychain")?;
                info!("Generated new device key");
                Ok(key)
            }
            Err(e) => Err(e).context("Failed to retrieve device key from keychain"),
        }
    }

    /// Store the bearer token in the OS keychain
    pub fn store_token(&self, token: &str) -> Result<()> {
        self.entry(TOKEN_ACCOUNT)?
            .set_password(token)
            .context("Failed to store token in keychain")
    }

    /// Retrieve the bearer token, if one was stored
    pub fn load_token(&self) -> Result<Option<String>> {
        match self.entry(TOKEN_ACCOUNT)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    /// Delete the stored bearer token. Deleting a missing token is not an error.
    pub fn delete_token(&self) -> Result<()> {
        match self.entry(TOKEN_ACCOUNT)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}
