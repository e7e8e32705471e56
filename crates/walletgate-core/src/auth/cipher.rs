//! Authenticated encryption for cached passwords using `XChaCha20-Poly1305`.
//!
//! Output format is base64 of `nonce (24 bytes) || ciphertext || tag (16 bytes)`.
//! A wrong key or any modified byte makes decryption fail.

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

/// Device key size (32 bytes)
pub const KEY_LEN: usize = 32;

/// `XChaCha20` nonce size (24 bytes)
const NONCE_LEN: usize = 24;

/// Poly1305 tag size (16 bytes)
const TAG_LEN: usize = 16;

#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Cipher with a fresh random key. Data encrypted with it cannot be
    /// read after the process exits.
    pub fn ephemeral() -> Self {
        Self::new(generate_key())
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| anyhow!("Failed to encrypt credential"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<String> {
        let bytes = STANDARD
            .decode(sealed.trim())
            .context("Encrypted credential is not valid base64")?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            bail!("Encrypted credential is too short");
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("Encrypted credential failed authentication"))?;

        String::from_utf8(plaintext).context("Decrypted credential is not valid UTF-8")
    }
}

/// Generate a random device key.
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}
