//! Credential protection for the PIN-unlock flow.
//!
//! This module provides:
//! - `CredentialCipher`: authenticated encryption of cached passwords
//! - `CredentialVault`: stored credentials, PIN hash and PIN flag, with 30-day expiry
//! - `PinHasher`: Argon2 hashing and validation of PINs
//! - `Keychain`: OS keychain storage for the device key and bearer token

pub mod cipher;
pub mod credentials;
pub mod keychain;
pub mod pin;

pub use cipher::CredentialCipher;
pub use credentials::{CredentialVault, StoredCredentials, CREDENTIAL_TTL_DAYS};
pub use keychain::Keychain;
pub use pin::PinHasher;
