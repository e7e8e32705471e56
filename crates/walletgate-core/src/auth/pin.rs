//! PIN hashing for the PIN-unlock shortcut.
//!
//! PINs are short, so the hash only guards the value at rest; the
//! credentials it unlocks are separately encrypted under the device key.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Shortest accepted PIN
pub const MIN_PIN_LENGTH: usize = 4;

/// Longest accepted PIN
pub const MAX_PIN_LENGTH: usize = 6;

pub struct PinHasher;

impl PinHasher {
    /// A PIN is 4-6 ASCII digits.
    pub fn is_valid_pin(pin: &str) -> bool {
        (MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&pin.len())
            && pin.chars().all(|c| c.is_ascii_digit())
    }

    /// Hash a PIN into a PHC string (Argon2id, random salt).
    pub fn hash(pin: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash PIN: {}", e))?;
        Ok(hash.to_string())
    }

    /// Check a PIN against a stored PHC string. A malformed hash never verifies.
    pub fn verify(pin: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(pin.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
