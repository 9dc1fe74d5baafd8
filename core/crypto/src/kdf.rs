//! Key derivation using PBKDF2-HMAC-SHA256.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::keys::{DerivedKey, KEY_LENGTH};
use warden_common::{Error, Result};

/// Iteration count used by every wire format.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Parameters for PBKDF2 key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of HMAC-SHA256 iterations.
    pub iterations: u32,
}

impl KdfParams {
    /// Create parameters with a custom iteration count.
    ///
    /// Anything other than `DEFAULT_ITERATIONS` produces output that other
    /// implementations cannot decrypt. Lower counts are for tests.
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::Validation(
                "KDF iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

/// Derive a 32-byte key from a secret and salt.
///
/// # Preconditions
/// - `secret` must not be empty
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Security
/// - Secret is not stored or logged
/// - The key zeroizes on drop
pub fn derive_key(secret: &[u8], salt: &[u8], params: &KdfParams) -> Result<DerivedKey> {
    if secret.is_empty() {
        return Err(Error::Validation("Secret cannot be empty".to_string()));
    }
    params.validate()?;

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(secret, salt, params.iterations, &mut key_bytes);

    Ok(DerivedKey::from_bytes(key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_answer() {
        // PBKDF2-HMAC-SHA256("passwd", "salt", c = 1), first 32 bytes.
        let key = derive_key(b"passwd", b"salt", &KdfParams::new(1)).unwrap();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = [42u8; 16];
        let params = KdfParams::new(1_000);

        let key1 = derive_key(b"test-password-123", &salt, &params).unwrap();
        let key2 = derive_key(b"test-password-123", &salt, &params).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let params = KdfParams::new(1_000);

        let key1 = derive_key(b"pw", &[1u8; 16], &params).unwrap();
        let key2 = derive_key(b"pw", &[2u8; 16], &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_empty_secret_fails() {
        assert!(derive_key(b"", &[0u8; 16], &KdfParams::new(1)).is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let err = derive_key(b"pw", &[0u8; 16], &KdfParams::new(0)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_default_iterations() {
        assert_eq!(KdfParams::default().iterations, 100_000);
    }
}
