//! Encryption of long-lived opaque tokens (API credentials and the like).
//!
//! Same envelope as payload encryption, no expiration, and a flat wire
//! form: `base64(salt || iv || tag || ciphertext)`. Field lengths are fixed,
//! so there are no delimiters or length prefixes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use crate::aead;
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{Nonce, Salt, NONCE_LENGTH, SALT_LENGTH, TAG_LENGTH};
use warden_common::{Error, Result};

/// Bytes before the ciphertext starts.
pub const TOKEN_HEADER_LENGTH: usize = SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH;

const DECRYPT_FAILED: &str = "Failed to decrypt token: invalid password or corrupted data";

/// Encrypts tokens under a password.
#[derive(Debug, Clone, Default)]
pub struct TokenEncryptionService {
    kdf: KdfParams,
}

impl TokenEncryptionService {
    /// Create a service with the default KDF parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set KDF parameters.
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Encrypt `token` under `password`.
    ///
    /// # Errors
    /// - Returns a validation error if `password` is empty
    pub fn encrypt_token(&self, token: &str, password: &str) -> Result<String> {
        if password.is_empty() {
            return Err(Error::Validation(
                "Password must be a non-empty string".to_string(),
            ));
        }

        let salt = Salt::generate();
        let nonce = Nonce::generate();
        let key = derive_key(password.as_bytes(), salt.as_bytes(), &self.kdf)?;
        let sealed = aead::encrypt(&key, &nonce, token.as_bytes())?;

        let mut blob = Vec::with_capacity(TOKEN_HEADER_LENGTH + sealed.ciphertext.len());
        blob.extend_from_slice(salt.as_bytes());
        blob.extend_from_slice(nonce.as_bytes());
        blob.extend_from_slice(&sealed.tag);
        blob.extend_from_slice(&sealed.ciphertext);

        debug!(len = token.len(), "Token encrypted");
        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by `encrypt_token`.
    ///
    /// # Errors
    /// - Any failure (wrong password, truncation, corruption) returns the
    ///   same message and never echoes the input
    pub fn decrypt_token(&self, encrypted: &str, password: &str) -> Result<String> {
        self.open(encrypted, password).map_err(|_| {
            debug!("Token decryption failed");
            Error::Crypto(DECRYPT_FAILED.to_string())
        })
    }

    fn open(&self, encrypted: &str, password: &str) -> Result<String> {
        let corrupted = || Error::Crypto(DECRYPT_FAILED.to_string());

        let blob = STANDARD.decode(encrypted.trim()).map_err(|_| corrupted())?;
        if blob.len() < TOKEN_HEADER_LENGTH {
            return Err(corrupted());
        }

        let (salt, rest) = blob.split_at(SALT_LENGTH);
        let (nonce, rest) = rest.split_at(NONCE_LENGTH);
        let (tag, ciphertext) = rest.split_at(TAG_LENGTH);

        let salt = Salt::from_slice(salt).ok_or_else(corrupted)?;
        let nonce = Nonce::from_slice(nonce).ok_or_else(corrupted)?;
        let tag: [u8; TAG_LENGTH] = tag.try_into().map_err(|_| corrupted())?;

        let key = derive_key(password.as_bytes(), salt.as_bytes(), &self.kdf)?;
        let plaintext = aead::decrypt(&key, &nonce, ciphertext, &tag)?;

        String::from_utf8(plaintext).map_err(|_| corrupted())
    }
}
