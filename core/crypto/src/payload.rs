//! Authenticated payload encryption with a freshness window.
//!
//! Every call derives a fresh key from the caller's secret and a random
//! salt, then seals the payload with AES-256-GCM under a random nonce.
//! The creation time travels with the message and is checked at decrypt
//! time only.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aead;
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{Nonce, Salt, TAG_LENGTH};
use warden_common::{Clock, Error, Result, SystemClock};

/// Default freshness window (5 minutes).
pub const DEFAULT_PAYLOAD_EXPIRATION_MS: i64 = 5 * 60 * 1000;

/// How far in the future a timestamp may be before it is rejected.
pub const MAX_CLOCK_SKEW_MS: i64 = 60 * 1000;

const DECRYPT_FAILED: &str = "Failed to decrypt payload";
const INVALID_FORMAT: &str = "Invalid encrypted message format";
const INVALID_TIMESTAMP: &str = "Invalid timestamp in encrypted message";
const MESSAGE_REQUIRED: &str = "Encrypted message is required";
const SECRET_REQUIRED: &str = "Secret must be a non-empty string";

/// Output of one `encrypt_payload` call.
///
/// Binary fields are base64. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    pub encrypted_payload: String,
    pub iv: String,
    pub auth_tag: String,
    pub salt: String,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
}

/// Wire shape before validation: every field optional so the exact
/// failure can be reported.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEncryptedMessage {
    encrypted_payload: Option<String>,
    iv: Option<String>,
    auth_tag: Option<String>,
    salt: Option<String>,
    timestamp: Option<serde_json::Value>,
}

impl EncryptedMessage {
    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse the JSON wire form.
    ///
    /// Numeric timestamps with a fractional part are truncated to whole
    /// milliseconds.
    pub fn from_json(json: &str) -> Result<Self> {
        let trimmed = json.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(Error::Validation(MESSAGE_REQUIRED.to_string()));
        }

        let raw: RawEncryptedMessage = serde_json::from_str(trimmed)
            .map_err(|_| Error::Validation(INVALID_FORMAT.to_string()))?;

        let invalid = || Error::Validation(INVALID_FORMAT.to_string());
        let field = |value: Option<String>| value.filter(|s| !s.is_empty()).ok_or_else(invalid);
        // An empty payload encrypts to empty ciphertext.
        let encrypted_payload = raw.encrypted_payload.ok_or_else(invalid)?;
        let iv = field(raw.iv)?;
        let auth_tag = field(raw.auth_tag)?;
        let salt = field(raw.salt)?;

        let timestamp = raw
            .timestamp
            .as_ref()
            .and_then(|value| {
                value
                    .as_i64()
                    .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            })
            .ok_or_else(|| Error::Validation(INVALID_TIMESTAMP.to_string()))?;

        Ok(Self {
            encrypted_payload,
            iv,
            auth_tag,
            salt,
            timestamp,
        })
    }

    /// Ciphertext may be empty; the fixed-size fields may not.
    fn has_all_fields(&self) -> bool {
        !(self.iv.is_empty() || self.auth_tag.is_empty() || self.salt.is_empty())
    }
}

/// Encrypts text payloads for a shared secret.
#[derive(Debug, Clone)]
pub struct PayloadEncryptionService {
    expiration_ms: i64,
    kdf: KdfParams,
    clock: Arc<dyn Clock>,
}

impl PayloadEncryptionService {
    /// Create a service with the default window and KDF parameters.
    pub fn new() -> Self {
        Self {
            expiration_ms: DEFAULT_PAYLOAD_EXPIRATION_MS,
            kdf: KdfParams::default(),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Set KDF parameters.
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Set the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the freshness window. `0` disables expiration checks.
    ///
    /// # Errors
    /// - Returns error if `ms` is negative
    pub fn set_expiration_time(&mut self, ms: i64) -> Result<()> {
        if ms < 0 {
            return Err(Error::Validation(
                "Expiration time must be non-negative".to_string(),
            ));
        }
        self.expiration_ms = ms;
        Ok(())
    }

    /// Current freshness window in milliseconds.
    pub fn expiration_time(&self) -> i64 {
        self.expiration_ms
    }

    /// Encrypt `payload` under a key derived from `secret`.
    ///
    /// # Postconditions
    /// - Salt, nonce and ciphertext differ on every call, even for identical inputs
    /// - `timestamp` is the current time
    ///
    /// # Errors
    /// - Returns a validation error if `secret` is empty
    pub fn encrypt_payload(&self, payload: &str, secret: &str) -> Result<EncryptedMessage> {
        if secret.is_empty() {
            return Err(Error::Validation(SECRET_REQUIRED.to_string()));
        }

        let salt = Salt::generate();
        let nonce = Nonce::generate();
        let key = derive_key(secret.as_bytes(), salt.as_bytes(), &self.kdf)?;
        let sealed = aead::encrypt(&key, &nonce, payload.as_bytes())?;

        debug!(len = payload.len(), "Payload encrypted");

        Ok(EncryptedMessage {
            encrypted_payload: STANDARD.encode(&sealed.ciphertext),
            iv: STANDARD.encode(nonce.as_bytes()),
            auth_tag: STANDARD.encode(sealed.tag),
            salt: STANDARD.encode(salt.as_bytes()),
            timestamp: self.clock.now_millis(),
        })
    }

    /// Decrypt a message produced by `encrypt_payload`.
    ///
    /// # Errors
    /// - Validation error if `secret` is empty or a binary field is missing
    /// - `"Encrypted message has expired"` if outside the freshness window
    /// - `"Failed to decrypt payload"` for any cryptographic failure
    pub fn decrypt_payload(&self, msg: &EncryptedMessage, secret: &str) -> Result<String> {
        if secret.is_empty() {
            return Err(Error::Validation(SECRET_REQUIRED.to_string()));
        }
        if !msg.has_all_fields() {
            return Err(Error::Validation(INVALID_FORMAT.to_string()));
        }

        if self.expiration_ms > 0 && !self.is_fresh(msg.timestamp) {
            debug!(timestamp = msg.timestamp, "Rejected expired encrypted message");
            return Err(Error::Expired("Encrypted message has expired".to_string()));
        }

        self.open(msg, secret).map_err(|_| {
            debug!("Payload decryption failed");
            Error::Crypto(DECRYPT_FAILED.to_string())
        })
    }

    fn is_fresh(&self, timestamp: i64) -> bool {
        let now = self.clock.now_millis();
        now.saturating_sub(timestamp) <= self.expiration_ms
            && timestamp.saturating_sub(now) <= MAX_CLOCK_SKEW_MS
    }

    /// Every error from here is collapsed into one message by the caller.
    fn open(&self, msg: &EncryptedMessage, secret: &str) -> Result<String> {
        let undecodable = || Error::Crypto(DECRYPT_FAILED.to_string());

        let salt = STANDARD.decode(&msg.salt).map_err(|_| undecodable())?;
        let salt = Salt::from_slice(&salt).ok_or_else(undecodable)?;
        let nonce = STANDARD.decode(&msg.iv).map_err(|_| undecodable())?;
        let nonce = Nonce::from_slice(&nonce).ok_or_else(undecodable)?;
        let tag: [u8; TAG_LENGTH] = STANDARD
            .decode(&msg.auth_tag)
            .map_err(|_| undecodable())?
            .try_into()
            .map_err(|_| undecodable())?;
        let ciphertext = STANDARD
            .decode(&msg.encrypted_payload)
            .map_err(|_| undecodable())?;

        let key = derive_key(secret.as_bytes(), salt.as_bytes(), &self.kdf)?;
        let plaintext = aead::decrypt(&key, &nonce, &ciphertext, &tag)?;

        String::from_utf8(plaintext).map_err(|_| undecodable())
    }
}

impl Default for PayloadEncryptionService {
    fn default() -> Self {
        Self::new()
    }
}
