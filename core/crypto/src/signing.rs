//! HMAC-SHA256 message signing with a freshness window.
//!
//! The signed payload is the JSON text of `{message, timestamp}`. The
//! signature covers those exact bytes, so verification never
//! re-serializes what it received.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::payload::MAX_CLOCK_SKEW_MS;
use warden_common::{Clock, Error, Result, SecretString, SystemClock};

type HmacSha256 = Hmac<Sha256>;

/// Default freshness window (5 minutes).
pub const DEFAULT_SIGNATURE_EXPIRATION_MS: i64 = 5 * 60 * 1000;

/// A message with its detached HMAC signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    /// JSON text of the inner `{message, timestamp}` object.
    pub payload: String,
    /// Lowercase hex HMAC-SHA256 of `payload`.
    pub signature: String,
    /// Copy of the inner timestamp.
    pub timestamp: i64,
}

impl SignedMessage {
    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse the JSON wire form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|_| Error::Validation("Invalid signed message format".to_string()))
    }
}

/// The object whose JSON text is signed.
#[derive(Debug, Serialize, Deserialize)]
struct SignedPayload {
    message: String,
    timestamp: i64,
}

/// Signs and verifies messages with a shared key.
#[derive(Debug, Clone)]
pub struct MessageAuthenticationService {
    secret_key: Option<SecretString>,
    expiration_ms: i64,
    clock: Arc<dyn Clock>,
}

impl MessageAuthenticationService {
    /// Create a service with no key and the default window.
    pub fn new() -> Self {
        Self {
            secret_key: None,
            expiration_ms: DEFAULT_SIGNATURE_EXPIRATION_MS,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Create a service with `key` already set.
    pub fn with_key(key: &str) -> Result<Self> {
        let mut service = Self::new();
        service.set_secret_key(key)?;
        Ok(service)
    }

    /// Set the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the signing key.
    ///
    /// # Errors
    /// - Returns error if `key` is empty
    pub fn set_secret_key(&mut self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::Validation(
                "Secret key must be a non-empty string".to_string(),
            ));
        }
        self.secret_key = Some(SecretString::new(key));
        Ok(())
    }

    /// Set the freshness window.
    ///
    /// Unlike payload encryption there is no "disabled" value here.
    ///
    /// # Errors
    /// - Returns error unless `ms` is strictly positive
    pub fn set_expiration_time(&mut self, ms: i64) -> Result<()> {
        if ms <= 0 {
            return Err(Error::Validation(
                "Expiration time must be positive".to_string(),
            ));
        }
        self.expiration_ms = ms;
        Ok(())
    }

    /// Current freshness window in milliseconds.
    pub fn expiration_time(&self) -> i64 {
        self.expiration_ms
    }

    /// Sign `message` with the current time.
    ///
    /// # Errors
    /// - Returns error if no key is set
    pub fn sign_message(&self, message: &str) -> Result<SignedMessage> {
        let key = self.key()?;
        let timestamp = self.clock.now_millis();

        let payload = serde_json::to_string(&SignedPayload {
            message: message.to_string(),
            timestamp,
        })
        .map_err(|e| Error::Serialization(e.to_string()))?;
        let signature = hmac_hex(key.as_bytes(), payload.as_bytes());

        Ok(SignedMessage {
            payload,
            signature,
            timestamp,
        })
    }

    /// Check the signature and freshness of `signed`.
    ///
    /// Malformed input yields `Ok(false)`; the only error is a missing key.
    pub fn verify_message(&self, signed: &SignedMessage) -> Result<bool> {
        let key = self.key()?;

        let inner: SignedPayload = match serde_json::from_str(&signed.payload) {
            Ok(inner) => inner,
            Err(_) => {
                debug!("Signed payload is not valid JSON");
                return Ok(false);
            }
        };

        if !self.is_timestamp_valid(inner.timestamp) {
            debug!(timestamp = inner.timestamp, "Signed message outside freshness window");
            return Ok(false);
        }

        let expected = hmac_hex(key.as_bytes(), signed.payload.as_bytes());
        let valid = constant_time_compare(expected.as_bytes(), signed.signature.as_bytes());
        if !valid {
            debug!("Signature mismatch");
        }
        Ok(valid)
    }

    /// True if `timestamp` is at most one minute ahead and no older than
    /// the expiration window.
    pub fn is_timestamp_valid(&self, timestamp: i64) -> bool {
        let now = self.clock.now_millis();
        timestamp.saturating_sub(now) <= MAX_CLOCK_SKEW_MS
            && now.saturating_sub(timestamp) <= self.expiration_ms
    }

    fn key(&self) -> Result<&SecretString> {
        self.secret_key
            .as_ref()
            .ok_or_else(|| Error::Validation("Secret key not set".to_string()))
    }
}

impl Default for MessageAuthenticationService {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase hex HMAC-SHA256 of `data`.
pub fn hmac_hex(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Compare two byte strings without leaking where, or whether, they differ.
///
/// Both sides are hashed to fixed-size digests first, so the work done does
/// not depend on either input's length.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    let digest_a = Sha256::digest(a);
    let digest_b = Sha256::digest(b);
    digest_a.as_slice().ct_eq(digest_b.as_slice()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::MockClock;

    const T0: i64 = 1_700_000_000_000;

    fn service(clock: &MockClock) -> MessageAuthenticationService {
        MessageAuthenticationService::with_key("signing-key")
            .unwrap()
            .with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn test_hmac_known_answer() {
        // RFC 4231 test case 2
        assert_eq!(
            hmac_hex(b"Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let clock = MockClock::new(T0);
        let svc = service(&clock);

        let signed = svc.sign_message("hello").unwrap();
        assert_eq!(signed.timestamp, T0);
        assert_eq!(signed.signature.len(), 64);
        assert!(svc.verify_message(&signed).unwrap());
    }

    #[test]
    fn test_payload_shape() {
        let svc = service(&MockClock::new(T0));
        let signed = svc.sign_message("hi").unwrap();

        let inner: serde_json::Value = serde_json::from_str(&signed.payload).unwrap();
        assert_eq!(inner["message"], "hi");
        assert_eq!(inner["timestamp"], T0);
    }

    #[test]
    fn test_altered_payload_or_signature_fails() {
        let svc = service(&MockClock::new(T0));
        let signed = svc.sign_message("transfer 10").unwrap();

        let mut bad = signed.clone();
        bad.payload = bad.payload.replace("10", "90");
        assert!(!svc.verify_message(&bad).unwrap());

        let mut bad = signed.clone();
        let last = bad.signature.pop().unwrap();
        bad.signature.push(if last == '0' { '1' } else { '0' });
        assert!(!svc.verify_message(&bad).unwrap());

        let mut bad = signed;
        bad.signature.truncate(10);
        assert!(!svc.verify_message(&bad).unwrap());
    }

    #[test]
    fn test_different_key_fails() {
        let clock = MockClock::new(T0);
        let signed = service(&clock).sign_message("m").unwrap();

        let other = MessageAuthenticationService::with_key("other-key")
            .unwrap()
            .with_clock(Arc::new(clock));
        assert!(!other.verify_message(&signed).unwrap());
    }

    #[test]
    fn test_garbage_payload_is_false_not_error() {
        let svc = service(&MockClock::new(T0));
        let bad = SignedMessage {
            payload: "{not json".to_string(),
            signature: "00".to_string(),
            timestamp: T0,
        };
        assert!(!svc.verify_message(&bad).unwrap());

        let bad = SignedMessage {
            payload: r#"{"message":"m","timestamp":"yesterday"}"#.to_string(),
            signature: String::new(),
            timestamp: 0,
        };
        assert!(!svc.verify_message(&bad).unwrap());
    }

    #[test]
    fn test_expired_and_future_messages_rejected() {
        let clock = MockClock::new(T0);
        let svc = service(&clock);
        let signed = svc.sign_message("m").unwrap();

        clock.set(T0 + DEFAULT_SIGNATURE_EXPIRATION_MS);
        assert!(svc.verify_message(&signed).unwrap());

        clock.set(T0 + DEFAULT_SIGNATURE_EXPIRATION_MS + 1);
        assert!(!svc.verify_message(&signed).unwrap());

        // Signed by a clock running more than a minute ahead.
        clock.set(T0 - MAX_CLOCK_SKEW_MS - 1);
        assert!(!svc.verify_message(&signed).unwrap());
    }

    #[test]
    fn test_missing_key() {
        let svc = MessageAuthenticationService::new();
        let err = svc.sign_message("m").unwrap_err();
        assert_eq!(err.to_string(), "Secret key not set");

        let signed = SignedMessage {
            payload: String::new(),
            signature: String::new(),
            timestamp: 0,
        };
        assert!(svc.verify_message(&signed).is_err());
    }

    #[test]
    fn test_setters_validate() {
        let mut svc = MessageAuthenticationService::new();
        assert!(svc.set_secret_key("").unwrap_err().is_validation());

        let err = svc.set_expiration_time(0).unwrap_err();
        assert_eq!(err.to_string(), "Expiration time must be positive");
        assert!(svc.set_expiration_time(-5).is_err());

        svc.set_expiration_time(1_000).unwrap();
        assert_eq!(svc.expiration_time(), 1_000);
    }

    #[test]
    fn test_debug_hides_key() {
        let svc = MessageAuthenticationService::with_key("top-secret").unwrap();
        assert!(!format!("{:?}", svc).contains("top-secret"));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abc", b"abc"));
        assert!(!constant_time_compare(b"abc", b"abd"));
        assert!(!constant_time_compare(b"abc", b"abcd"));
        assert!(constant_time_compare(b"", b""));
    }

    #[test]
    fn test_signed_message_json() {
        let svc = service(&MockClock::new(T0));
        let signed = svc.sign_message("m").unwrap();

        let parsed = SignedMessage::from_json(&signed.to_json().unwrap()).unwrap();
        assert_eq!(parsed, signed);
        assert!(SignedMessage::from_json("[]").is_err());
    }
}
