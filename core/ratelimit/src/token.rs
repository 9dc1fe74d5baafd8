//! Self-expiring rate-limit tokens.
//!
//! A token is two nested JSON layers:
//!
//! ```text
//! SignedMessage { payload, signature, timestamp }
//!                 └─ { message, timestamp }
//!                      └─ RateLimitToken { payload, timestamp, expiration }
//! ```
//!
//! The signature layer is produced by `MessageAuthenticationService`; this
//! module owns the innermost layer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use warden_common::{Error, Result};

/// Milliseconds per minute.
const MINUTE_MS: f64 = 60_000.0;

/// Innermost layer of a rate-limit token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitToken<T> {
    /// Caller data.
    pub payload: T,
    /// Issue time in epoch milliseconds.
    pub timestamp: i64,
    /// Last valid instant in epoch milliseconds. Tokens without one never
    /// expire at this layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
}

impl<T> RateLimitToken<T> {
    /// Build a token issued at `now` that lives for `minutes`.
    ///
    /// # Errors
    /// - Returns error unless `minutes` is finite and non-negative
    pub fn issue(payload: T, now: i64, minutes: f64) -> Result<Self> {
        if !(minutes.is_finite() && minutes >= 0.0) {
            return Err(Error::Validation(
                "Expiration minutes must be a non-negative number".to_string(),
            ));
        }
        let lifetime = (minutes * MINUTE_MS).round() as i64;
        Ok(Self {
            payload,
            timestamp: now,
            expiration: Some(now.saturating_add(lifetime)),
        })
    }

    /// True while `now` has not passed the expiration.
    pub fn is_live(&self, now: i64) -> bool {
        self.expiration.map_or(true, |expiration| now <= expiration)
    }
}

impl<T: Serialize> RateLimitToken<T> {
    /// Serialize to the text carried as the signed `message`.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl<T: DeserializeOwned> RateLimitToken<T> {
    /// Parse the text carried as the signed `message`.
    pub fn decode(message: &str) -> Result<Self> {
        serde_json::from_str(message)
            .map_err(|_| Error::Validation("Invalid rate limit token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_sets_expiration() {
        let token = RateLimitToken::issue("user-1", 1_000, 5.0).unwrap();
        assert_eq!(token.timestamp, 1_000);
        assert_eq!(token.expiration, Some(1_000 + 300_000));

        let token = RateLimitToken::issue((), 0, 0.01).unwrap();
        assert_eq!(token.expiration, Some(600));
    }

    #[test]
    fn test_issue_rejects_bad_minutes() {
        assert!(RateLimitToken::issue((), 0, -1.0).is_err());
        assert!(RateLimitToken::issue((), 0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_is_live() {
        let token = RateLimitToken::issue((), 0, 1.0).unwrap();
        assert!(token.is_live(60_000));
        assert!(!token.is_live(60_001));

        let forever = RateLimitToken {
            payload: (),
            timestamp: 0,
            expiration: None,
        };
        assert!(forever.is_live(i64::MAX));
    }

    #[test]
    fn test_wire_field_order() {
        let token = RateLimitToken::issue(json!({"user": "a"}), 5, 0.0).unwrap();
        assert_eq!(
            token.encode().unwrap(),
            r#"{"payload":{"user":"a"},"timestamp":5,"expiration":5}"#
        );
    }

    #[test]
    fn test_decode_without_expiration() {
        let token: RateLimitToken<String> =
            RateLimitToken::decode(r#"{"payload":"x","timestamp":1}"#).unwrap();
        assert_eq!(token.expiration, None);
        assert!(RateLimitToken::<String>::decode("{}").is_err());
    }
}
