//! Encrypted payload bundled with the sender's rate-limit state.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use warden_common::{Error, Result};
use warden_crypto::EncryptedMessage;

/// Snapshot of a sender's bucket at encryption time.
///
/// Missing or unusable fields read as zero, which receivers treat as "no
/// configuration". A bad snapshot never makes the envelope unreadable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitMetadata {
    #[serde(deserialize_with = "lenient_f64")]
    pub tokens: f64,
    #[serde(deserialize_with = "lenient_bucket_size")]
    pub bucket_size: u32,
    #[serde(deserialize_with = "lenient_f64")]
    pub refill_rate: f64,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: i64,
}

impl RateLimitMetadata {
    /// True if the snapshot carries a configuration a receiver may adopt.
    pub fn has_configuration(&self) -> bool {
        self.bucket_size > 0 && self.refill_rate.is_finite() && self.refill_rate > 0.0
    }
}

/// Any JSON value; only positive integers that fit a `u32` survive.
fn lenient_bucket_size<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let size = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f > 0.0 && *f <= f64::from(u32::MAX))
            .map(|f| f as u64)
    });
    Ok(size.and_then(|n| u32::try_from(n).ok()).unwrap_or(0))
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64().filter(|f| f.is_finite()).unwrap_or(0.0))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
        .unwrap_or(0))
}

/// Wire form of `encrypt_with_rate_limit` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitedEnvelope {
    pub encrypted_message: EncryptedMessage,
    #[serde(default)]
    pub rate_limit_info: RateLimitMetadata,
}

impl RateLimitedEnvelope {
    /// Serialize to the JSON wire form.
    pub fn seal(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse the JSON wire form.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|_| Error::Validation("Invalid rate-limited envelope".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EncryptedMessage {
        EncryptedMessage {
            encrypted_payload: "cA==".to_string(),
            iv: "aXY=".to_string(),
            auth_tag: "dGFn".to_string(),
            salt: "c2FsdA==".to_string(),
            timestamp: 1,
        }
    }

    #[test]
    fn test_seal_parse() {
        let envelope = RateLimitedEnvelope {
            encrypted_message: message(),
            rate_limit_info: RateLimitMetadata {
                tokens: 4.0,
                bucket_size: 10,
                refill_rate: 0.5,
                timestamp: 7,
            },
        };
        let sealed = envelope.seal().unwrap();
        assert!(sealed.contains("\"encryptedMessage\""));
        assert!(sealed.contains("\"bucketSize\":10"));
        assert_eq!(RateLimitedEnvelope::parse(&sealed).unwrap(), envelope);
    }

    #[test]
    fn test_missing_metadata_has_no_configuration() {
        let json = format!(
            r#"{{"encryptedMessage":{}}}"#,
            message().to_json().unwrap()
        );
        let envelope = RateLimitedEnvelope::parse(&json).unwrap();
        assert!(!envelope.rate_limit_info.has_configuration());
    }

    #[test]
    fn test_unusable_bucket_size_reads_as_unconfigured() {
        for bucket_size in ["-1", "12.5", "0", "4294967296", "null", "\"ten\""] {
            let json = format!(
                r#"{{"encryptedMessage":{},"rateLimitInfo":{{"tokens":1,"bucketSize":{},"refillRate":2,"timestamp":3}}}}"#,
                message().to_json().unwrap(),
                bucket_size
            );
            let envelope = RateLimitedEnvelope::parse(&json).unwrap();
            assert_eq!(envelope.rate_limit_info.bucket_size, 0, "bucketSize {}", bucket_size);
            assert_eq!(envelope.rate_limit_info.refill_rate, 2.0);
            assert!(!envelope.rate_limit_info.has_configuration());
        }
    }

    #[test]
    fn test_integral_float_bucket_size_accepted() {
        let json = format!(
            r#"{{"encryptedMessage":{},"rateLimitInfo":{{"bucketSize":12.0,"refillRate":-1}}}}"#,
            message().to_json().unwrap()
        );
        let info = RateLimitedEnvelope::parse(&json).unwrap().rate_limit_info;
        assert_eq!(info.bucket_size, 12);
        assert!(!info.has_configuration());
    }

    #[test]
    fn test_parse_garbage() {
        let err = RateLimitedEnvelope::parse("{").unwrap_err();
        assert_eq!(err.to_string(), "Invalid rate-limited envelope");
    }
}
