//! Rate-limit and service configuration.

use serde::{Deserialize, Serialize};

use crate::bucket::RefillMode;
use warden_common::{Error, Result};
use warden_crypto::{KdfParams, DEFAULT_PAYLOAD_EXPIRATION_MS, DEFAULT_SIGNATURE_EXPIRATION_MS};

/// Token-bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum number of tokens.
    pub bucket_size: u32,
    /// Tokens added per second.
    pub refill_rate: f64,
    /// How fractional tokens are handled.
    pub refill_mode: RefillMode,
}

impl RateLimitConfig {
    /// Create a configuration with the default refill mode.
    pub fn new(bucket_size: u32, refill_rate: f64) -> Self {
        Self {
            bucket_size,
            refill_rate,
            refill_mode: RefillMode::default(),
        }
    }

    /// Set the refill mode.
    pub fn with_refill_mode(mut self, mode: RefillMode) -> Self {
        self.refill_mode = mode;
        self
    }

    /// Check both parameters are strictly positive.
    pub fn validate(&self) -> Result<()> {
        validate_bucket(self.bucket_size, self.refill_rate)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(10, 1.0)
    }
}

pub(crate) fn validate_bucket(bucket_size: u32, refill_rate: f64) -> Result<()> {
    if bucket_size == 0 {
        return Err(Error::Configuration(
            "Bucket size must be positive".to_string(),
        ));
    }
    if !(refill_rate.is_finite() && refill_rate > 0.0) {
        return Err(Error::Configuration(
            "Refill rate must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Settings for a whole set of security services, as loaded from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Payload freshness window. `0` disables the check.
    pub payload_expiration_ms: i64,
    /// Signature freshness window. Must be positive.
    pub signing_expiration_ms: i64,
    /// Key-derivation parameters shared by all encryption.
    pub kdf: KdfParams,
    /// Token-bucket parameters.
    pub rate_limit: RateLimitConfig,
}

impl SecurityConfig {
    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        if self.payload_expiration_ms < 0 {
            return Err(Error::Validation(
                "Expiration time must be non-negative".to_string(),
            ));
        }
        if self.signing_expiration_ms <= 0 {
            return Err(Error::Validation(
                "Expiration time must be positive".to_string(),
            ));
        }
        self.kdf.validate()?;
        self.rate_limit.validate()
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize and validate configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            payload_expiration_ms: DEFAULT_PAYLOAD_EXPIRATION_MS,
            signing_expiration_ms: DEFAULT_SIGNATURE_EXPIRATION_MS,
            kdf: KdfParams::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
