//! Token-bucket admission control with signed and encrypted tokens.
//!
//! One service instance owns one bucket. Instances are `Send + Sync`;
//! bucket reads and writes are serialized by a mutex, so an instance can
//! be shared behind an `Arc` by every caller acting for the same principal.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::bucket::TokenBucket;
use crate::config::{validate_bucket, RateLimitConfig, SecurityConfig};
use crate::envelope::{RateLimitMetadata, RateLimitedEnvelope};
use crate::token::RateLimitToken;
use warden_common::{Clock, Error, Result, SystemClock};
use warden_crypto::{
    KdfParams, MessageAuthenticationService, PayloadEncryptionService, SignedMessage,
};

/// Freshness window of the internal signer.
///
/// Long enough that the token's own `expiration` always decides first.
pub const TOKEN_SIGNATURE_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Default token lifetime in minutes.
pub const DEFAULT_TOKEN_MINUTES: f64 = 5.0;

/// Point-in-time view of a bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitStatus {
    pub tokens: f64,
    pub bucket_size: u32,
    pub refill_rate: f64,
    pub last_refill: i64,
}

/// Rate limiter for one principal.
#[derive(Debug)]
pub struct RateLimitingService {
    bucket: Mutex<TokenBucket>,
    signer: MessageAuthenticationService,
    encryption: PayloadEncryptionService,
    clock: Arc<dyn Clock>,
}

impl RateLimitingService {
    /// Create a service with a full bucket.
    ///
    /// # Errors
    /// - Validation error if `secret_key` is empty
    /// - Configuration error unless bucket size and refill rate are positive
    pub fn new(secret_key: &str, config: RateLimitConfig) -> Result<Self> {
        Self::with_clock(secret_key, config, Arc::new(SystemClock::new()))
    }

    /// Create a service reading time from `clock`.
    pub fn with_clock(
        secret_key: &str,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let mut signer =
            MessageAuthenticationService::with_key(secret_key)?.with_clock(Arc::clone(&clock));
        signer.set_expiration_time(TOKEN_SIGNATURE_WINDOW_MS)?;

        let encryption = PayloadEncryptionService::new().with_clock(Arc::clone(&clock));
        let bucket = TokenBucket::new(config.bucket_size, config.refill_rate, clock.now_millis())
            .with_mode(config.refill_mode);

        Ok(Self {
            bucket: Mutex::new(bucket),
            signer,
            encryption,
            clock,
        })
    }

    /// Create a service from a full security configuration.
    pub fn from_config(
        secret_key: &str,
        config: &SecurityConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let mut service = Self::with_clock(secret_key, config.rate_limit, clock)?
            .with_kdf_params(config.kdf);
        service
            .encryption
            .set_expiration_time(config.payload_expiration_ms)?;
        Ok(service)
    }

    /// Set KDF parameters for the payload envelope.
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.encryption = self.encryption.with_kdf_params(kdf);
        self
    }

    /// Take `n` tokens if available.
    ///
    /// Never blocks. A rejection leaves the bucket as it was after refill.
    pub fn consume(&self, n: u32) -> bool {
        let now = self.clock.now_millis();
        let mut bucket = self.bucket.lock();
        let allowed = bucket.try_consume(n, now);
        if !allowed {
            debug!(requested = n, tokens = bucket.tokens(), "Rate limit exceeded");
        }
        allowed
    }

    /// Take one token if available.
    pub fn consume_one(&self) -> bool {
        self.consume(1)
    }

    /// Tokens available right now.
    pub fn available_tokens(&self) -> f64 {
        self.status().tokens
    }

    /// Refill and return the bucket's current state.
    pub fn status(&self) -> RateLimitStatus {
        let bucket = self.refilled();
        RateLimitStatus {
            tokens: bucket.tokens(),
            bucket_size: bucket.bucket_size(),
            refill_rate: bucket.refill_rate(),
            last_refill: bucket.last_refill(),
        }
    }

    /// Fill the bucket to capacity.
    pub fn reset(&self) {
        let now = self.clock.now_millis();
        self.bucket.lock().fill(now);
        debug!("Rate limit bucket reset");
    }

    /// Change capacity and refill rate.
    ///
    /// The current count is clamped to the new capacity.
    ///
    /// # Errors
    /// - Returns error unless both values are strictly positive
    pub fn update_configuration(&self, bucket_size: u32, refill_rate: f64) -> Result<()> {
        validate_bucket(bucket_size, refill_rate)?;

        let mut bucket = self.refilled();
        bucket.reconfigure(bucket_size, refill_rate);
        info!(bucket_size, refill_rate, "Rate limit configuration updated");
        Ok(())
    }

    /// Issue a signed token carrying `payload` that expires after
    /// `expiration_minutes`.
    pub fn create_rate_limit_token<T: Serialize>(
        &self,
        payload: &T,
        expiration_minutes: f64,
    ) -> Result<String> {
        self.refill_tokens();
        let now = self.clock.now_millis();

        let token = RateLimitToken::issue(payload, now, expiration_minutes)?;
        let signed = self.signer.sign_message(&token.encode()?)?;

        debug!(expiration = ?token.expiration, "Rate limit token issued");
        signed.to_json()
    }

    /// Decode a token if its signature verifies and it has not expired.
    ///
    /// Returns `None` for anything else, including malformed input and
    /// payloads that do not decode as `T`.
    pub fn open_rate_limit_token<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Option<RateLimitToken<T>> {
        self.refill_tokens();
        let now = self.clock.now_millis();

        let signed = SignedMessage::from_json(token).ok()?;
        if !self.signer.verify_message(&signed).unwrap_or(false) {
            debug!("Rate limit token failed signature check");
            return None;
        }

        let message = signed_message_text(&signed)?;
        let token = RateLimitToken::<T>::decode(&message).ok()?;
        if !token.is_live(now) {
            debug!(expiration = ?token.expiration, "Rate limit token expired");
            return None;
        }
        Some(token)
    }

    /// True if `token` verifies and has not expired. Never fails.
    pub fn validate_rate_limit_token(&self, token: &str) -> bool {
        self.open_rate_limit_token::<serde_json::Value>(token).is_some()
    }

    /// Encrypt `data` and attach a snapshot of this bucket.
    pub fn encrypt_with_rate_limit(&self, data: &str, secret: &str) -> Result<String> {
        let snapshot = self.status();
        let encrypted_message = self.encryption.encrypt_payload(data, secret)?;

        RateLimitedEnvelope {
            encrypted_message,
            rate_limit_info: RateLimitMetadata {
                tokens: snapshot.tokens,
                bucket_size: snapshot.bucket_size,
                refill_rate: snapshot.refill_rate,
                timestamp: self.clock.now_millis(),
            },
        }
        .seal()
    }

    /// Decrypt an envelope from `encrypt_with_rate_limit`.
    ///
    /// If the sender's snapshot carries a positive configuration, this
    /// instance adopts it.
    ///
    /// # Errors
    /// - `"Failed to decrypt with rate limit: <reason>"` for any failure
    pub fn decrypt_with_rate_limit(&self, envelope: &str, secret: &str) -> Result<String> {
        self.open_envelope(envelope, secret)
            .map_err(|e| Error::Crypto(format!("Failed to decrypt with rate limit: {}", e)))
    }

    fn open_envelope(&self, envelope: &str, secret: &str) -> Result<String> {
        self.refill_tokens();

        let envelope = RateLimitedEnvelope::parse(envelope)?;
        let data = self
            .encryption
            .decrypt_payload(&envelope.encrypted_message, secret)?;

        let info = &envelope.rate_limit_info;
        if info.has_configuration() {
            let mut bucket = self.bucket.lock();
            if bucket.bucket_size() != info.bucket_size || bucket.refill_rate() != info.refill_rate
            {
                bucket.reconfigure(info.bucket_size, info.refill_rate);
                info!(
                    bucket_size = info.bucket_size,
                    refill_rate = info.refill_rate,
                    "Adopted sender rate limit configuration"
                );
            }
        }

        Ok(data)
    }

    /// Bring the bucket up to date.
    fn refill_tokens(&self) {
        drop(self.refilled());
    }

    /// Lock the bucket after bringing it up to date.
    fn refilled(&self) -> parking_lot::MutexGuard<'_, TokenBucket> {
        let now = self.clock.now_millis();
        let mut bucket = self.bucket.lock();
        bucket.refill(now);
        bucket
    }
}

/// Extract the signed `message` from a verified token.
fn signed_message_text(signed: &SignedMessage) -> Option<String> {
    let inner: serde_json::Value = serde_json::from_str(&signed.payload).ok()?;
    inner.get("message")?.as_str().map(str::to_string)
}
