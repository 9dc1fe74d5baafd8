//! Token-bucket rate limiting with signed, self-expiring tokens.
//!
//! `RateLimitingService` combines three things for one principal:
//! - a token bucket for accept/reject admission control
//! - HMAC-signed tokens whose inner `expiration` decides their lifetime
//! - encrypted payloads that carry the sender's bucket configuration

pub mod bucket;
pub mod config;
pub mod envelope;
pub mod service;
pub mod token;

pub use bucket::{RefillMode, TokenBucket};
pub use config::{RateLimitConfig, SecurityConfig};
pub use envelope::{RateLimitMetadata, RateLimitedEnvelope};
pub use service::{RateLimitStatus, RateLimitingService, DEFAULT_TOKEN_MINUTES};
pub use token::RateLimitToken;
