//! Cryptographic primitives for warden.
//!
//! This module provides:
//! - Key derivation using PBKDF2-HMAC-SHA256
//! - Authenticated encryption using AES-256-GCM
//! - Payload encryption with a freshness window
//! - HMAC-SHA256 message signing
//! - Opaque token encryption
//!
//! # Security Guarantees
//! - Derived keys and held secrets are zeroized on drop
//! - No plaintext, secret or key material is ever logged
//! - Decryption failures surface as fixed messages that reveal no cause
//! - Signature checks use a length-independent constant-time comparison

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod payload;
pub mod signing;
pub mod token;

pub use kdf::{derive_key, KdfParams, DEFAULT_ITERATIONS};
pub use keys::{DerivedKey, Nonce, Salt};
pub use payload::{EncryptedMessage, PayloadEncryptionService, DEFAULT_PAYLOAD_EXPIRATION_MS};
pub use signing::{
    constant_time_compare, MessageAuthenticationService, SignedMessage,
    DEFAULT_SIGNATURE_EXPIRATION_MS,
};
pub use token::TokenEncryptionService;
