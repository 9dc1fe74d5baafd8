//! Common error types for warden.
//!
//! Every variant displays its message verbatim. The messages are part of the
//! public contract and must never contain secrets, keys or caller input.

use thiserror::Error;

/// Top-level error type for warden operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Input had the wrong shape. Raised before any cryptographic work.
    #[error("{0}")]
    Validation(String),

    /// Decryption or authentication failed. Always a fixed message.
    #[error("{0}")]
    Crypto(String),

    /// Message or token is outside its freshness window.
    #[error("{0}")]
    Expired(String),

    /// Rate-limit parameters are out of range.
    #[error("{0}")]
    Configuration(String),

    /// A value could not be written to its wire form.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true for errors raised by input validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Returns true for decrypt/verify failures.
    pub fn is_crypto(&self) -> bool {
        matches!(self, Error::Crypto(_))
    }

    /// Returns true when a freshness window rejected the input.
    pub fn is_expired(&self) -> bool {
        matches!(self, Error::Expired(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_message_verbatim() {
        let err = Error::Crypto("Failed to decrypt payload".to_string());
        assert_eq!(err.to_string(), "Failed to decrypt payload");

        let err = Error::Configuration("Bucket size must be positive".to_string());
        assert_eq!(err.to_string(), "Bucket size must be positive");
    }

    #[test]
    fn test_kind_predicates() {
        assert!(Error::Validation("x".into()).is_validation());
        assert!(Error::Crypto("x".into()).is_crypto());
        assert!(Error::Expired("x".into()).is_expired());
        assert!(!Error::Expired("x".into()).is_crypto());
    }
}
