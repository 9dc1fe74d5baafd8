//! Authenticated encryption using AES-256-GCM.
//!
//! The tag is kept detached from the ciphertext because every wire format
//! here stores it as its own field.

use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes256Gcm,
};

use crate::keys::{DerivedKey, Nonce, TAG_LENGTH};
use warden_common::{Error, Result};

/// Ciphertext and its detached authentication tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Encrypted bytes, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// GCM authentication tag.
    pub tag: [u8; TAG_LENGTH],
}

/// Encrypt plaintext with AES-256-GCM under `nonce`.
///
/// # Security
/// - Caller is responsible for never reusing a nonce with the same key
pub fn encrypt(key: &DerivedKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Sealed> {
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce.as_bytes()), b"", &mut buffer)
        .map_err(|_| Error::Crypto("Encryption failed".to_string()))?;

    let mut tag_bytes = [0u8; TAG_LENGTH];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(Sealed {
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypt and authenticate AES-256-GCM ciphertext.
///
/// # Errors
/// - Returns error if the tag does not verify (wrong key, tampered data)
///
/// # Security
/// - Nothing is returned unless authentication succeeds
pub fn decrypt(
    key: &DerivedKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    tag: &[u8; TAG_LENGTH],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce.as_bytes()),
            b"",
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| Error::Crypto("Decryption failed".to_string()))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LENGTH;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = DerivedKey::from_bytes([42u8; KEY_LENGTH]);
        let nonce = Nonce::generate();
        let plaintext = b"Hello, World!";

        let sealed = encrypt(&key, &nonce, plaintext).unwrap();
        let decrypted = decrypt(&key, &nonce, &sealed.ciphertext, &sealed.tag).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(sealed.ciphertext.len(), plaintext.len());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = DerivedKey::from_bytes([1u8; KEY_LENGTH]);
        let key2 = DerivedKey::from_bytes([2u8; KEY_LENGTH]);
        let nonce = Nonce::generate();

        let sealed = encrypt(&key1, &nonce, b"Secret data").unwrap();
        assert!(decrypt(&key2, &nonce, &sealed.ciphertext, &sealed.tag).is_err());
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = DerivedKey::from_bytes([42u8; KEY_LENGTH]);
        let nonce = Nonce::generate();

        let mut sealed = encrypt(&key, &nonce, b"Important data").unwrap();
        sealed.tag[0] ^= 0x01;

        assert!(decrypt(&key, &nonce, &sealed.ciphertext, &sealed.tag).is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let key = DerivedKey::from_bytes([42u8; KEY_LENGTH]);
        let nonce = Nonce::generate();

        let sealed = encrypt(&key, &nonce, b"").unwrap();
        assert!(sealed.ciphertext.is_empty());
        assert_eq!(decrypt(&key, &nonce, &[], &sealed.tag).unwrap(), b"");
    }
}
