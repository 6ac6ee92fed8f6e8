//! # Field Encryption
//!
//! Symmetric encryption of single text fields (the email address) into a
//! self-contained token.
//!
//! - **AES-GCM** with the key length selecting AES-128, AES-192 or AES-256
//! - A fresh random 96-bit nonce per call, so encrypting the same plaintext
//!   twice yields different tokens
//! - Token layout: `base64(nonce || ciphertext || tag)`; decryption needs only
//!   the token and the key
//!
//! Callers depend on the [`Encryptor`] trait so batch processing and the user
//! service can be exercised with substitute ciphers.

use std::fmt;

use aes_gcm::aead::generic_array::{typenum::Unsigned, GenericArray};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

type Aes192Gcm = AesGcm<Aes192, aes_gcm::aead::consts::U12>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("invalid encryption key length: {actual} bytes (expected 16, 24 or 32)")]
    InvalidKeyLength { actual: usize },

    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed: token is corrupt or was sealed with another key")]
    DecryptFailed,

    #[error("token is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("token too short: {actual} bytes, need at least {minimum}")]
    TokenTooShort { actual: usize, minimum: usize },

    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,
}

/// Seals and opens single text fields.
pub trait Encryptor: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError>;
    fn decrypt(&self, token: &str) -> Result<String, EncryptionError>;
}

enum CipherKind {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// AES-GCM field encryptor keyed at construction.
pub struct AesGcmEncryptor {
    cipher: CipherKind,
}

impl AesGcmEncryptor {
    /// Build an encryptor from raw key bytes.
    ///
    /// Fails with [`EncryptionError::InvalidKeyLength`] unless the key is 16,
    /// 24 or 32 bytes long.
    pub fn new(key: &[u8]) -> Result<Self, EncryptionError> {
        let invalid = || EncryptionError::InvalidKeyLength { actual: key.len() };
        let cipher = match key.len() {
            16 => CipherKind::Aes128(Aes128Gcm::new_from_slice(key).map_err(|_| invalid())?),
            24 => CipherKind::Aes192(Aes192Gcm::new_from_slice(key).map_err(|_| invalid())?),
            32 => CipherKind::Aes256(Aes256Gcm::new_from_slice(key).map_err(|_| invalid())?),
            _ => return Err(invalid()),
        };
        Ok(Self { cipher })
    }

    /// Key size in bits.
    pub fn key_bits(&self) -> usize {
        match self.cipher {
            CipherKind::Aes128(_) => 128,
            CipherKind::Aes192(_) => 192,
            CipherKind::Aes256(_) => 256,
        }
    }
}

impl fmt::Debug for AesGcmEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmEncryptor")
            .field("key_bits", &self.key_bits())
            .finish_non_exhaustive()
    }
}

impl Encryptor for AesGcmEncryptor {
    fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let sealed = match &self.cipher {
            CipherKind::Aes128(cipher) => seal(cipher, plaintext.as_bytes())?,
            CipherKind::Aes192(cipher) => seal(cipher, plaintext.as_bytes())?,
            CipherKind::Aes256(cipher) => seal(cipher, plaintext.as_bytes())?,
        };
        Ok(STANDARD.encode(sealed))
    }

    fn decrypt(&self, token: &str) -> Result<String, EncryptionError> {
        let data = STANDARD
            .decode(token)
            .map_err(|e| EncryptionError::InvalidEncoding(e.to_string()))?;
        let opened = match &self.cipher {
            CipherKind::Aes128(cipher) => open(cipher, &data)?,
            CipherKind::Aes192(cipher) => open(cipher, &data)?,
            CipherKind::Aes256(cipher) => open(cipher, &data)?,
        };
        String::from_utf8(opened).map_err(|_| EncryptionError::InvalidUtf8)
    }
}

fn seal<C: Aead + AeadCore>(cipher: &C, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut token = Vec::with_capacity(nonce.len() + ciphertext.len());
    token.extend_from_slice(&nonce);
    token.extend_from_slice(&ciphertext);
    Ok(token)
}

fn open<C: Aead + AeadCore>(cipher: &C, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let nonce_len = C::NonceSize::USIZE;
    let minimum = nonce_len + C::TagSize::USIZE;
    if data.len() < minimum {
        return Err(EncryptionError::TokenTooShort {
            actual: data.len(),
            minimum,
        });
    }

    let (nonce, ciphertext) = data.split_at(nonce_len);
    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| EncryptionError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_16: &[u8] = b"0123456789abcdef";
    const KEY_24: &[u8] = b"0123456789abcdef01234567";
    const KEY_32: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_accepts_each_aes_key_size() {
        assert_eq!(AesGcmEncryptor::new(KEY_16).unwrap().key_bits(), 128);
        assert_eq!(AesGcmEncryptor::new(KEY_24).unwrap().key_bits(), 192);
        assert_eq!(AesGcmEncryptor::new(KEY_32).unwrap().key_bits(), 256);
    }

    #[test]
    fn test_rejects_other_key_sizes() {
        for len in [0usize, 1, 15, 17, 31, 33, 64] {
            let key = vec![7u8; len];
            assert_eq!(
                AesGcmEncryptor::new(&key).unwrap_err(),
                EncryptionError::InvalidKeyLength { actual: len }
            );
        }
    }

    #[test]
    fn test_same_plaintext_gives_distinct_tokens() {
        let encryptor = AesGcmEncryptor::new(KEY_32).unwrap();
        let first = encryptor.encrypt("someone@example.com").unwrap();
        let second = encryptor.encrypt("someone@example.com").unwrap();
        assert_ne!(first, second);
        assert_eq!(encryptor.decrypt(&first).unwrap(), "someone@example.com");
        assert_eq!(encryptor.decrypt(&second).unwrap(), "someone@example.com");
    }

    #[test]
    fn test_empty_plaintext() {
        let encryptor = AesGcmEncryptor::new(KEY_24).unwrap();
        let token = encryptor.encrypt("").unwrap();
        assert_eq!(encryptor.decrypt(&token).unwrap(), "");
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() {
        let sealing = AesGcmEncryptor::new(KEY_16).unwrap();
        let other = AesGcmEncryptor::new(b"fedcba9876543210").unwrap();
        let token = sealing.encrypt("private@example.com").unwrap();
        assert_eq!(other.decrypt(&token), Err(EncryptionError::DecryptFailed));
    }

    #[test]
    fn test_malformed_tokens() {
        let encryptor = AesGcmEncryptor::new(KEY_16).unwrap();
        assert!(matches!(
            encryptor.decrypt("not base64!!"),
            Err(EncryptionError::InvalidEncoding(_))
        ));
        assert!(matches!(
            encryptor.decrypt(&STANDARD.encode([1u8, 2, 3])),
            Err(EncryptionError::TokenTooShort { actual: 3, minimum: 28 })
        ));
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let encryptor = AesGcmEncryptor::new(KEY_32).unwrap();
        let token = encryptor.encrypt("someone@example.com").unwrap();
        let mut raw = STANDARD.decode(token).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert_eq!(
            encryptor.decrypt(&STANDARD.encode(raw)),
            Err(EncryptionError::DecryptFailed)
        );
    }

    #[test]
    fn test_debug_hides_key_material() {
        let encryptor = AesGcmEncryptor::new(KEY_16).unwrap();
        let rendered = format!("{encryptor:?}");
        assert!(rendered.contains("128"));
        assert!(!rendered.contains("0123456789abcdef"));
    }
}
