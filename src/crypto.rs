//! Symmetric payload encryption for API request/response bodies, plus the
//! constant-time comparisons used by the API security stage.
//!
//! Wire format of an encrypted payload: base64(IV || ciphertext), CBC mode with
//! PKCS#7 padding. The key is the configured API secret, zero-padded or
//! truncated to the cipher's key length.

use aes::{Aes128, Aes256};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use des::TdesEde3;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

/// Supported payload ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
    Aes256Cbc,
    Aes128Cbc,
    TripleDesCbc,
}

impl EncryptionMethod {
    /// Parse the configured method name. `none` or empty disables encryption.
    pub fn from_config(value: &str) -> Result<Option<Self>> {
        match value.trim().to_ascii_uppercase().as_str() {
            "" | "NONE" => Ok(None),
            "AES-256-CBC" => Ok(Some(EncryptionMethod::Aes256Cbc)),
            "AES-128-CBC" => Ok(Some(EncryptionMethod::Aes128Cbc)),
            "3DES-CBC" | "DES-EDE3-CBC" => Ok(Some(EncryptionMethod::TripleDesCbc)),
            other => Err(AppError::Config(format!(
                "Unsupported API_ENCRYPT_METHOD: {}",
                other
            ))),
        }
    }

    /// Name sent back in the `Encryption-Method` response header.
    pub fn name(&self) -> &'static str {
        match self {
            EncryptionMethod::Aes256Cbc => "AES-256-CBC",
            EncryptionMethod::Aes128Cbc => "AES-128-CBC",
            EncryptionMethod::TripleDesCbc => "3DES-CBC",
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            EncryptionMethod::Aes256Cbc => 32,
            EncryptionMethod::Aes128Cbc => 16,
            EncryptionMethod::TripleDesCbc => 24,
        }
    }

    pub fn iv_len(&self) -> usize {
        match self {
            EncryptionMethod::Aes256Cbc | EncryptionMethod::Aes128Cbc => 16,
            EncryptionMethod::TripleDesCbc => 8,
        }
    }
}

/// A configured cipher ready to seal and open payloads.
#[derive(Clone)]
pub struct PayloadCipher {
    method: EncryptionMethod,
    key: Vec<u8>,
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCipher")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl PayloadCipher {
    /// Build a cipher from the shared secret. An empty secret cannot encrypt
    /// anything, so it yields `None`.
    pub fn new(method: EncryptionMethod, secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }
        let mut key = vec![0u8; method.key_len()];
        let bytes = secret.as_bytes();
        let n = bytes.len().min(key.len());
        key[..n].copy_from_slice(&bytes[..n]);
        Some(Self { method, key })
    }

    pub fn method(&self) -> EncryptionMethod {
        self.method
    }

    /// Encrypt with a fresh random IV and return base64(IV || ciphertext).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut iv = vec![0u8; self.method.iv_len()];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = match self.method {
            EncryptionMethod::Aes256Cbc => cbc::Encryptor::<Aes256>::new_from_slices(&self.key, &iv)
                .map_err(cipher_err)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            EncryptionMethod::Aes128Cbc => cbc::Encryptor::<Aes128>::new_from_slices(&self.key, &iv)
                .map_err(cipher_err)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            EncryptionMethod::TripleDesCbc => {
                cbc::Encryptor::<TdesEde3>::new_from_slices(&self.key, &iv)
                    .map_err(cipher_err)?
                    .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
            }
        };

        let mut sealed = Vec::with_capacity(iv.len() + ciphertext.len());
        sealed.extend_from_slice(&iv);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Decrypt a base64(IV || ciphertext) payload.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>> {
        let sealed = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::Validation(format!("Invalid encrypted payload encoding: {}", e)))?;

        let iv_len = self.method.iv_len();
        if sealed.len() <= iv_len {
            return Err(AppError::Validation("Encrypted payload too short".into()));
        }
        let (iv, ciphertext) = sealed.split_at(iv_len);

        let plaintext = match self.method {
            EncryptionMethod::Aes256Cbc => cbc::Decryptor::<Aes256>::new_from_slices(&self.key, iv)
                .map_err(cipher_err)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            EncryptionMethod::Aes128Cbc => cbc::Decryptor::<Aes128>::new_from_slices(&self.key, iv)
                .map_err(cipher_err)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            EncryptionMethod::TripleDesCbc => {
                cbc::Decryptor::<TdesEde3>::new_from_slices(&self.key, iv)
                    .map_err(cipher_err)?
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            }
        };

        plaintext.map_err(|_| AppError::Validation("Decryption failed".into()))
    }
}

fn cipher_err(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Failed to create cipher: {}", e))
}

/// Compare a caller-supplied secret against the expected one in constant time.
///
/// An empty expected secret never matches.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Hex HMAC-SHA256 of `"{client_id}.{timestamp}"`.
pub fn client_signature(secret: &str, client_id: &str, timestamp: &str) -> String {
    let mut mac: Hmac<Sha256> =
        Mac::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(client_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
