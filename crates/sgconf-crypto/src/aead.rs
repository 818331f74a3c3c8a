//! AES-GCM with 13-byte nonces
//!
//! Ciphertext format: `[N bytes: ciphertext][16 bytes: GCM tag]`. The nonce
//! travels separately (header, JSON field) or is prefixed by the caller for
//! compact formats such as encrypted tags.

use aes_gcm::aead::consts::U13;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::{Aes128, Aes256};
use aes_gcm::{AesGcm, Nonce};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

type Aes128Gcm13 = AesGcm<Aes128, U13>;
type Aes256Gcm13 = AesGcm<Aes256, U13>;

/// Result of [`encrypt_aead`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AeadOutput {
    /// Ciphertext with the 16-byte tag appended
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

impl AeadOutput {
    /// `nonce || ciphertext`, the compact single-field form.
    pub fn to_prefixed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }
}

/// Generate a random 256-bit symmetric key.
pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt with AES-GCM. `key` must be 16 or 32 bytes; a random nonce is
/// generated when none is given.
pub fn encrypt_aead(key: &[u8], plaintext: &[u8], nonce: Option<&[u8]>) -> CryptoResult<AeadOutput> {
    let nonce = match nonce {
        Some(n) => to_nonce(n)?,
        None => generate_nonce(),
    };
    let n = Nonce::<U13>::from_slice(&nonce);

    let ciphertext = match key.len() {
        16 => Aes128Gcm13::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            .encrypt(n, plaintext),
        32 => Aes256Gcm13::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            .encrypt(n, plaintext),
        other => return Err(invalid_key_len(other)),
    }
    .map_err(|e| CryptoError::Encryption(format!("AES-GCM: {e}")))?;

    Ok(AeadOutput { ciphertext, nonce })
}

/// Decrypt AES-GCM output. An empty ciphertext decrypts to an empty
/// plaintext without touching the cipher; it marks an empty value.
pub fn decrypt_aead(key: &[u8], ciphertext: &[u8], nonce: &[u8]) -> CryptoResult<Vec<u8>> {
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "ciphertext too short: {} bytes (minimum {TAG_SIZE})",
            ciphertext.len()
        )));
    }
    let nonce = to_nonce(nonce).map_err(|e| CryptoError::Decryption(e.to_string()))?;
    let n = Nonce::<U13>::from_slice(&nonce);

    let result = match key.len() {
        16 => Aes128Gcm13::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            .decrypt(n, ciphertext),
        32 => Aes256Gcm13::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            .decrypt(n, ciphertext),
        other => return Err(invalid_key_len(other)),
    };

    result.map_err(|_| {
        CryptoError::Decryption("authentication failed: wrong key or corrupted data".into())
    })
}

/// Decrypt the compact `nonce || ciphertext` form.
pub fn decrypt_prefixed(key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::Decryption(format!(
            "payload too short for nonce: {} bytes",
            data.len()
        )));
    }
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
    decrypt_aead(key, ciphertext, nonce)
}

fn to_nonce(nonce: &[u8]) -> CryptoResult<[u8; NONCE_SIZE]> {
    nonce.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        ))
    })
}

fn invalid_key_len(len: usize) -> CryptoError {
    CryptoError::InvalidKey(format!("AES-GCM key must be 16 or 32 bytes, got {len}"))
}
