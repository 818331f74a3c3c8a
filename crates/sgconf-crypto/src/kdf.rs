//! Password-based key derivation: PBKDF2-HMAC → AES-GCM key

use pbkdf2::pbkdf2_hmac;
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::HashAlgorithm;
use crate::MAX_DERIVED_BITS;

/// Password-derived key material. Zeroized on drop.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: Vec<u8>,
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bits(&self) -> usize {
        self.bytes.len() * 8
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bits", &self.bits())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive key bits from a password with PBKDF2-HMAC.
///
/// Output is the hash size capped at 256 bits, so the result is always a
/// valid AES-256 key regardless of the hash used.
pub fn derive_from_password(
    password: &[u8],
    salt: &[u8],
    hash: HashAlgorithm,
    iterations: u32,
) -> CryptoResult<DerivedKey> {
    if iterations == 0 {
        return Err(CryptoError::InvalidKey("PBKDF2 iterations must be > 0".into()));
    }
    let len = hash.bits().min(MAX_DERIVED_BITS) / 8;
    let mut bytes = vec![0u8; len];
    match hash {
        HashAlgorithm::Sha256 => pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut bytes),
        HashAlgorithm::Sha384 => pbkdf2_hmac::<Sha384>(password, salt, iterations, &mut bytes),
        HashAlgorithm::Sha512 => pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut bytes),
    }
    Ok(DerivedKey { bytes })
}
