//! RSA-OAEP key wrapping and the composite key string format
//!
//! A wrapped key can be reversed with a single string of the form
//! `key`, `algo:key`, `nonce:key` or `algo:nonce:key`. [`CompositeKey::parse`]
//! is the only place that format is decoded.

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};

use crate::aead::decrypt_aead;
use crate::codec::base64_to_buffer;
use crate::error::{CryptoError, CryptoResult};
use crate::hash::HashAlgorithm;
use crate::NONCE_SIZE;

fn oaep(hash: HashAlgorithm) -> Oaep {
    match hash {
        HashAlgorithm::Sha256 => Oaep::new::<Sha256>(),
        HashAlgorithm::Sha384 => Oaep::new::<Sha384>(),
        HashAlgorithm::Sha512 => Oaep::new::<Sha512>(),
    }
}

/// Wrap `data` for the holder of the matching private key.
pub fn wrap_asymmetric(
    public_key: &RsaPublicKey,
    data: &[u8],
    hash: HashAlgorithm,
) -> CryptoResult<Vec<u8>> {
    public_key
        .encrypt(&mut rand::thread_rng(), oaep(hash), data)
        .map_err(|e| CryptoError::Encryption(format!("RSA-OAEP wrap: {e}")))
}

pub fn unwrap_asymmetric(
    private_key: &RsaPrivateKey,
    ciphertext: &[u8],
    hash: HashAlgorithm,
) -> CryptoResult<Vec<u8>> {
    private_key
        .decrypt(oaep(hash), ciphertext)
        .map_err(|_| CryptoError::Decryption("RSA-OAEP unwrap failed: wrong key or corrupted data".into()))
}

/// Recover the public half of a private key.
pub fn to_public_from_private(private_key: &RsaPrivateKey) -> RsaPublicKey {
    RsaPublicKey::from(private_key)
}

pub fn private_key_from_der(der: &[u8]) -> CryptoResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_der(der)
        .map_err(|e| CryptoError::InvalidKey(format!("PKCS#8 private key: {e}")))
}

pub fn public_key_from_der(der: &[u8]) -> CryptoResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(der)
        .map_err(|e| CryptoError::InvalidKey(format!("SPKI public key: {e}")))
}

/// Decoded composite key string.
#[derive(Clone, PartialEq, Eq)]
pub struct CompositeKey {
    pub algorithm: Option<HashAlgorithm>,
    pub nonce: Option<[u8; NONCE_SIZE]>,
    /// Base64 key material (PKCS#8 private key, or raw symmetric key when a
    /// nonce is present)
    pub key_material: String,
}

impl std::fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeKey")
            .field("algorithm", &self.algorithm)
            .field("nonce", &self.nonce.is_some())
            .field("key_material", &"[REDACTED]")
            .finish()
    }
}

impl CompositeKey {
    /// Parse by segment count:
    /// - 1: plain key
    /// - 2: `algo:key`, or `nonce:key` when the first segment is not a
    ///   registered algorithm but decodes to a 13-byte nonce
    /// - 3: `algo:nonce:key`
    pub fn parse(s: &str) -> CryptoResult<Self> {
        let segments: Vec<&str> = s.split(':').collect();
        match segments.as_slice() {
            [key] => Ok(CompositeKey {
                algorithm: None,
                nonce: None,
                key_material: non_empty(key)?,
            }),
            [first, key] => {
                let key_material = non_empty(key)?;
                match HashAlgorithm::from_name(first) {
                    Ok(algorithm) => Ok(CompositeKey {
                        algorithm: Some(algorithm),
                        nonce: None,
                        key_material,
                    }),
                    Err(unknown) => match decode_nonce(first) {
                        Some(nonce) => Ok(CompositeKey {
                            algorithm: None,
                            nonce: Some(nonce),
                            key_material,
                        }),
                        None => Err(unknown),
                    },
                }
            }
            [algo, nonce, key] => {
                let algorithm = HashAlgorithm::from_name(algo)?;
                let nonce = decode_nonce(nonce).ok_or_else(|| {
                    CryptoError::Encoding(format!("composite key nonce must be {NONCE_SIZE} bytes"))
                })?;
                Ok(CompositeKey {
                    algorithm: Some(algorithm),
                    nonce: Some(nonce),
                    key_material: non_empty(key)?,
                })
            }
            _ => Err(CryptoError::UnsupportedInput(format!(
                "composite key has {} segments (expected 1-3)",
                segments.len()
            ))),
        }
    }
}

/// Reverse a wrap using a plain or composite key string. With an embedded
/// nonce the key is symmetric and the payload is AES-GCM; otherwise the key
/// is a PKCS#8 private key and the payload RSA-OAEP, using the embedded hash
/// algorithm or `default_hash`.
pub fn unwrap_with_composite(
    key: &str,
    ciphertext: &[u8],
    default_hash: HashAlgorithm,
) -> CryptoResult<Vec<u8>> {
    let composite = CompositeKey::parse(key)?;
    let material = base64_to_buffer(&composite.key_material)?;
    match composite.nonce {
        Some(nonce) => decrypt_aead(&material, ciphertext, &nonce),
        None => {
            let private_key = private_key_from_der(&material)?;
            unwrap_asymmetric(
                &private_key,
                ciphertext,
                composite.algorithm.unwrap_or(default_hash),
            )
        }
    }
}

fn non_empty(segment: &str) -> CryptoResult<String> {
    if segment.is_empty() {
        return Err(CryptoError::UnsupportedInput("empty key material".into()));
    }
    Ok(segment.to_string())
}

fn decode_nonce(segment: &str) -> Option<[u8; NONCE_SIZE]> {
    base64_to_buffer(segment)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aead::{encrypt_aead, generate_key};
    use crate::codec::buffer_to_base64;
    use rsa::pkcs8::EncodePrivateKey;
    use std::sync::OnceLock;

    /// One key per test binary: generation is the slow part.
    pub(crate) fn test_private_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
    }

    fn private_key_b64() -> String {
        buffer_to_base64(test_private_key().to_pkcs8_der().unwrap().as_bytes())
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let private_key = test_private_key();
        let public_key = to_public_from_private(private_key);
        for hash in HashAlgorithm::ALL {
            let wrapped = wrap_asymmetric(&public_key, b"shared key bytes", hash).unwrap();
            assert_eq!(
                unwrap_asymmetric(private_key, &wrapped, hash).unwrap(),
                b"shared key bytes"
            );
        }
    }

    #[test]
    fn test_unwrap_with_wrong_hash_fails() {
        let private_key = test_private_key();
        let public_key = to_public_from_private(private_key);
        let wrapped = wrap_asymmetric(&public_key, b"data", HashAlgorithm::Sha256).unwrap();
        assert!(unwrap_asymmetric(private_key, &wrapped, HashAlgorithm::Sha512).is_err());
    }

    #[test]
    fn test_parse_plain() {
        let parsed = CompositeKey::parse("a2V5").unwrap();
        assert_eq!(parsed.algorithm, None);
        assert_eq!(parsed.nonce, None);
        assert_eq!(parsed.key_material, "a2V5");
    }

    #[test]
    fn test_parse_algo_key() {
        let parsed = CompositeKey::parse("sha256:a2V5").unwrap();
        assert_eq!(parsed.algorithm, Some(HashAlgorithm::Sha256));
        assert_eq!(parsed.nonce, None);
        assert_eq!(parsed.key_material, "a2V5");
    }

    #[test]
    fn test_parse_nonce_key() {
        let nonce = [7u8; NONCE_SIZE];
        let parsed = CompositeKey::parse(&format!("{}:a2V5", buffer_to_base64(&nonce))).unwrap();
        assert_eq!(parsed.algorithm, None);
        assert_eq!(parsed.nonce, Some(nonce));
    }

    #[test]
    fn test_parse_algo_nonce_key() {
        let nonce = [9u8; NONCE_SIZE];
        let parsed =
            CompositeKey::parse(&format!("SHA-512:{}:a2V5", buffer_to_base64(&nonce))).unwrap();
        assert_eq!(parsed.algorithm, Some(HashAlgorithm::Sha512));
        assert_eq!(parsed.nonce, Some(nonce));
        assert_eq!(parsed.key_material, "a2V5");
    }

    #[test]
    fn test_parse_rejects_bad_forms() {
        assert!(matches!(
            CompositeKey::parse("md5:a2V5"),
            Err(CryptoError::UnknownAlgorithm(_))
        ));
        assert!(CompositeKey::parse("sha256:bm9wZQ==:a2V5").is_err());
        assert!(CompositeKey::parse("a:b:c:d").is_err());
        assert!(CompositeKey::parse("sha256:").is_err());
        assert!(CompositeKey::parse("").is_err());
    }

    #[test]
    fn test_unwrap_with_composite_private_key() {
        let public_key = to_public_from_private(test_private_key());
        let wrapped = wrap_asymmetric(&public_key, b"shared", HashAlgorithm::Sha256).unwrap();

        let composite = format!("sha256:{}", private_key_b64());
        let plain = unwrap_with_composite(&composite, &wrapped, HashAlgorithm::Sha512).unwrap();
        assert_eq!(plain, b"shared");

        // default hash applies to a plain key
        let plain =
            unwrap_with_composite(&private_key_b64(), &wrapped, HashAlgorithm::Sha256).unwrap();
        assert_eq!(plain, b"shared");
    }

    #[test]
    fn test_unwrap_with_composite_symmetric_key() {
        let key = generate_key();
        let out = encrypt_aead(&key, b"symmetric payload", None).unwrap();
        let composite = format!(
            "sha256:{}:{}",
            buffer_to_base64(&out.nonce),
            buffer_to_base64(&key)
        );
        let plain =
            unwrap_with_composite(&composite, &out.ciphertext, HashAlgorithm::Sha512).unwrap();
        assert_eq!(plain, b"symmetric payload");
    }

    #[test]
    fn test_debug_redacts_material() {
        let parsed = CompositeKey::parse("sha256:c2VjcmV0").unwrap();
        assert!(!format!("{parsed:?}").contains("c2VjcmV0"));
    }
}
