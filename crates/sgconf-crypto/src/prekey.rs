//! Password-protected pre-keys
//!
//! Pre-key blob format:
//! ```text
//! [prefix ":"] base64( [13 bytes: nonce][N bytes: AES-GCM(prekey)][16 bytes: tag] )
//! key = PBKDF2(password, salt = nonce)
//! ```
//!
//! Unlocking tries every (pre-key × password) pair. Which pair failed and
//! why is never reported: a wrong password and a corrupt blob look the same.

use secrecy::{ExposeSecret, SecretString};

use crate::aead::{decrypt_prefixed, encrypt_aead, generate_nonce};
use crate::attempt::{all_successes, first_success};
use crate::codec::{base64_to_buffer, buffer_to_base64};
use crate::error::{CryptoError, CryptoResult};
use crate::hash::HashAlgorithm;
use crate::kdf::derive_from_password;
use crate::NONCE_SIZE;

/// A successfully unlocked pre-key.
#[derive(Clone, PartialEq, Eq)]
pub struct PreKeyMatch {
    pub plaintext: Vec<u8>,
    /// Purpose label the blob carried, if any
    pub prefix: Option<String>,
}

impl std::fmt::Debug for PreKeyMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreKeyMatch")
            .field("plaintext", &"[REDACTED]")
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Encrypt `prekey` under `password`. The random nonce doubles as the
/// PBKDF2 salt.
pub fn encrypt_pre_key(
    prekey: &[u8],
    password: &SecretString,
    hash: HashAlgorithm,
    iterations: u32,
    prefix: Option<&str>,
) -> CryptoResult<String> {
    let nonce = generate_nonce();
    let derived = derive_from_password(
        password.expose_secret().as_bytes(),
        &nonce,
        hash,
        iterations,
    )?;
    let out = encrypt_aead(derived.as_bytes(), prekey, Some(&nonce))?;
    let payload = buffer_to_base64(&out.to_prefixed());
    Ok(match prefix {
        Some(prefix) => format!("{prefix}:{payload}"),
        None => payload,
    })
}

fn decrypt_pre_key(
    entry: &str,
    password: &SecretString,
    hash: HashAlgorithm,
    iterations: u32,
) -> CryptoResult<PreKeyMatch> {
    // base64 has no ':', so everything before the last one is the prefix
    let (prefix, payload) = match entry.rsplit_once(':') {
        Some((prefix, payload)) => (Some(prefix.to_string()), payload),
        None => (None, entry),
    };
    let raw = base64_to_buffer(payload)?;
    if raw.len() < NONCE_SIZE {
        return Err(CryptoError::Decryption("pre-key blob too short".into()));
    }
    let derived = derive_from_password(
        password.expose_secret().as_bytes(),
        &raw[..NONCE_SIZE],
        hash,
        iterations,
    )?;
    let plaintext = decrypt_prefixed(derived.as_bytes(), &raw)?;
    Ok(PreKeyMatch { plaintext, prefix })
}

fn pairs<'a>(
    prekeys: &'a [String],
    passwords: &'a [SecretString],
) -> Vec<(&'a str, &'a SecretString)> {
    prekeys
        .iter()
        .flat_map(|prekey| passwords.iter().map(move |pw| (prekey.as_str(), pw)))
        .collect()
}

/// Every pair that decrypts, in (pre-key, password) order.
pub fn decrypt_pre_keys(
    prekeys: &[String],
    passwords: &[SecretString],
    hash: HashAlgorithm,
    iterations: u32,
) -> Vec<PreKeyMatch> {
    all_successes(pairs(prekeys, passwords), |(prekey, password)| {
        decrypt_pre_key(prekey, password, hash, iterations)
    })
}

/// First pair that decrypts, in (pre-key, password) order.
pub fn decrypt_first_pre_key(
    prekeys: &[String],
    passwords: &[SecretString],
    hash: HashAlgorithm,
    iterations: u32,
) -> CryptoResult<PreKeyMatch> {
    decrypt_first_pre_key_with(prekeys, passwords, hash, iterations, Ok::<_, CryptoError>)
}

/// First pair whose decryption is also accepted by `accept`. `accept` may
/// reject an otherwise valid pre-key (wrong purpose, target content does not
/// decrypt with it), in which case the next pair is tried.
pub fn decrypt_first_pre_key_with<T, E, F>(
    prekeys: &[String],
    passwords: &[SecretString],
    hash: HashAlgorithm,
    iterations: u32,
    accept: F,
) -> CryptoResult<T>
where
    T: Send,
    E: std::fmt::Display,
    F: Fn(PreKeyMatch) -> Result<T, E> + Sync + Send,
{
    first_success(pairs(prekeys, passwords), |(prekey, password)| {
        let unlocked = decrypt_pre_key(prekey, password, hash, iterations)
            .map_err(|e| e.to_string())?;
        accept(unlocked).map_err(|e| e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::generate_key;

    const ITERATIONS: u32 = 100;

    fn pw(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_prekey_roundtrip() {
        let prekey = generate_key();
        let blob = encrypt_pre_key(&prekey, &pw("hunter2"), HashAlgorithm::Sha512, ITERATIONS, None)
            .unwrap();
        let found = decrypt_first_pre_key(&[blob], &[pw("hunter2")], HashAlgorithm::Sha512, ITERATIONS)
            .unwrap();
        assert_eq!(found.plaintext, prekey);
        assert_eq!(found.prefix, None);
    }

    #[test]
    fn test_prefix_preserved() {
        let blob = encrypt_pre_key(b"k", &pw("a"), HashAlgorithm::Sha256, ITERATIONS, Some("shared"))
            .unwrap();
        assert!(blob.starts_with("shared:"));
        let found =
            decrypt_first_pre_key(&[blob], &[pw("a")], HashAlgorithm::Sha256, ITERATIONS).unwrap();
        assert_eq!(found.prefix.as_deref(), Some("shared"));
    }

    #[test]
    fn test_prefix_may_contain_colons() {
        let blob = encrypt_pre_key(b"k", &pw("a"), HashAlgorithm::Sha256, ITERATIONS, Some("sha512:abc"))
            .unwrap();
        let found =
            decrypt_first_pre_key(&[blob], &[pw("a")], HashAlgorithm::Sha256, ITERATIONS).unwrap();
        assert_eq!(found.prefix.as_deref(), Some("sha512:abc"));
    }

    #[test]
    fn test_first_among_many() {
        let target = generate_key();
        let blobs = vec![
            encrypt_pre_key(b"other", &pw("x"), HashAlgorithm::Sha512, ITERATIONS, None).unwrap(),
            encrypt_pre_key(&target, &pw("right"), HashAlgorithm::Sha512, ITERATIONS, None).unwrap(),
        ];
        let passwords = vec![pw("wrong"), pw("right")];
        let found =
            decrypt_first_pre_key(&blobs, &passwords, HashAlgorithm::Sha512, ITERATIONS).unwrap();
        assert_eq!(found.plaintext, target);
    }

    #[test]
    fn test_no_match_rejects() {
        let blob =
            encrypt_pre_key(b"secret", &pw("right"), HashAlgorithm::Sha512, ITERATIONS, None).unwrap();
        let result = decrypt_first_pre_key(
            &[blob, "garbage".into()],
            &[pw("wrong1"), pw("wrong2")],
            HashAlgorithm::Sha512,
            ITERATIONS,
        );
        assert!(matches!(result, Err(CryptoError::AllCandidatesFailed { attempts: 4 })));
    }

    #[test]
    fn test_wrong_iterations_rejects() {
        let blob =
            encrypt_pre_key(b"secret", &pw("pw"), HashAlgorithm::Sha512, ITERATIONS, None).unwrap();
        assert!(decrypt_first_pre_key(&[blob], &[pw("pw")], HashAlgorithm::Sha512, ITERATIONS + 1)
            .is_err());
    }

    #[test]
    fn test_decrypt_all_collects_successes() {
        let blobs = vec![
            encrypt_pre_key(b"one", &pw("a"), HashAlgorithm::Sha256, ITERATIONS, None).unwrap(),
            encrypt_pre_key(b"two", &pw("b"), HashAlgorithm::Sha256, ITERATIONS, Some("private"))
                .unwrap(),
            "corrupt".to_string(),
        ];
        let found = decrypt_pre_keys(&blobs, &[pw("a"), pw("b")], HashAlgorithm::Sha256, ITERATIONS);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].plaintext, b"one");
        assert_eq!(found[1].plaintext, b"two");
        assert_eq!(found[1].prefix.as_deref(), Some("private"));
    }

    #[test]
    fn test_accept_can_disqualify() {
        let blobs = vec![
            encrypt_pre_key(b"decoy", &pw("pw"), HashAlgorithm::Sha256, ITERATIONS, Some("private"))
                .unwrap(),
            encrypt_pre_key(b"real", &pw("pw"), HashAlgorithm::Sha256, ITERATIONS, Some("shared"))
                .unwrap(),
        ];
        let found = decrypt_first_pre_key_with(
            &blobs,
            &[pw("pw")],
            HashAlgorithm::Sha256,
            ITERATIONS,
            |m| {
                if m.prefix.as_deref() == Some("shared") {
                    Ok(m.plaintext)
                } else {
                    Err("wrong purpose")
                }
            },
        )
        .unwrap();
        assert_eq!(found, b"real");
    }

    #[test]
    fn test_debug_redacts_plaintext() {
        let m = PreKeyMatch {
            plaintext: b"topsecret".to_vec(),
            prefix: None,
        };
        assert!(!format!("{m:?}").contains("116"));
        assert!(format!("{m:?}").contains("REDACTED"));
    }
}
