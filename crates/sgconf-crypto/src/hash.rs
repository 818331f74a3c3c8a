//! Hash algorithm registry and content-addressed hashing
//!
//! Tokens and certificates are addressed by `"<algorithm>:<base64 digest>"`.
//! Algorithm names always go through [`HashAlgorithm::from_name`]; an unknown
//! name is an error, never a silent default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::asymmetric::to_public_from_private;
use crate::codec::{buffer_to_base64, KeyHandle, RawKeyMaterial};
use crate::error::{CryptoError, CryptoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 3] = [
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ];

    /// Resolve a registered name. Accepts the canonical name (`sha256`) and
    /// the operation name (`SHA-256`), case-insensitively.
    pub fn from_name(name: &str) -> CryptoResult<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "");
        match normalized.as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(CryptoError::UnknownAlgorithm(name.to_string())),
        }
    }

    /// Canonical name, as used in hash prefixes.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn operation_name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    pub fn bits(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 256,
            HashAlgorithm::Sha384 => 384,
            HashAlgorithm::Sha512 => 512,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HashAlgorithm::from_name(s)
    }
}

impl TryFrom<String> for HashAlgorithm {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        HashAlgorithm::from_name(&value)
    }
}

impl From<HashAlgorithm> for String {
    fn from(value: HashAlgorithm) -> Self {
        value.name().to_string()
    }
}

/// Base64 digest of `data`.
pub fn compute_hash(data: &[u8], algorithm: HashAlgorithm) -> String {
    buffer_to_base64(&algorithm.digest(data))
}

/// `"<algorithm>:<base64 digest>"`
pub fn hash_tagged(data: &[u8], algorithm: HashAlgorithm) -> String {
    format!("{}:{}", algorithm.name(), compute_hash(data, algorithm))
}

/// Hash key material the way it is addressed in a config. Private keys are
/// addressed by their public half, so a certificate and the public key a
/// peer published hash to the same value.
pub fn hash_key_material(material: &RawKeyMaterial, algorithm: HashAlgorithm) -> CryptoResult<String> {
    let bytes = match material {
        RawKeyMaterial::Key(KeyHandle::Private { key, .. }) => {
            RawKeyMaterial::Key(KeyHandle::Public(to_public_from_private(key))).to_bytes()?
        }
        other => other.to_bytes()?,
    };
    Ok(hash_tagged(&bytes, algorithm))
}

/// Split `"algo:digest"` into its parts. A bare digest yields `None` for the
/// algorithm; a registered-looking prefix that is unknown is an error.
pub fn split_tagged_hash(value: &str) -> CryptoResult<(Option<HashAlgorithm>, &str)> {
    match value.split_once(':') {
        Some((algo, digest)) => Ok((Some(HashAlgorithm::from_name(algo)?), digest)),
        None => Ok((None, value)),
    }
}
