//! Byte normalisation for heterogeneous key inputs
//!
//! Every cryptographic operation works on raw bytes. Callers hand us strings
//! (base64 by default, UTF-8 only when asked for), buffers, files or key
//! handles; this module turns all of them into `Vec<u8>`.

use std::path::PathBuf;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// An opaque key handle, mirroring what a platform keystore hands out.
#[derive(Clone)]
pub enum KeyHandle {
    /// Exported as SPKI DER. Public keys are always extractable.
    Public(RsaPublicKey),
    /// Exported as PKCS#8 DER.
    Private { key: RsaPrivateKey, extractable: bool },
    /// Symmetric key, exported raw.
    Secret {
        bytes: Zeroizing<Vec<u8>>,
        extractable: bool,
    },
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyHandle::Public(_) => f.debug_tuple("Public").finish(),
            KeyHandle::Private { extractable, .. } => f
                .debug_struct("Private")
                .field("key", &"[REDACTED]")
                .field("extractable", extractable)
                .finish(),
            KeyHandle::Secret { extractable, .. } => f
                .debug_struct("Secret")
                .field("bytes", &"[REDACTED]")
                .field("extractable", extractable)
                .finish(),
        }
    }
}

/// Any input that can be turned into key bytes.
#[derive(Debug, Clone)]
pub enum RawKeyMaterial {
    /// Explicit UTF-8 text (lossy by nature: the bytes are the text encoding)
    Text(String),
    /// Base64 encoded bytes; plain strings default to this
    Base64(String),
    Bytes(Vec<u8>),
    /// A file-backed blob, read asynchronously
    Blob(PathBuf),
    Key(KeyHandle),
}

impl From<&str> for RawKeyMaterial {
    fn from(s: &str) -> Self {
        RawKeyMaterial::Base64(s.to_string())
    }
}

impl From<String> for RawKeyMaterial {
    fn from(s: String) -> Self {
        RawKeyMaterial::Base64(s)
    }
}

impl From<Vec<u8>> for RawKeyMaterial {
    fn from(bytes: Vec<u8>) -> Self {
        RawKeyMaterial::Bytes(bytes)
    }
}

impl From<&[u8]> for RawKeyMaterial {
    fn from(bytes: &[u8]) -> Self {
        RawKeyMaterial::Bytes(bytes.to_vec())
    }
}

impl From<KeyHandle> for RawKeyMaterial {
    fn from(key: KeyHandle) -> Self {
        RawKeyMaterial::Key(key)
    }
}

impl RawKeyMaterial {
    /// Interpret a loosely typed JSON value: strings are base64, arrays of
    /// numbers are byte buffers. Anything else is rejected.
    pub fn from_json(value: &Value) -> CryptoResult<Self> {
        match value {
            Value::String(s) => Ok(RawKeyMaterial::Base64(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| {
                            CryptoError::UnsupportedInput(format!("not a byte value: {v}"))
                        })
                })
                .collect::<CryptoResult<Vec<u8>>>()
                .map(RawKeyMaterial::Bytes),
            other => Err(CryptoError::UnsupportedInput(format!(
                "expected string or byte array, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Synchronous normalisation. Blobs need I/O and are rejected here; use
    /// [`normalize_to_buffer`] for them.
    pub fn to_bytes(&self) -> CryptoResult<Vec<u8>> {
        match self {
            RawKeyMaterial::Text(s) => Ok(s.as_bytes().to_vec()),
            RawKeyMaterial::Base64(s) => base64_to_buffer(s),
            RawKeyMaterial::Bytes(b) => Ok(b.clone()),
            RawKeyMaterial::Blob(path) => Err(CryptoError::UnsupportedInput(format!(
                "blob {} must be read asynchronously",
                path.display()
            ))),
            RawKeyMaterial::Key(handle) => export_key(handle),
        }
    }
}

/// Normalise any supported input to bytes.
pub async fn normalize_to_buffer(input: &RawKeyMaterial) -> CryptoResult<Vec<u8>> {
    match input {
        RawKeyMaterial::Blob(path) => tokio::fs::read(path).await.map_err(|e| {
            CryptoError::UnsupportedInput(format!("reading blob {}: {e}", path.display()))
        }),
        other => other.to_bytes(),
    }
}

pub fn buffer_to_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode base64, accepting the url-safe alphabet and missing padding as well.
pub fn base64_to_buffer(s: &str) -> CryptoResult<Vec<u8>> {
    let s = s.trim();
    STANDARD
        .decode(s)
        .or_else(|_| URL_SAFE.decode(s))
        .or_else(|_| STANDARD_NO_PAD.decode(s))
        .or_else(|_| URL_SAFE_NO_PAD.decode(s))
        .map_err(CryptoError::from)
}

fn export_key(handle: &KeyHandle) -> CryptoResult<Vec<u8>> {
    match handle {
        KeyHandle::Public(key) => key
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::Encoding(format!("SPKI export: {e}"))),
        KeyHandle::Private { extractable: false, .. } => Err(CryptoError::KeyExtraction(
            "private key handle is marked non-extractable".into(),
        )),
        KeyHandle::Private { key, .. } => key
            .to_pkcs8_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::Encoding(format!("PKCS#8 export: {e}"))),
        KeyHandle::Secret { extractable: false, .. } => Err(CryptoError::KeyExtraction(
            "secret key handle is marked non-extractable".into(),
        )),
        KeyHandle::Secret { bytes, .. } => Ok(bytes.to_vec()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
