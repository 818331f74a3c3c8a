//! Selectively encrypted metadata tags
//!
//! Tags are flat `name=value` strings. For names in the encrypt set the value
//! becomes `base64(nonce(13) || ciphertext || tag)`, a single field because
//! the transport has nowhere else to put the nonce. Flag tags carry no `=`.

use std::collections::{BTreeMap, BTreeSet};

use crate::aead::{decrypt_prefixed, encrypt_aead};
use crate::codec::{base64_to_buffer, buffer_to_base64};
use crate::error::{CryptoError, CryptoResult};

/// Input to [`encrypt_tag`]. Without `tag`, `data` is split on its first `=`.
#[derive(Clone, Copy)]
pub struct TagInput<'a> {
    pub tag: Option<&'a str>,
    pub data: &'a str,
    pub key: &'a [u8],
    pub encrypt_set: &'a BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedTag {
    pub tag: String,
    pub value: Vec<u8>,
}

pub fn encrypt_tag(input: TagInput<'_>) -> CryptoResult<String> {
    let (tag, data) = match input.tag {
        Some(tag) => (tag, input.data),
        None => input.data.split_once('=').unwrap_or(("", input.data)),
    };

    let payload = if !tag.is_empty() && input.encrypt_set.contains(tag) {
        let out = encrypt_aead(input.key, data.as_bytes(), None)?;
        buffer_to_base64(&out.to_prefixed())
    } else {
        data.to_string()
    };

    if tag.is_empty() {
        Ok(payload)
    } else {
        Ok(format!("{tag}={payload}"))
    }
}

/// Decode one tag. Values of tags outside `decrypt_set` are returned as-is;
/// a flag tag yields its name and an empty value.
pub fn decrypt_tag(
    encoded: &str,
    key: &[u8],
    decrypt_set: &BTreeSet<String>,
) -> CryptoResult<DecryptedTag> {
    let Some((tag, payload)) = encoded.split_once('=') else {
        return Ok(DecryptedTag {
            tag: encoded.to_string(),
            value: Vec::new(),
        });
    };

    let value = if decrypt_set.contains(tag) {
        let raw = base64_to_buffer(payload)
            .map_err(|e| CryptoError::Decryption(format!("tag '{tag}': {e}")))?;
        decrypt_prefixed(key, &raw)?
    } else {
        payload.as_bytes().to_vec()
    };

    Ok(DecryptedTag {
        tag: tag.to_string(),
        value,
    })
}

/// Group tags by name, decrypting those in `decrypt_set`. Flags appear as
/// names with no values.
pub fn extract_tags<'a, I>(
    tags: I,
    key: &[u8],
    decrypt_set: &BTreeSet<String>,
) -> CryptoResult<BTreeMap<String, Vec<String>>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for encoded in tags {
        let decoded = decrypt_tag(encoded, key, decrypt_set)?;
        let entry = grouped.entry(decoded.tag.clone()).or_default();
        if encoded.contains('=') {
            let value = String::from_utf8(decoded.value).map_err(|_| {
                CryptoError::Decryption(format!("tag '{}' is not valid UTF-8", decoded.tag))
            })?;
            entry.push(value);
        }
    }
    Ok(grouped)
}
