//! Loading a config from storage, an exported file or a URL
//!
//! "Cannot load with these credentials" is `Ok((None, false))`; only
//! malformed local input is an error.

use std::collections::BTreeMap;
use std::path::PathBuf;

use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::clean::clean_config;
use crate::error::{ConfigError, ConfigResult};
use crate::export::EncryptedExport;
use crate::model::Config;
use crate::settings::{DEFAULT_HASH_ALGORITHM, DEFAULT_ITERATIONS};
use crate::storage::{load_config_sync, Storage};
use crate::transport::{FetchRequest, FetchResponse, Transport, HEADER_ITERATIONS, HEADER_NONCE};
use sgconf_crypto::{
    base64_to_buffer, decrypt_aead, decrypt_first_pre_key_with, decrypt_prefixed,
    decrypt_pre_keys, first_success, CryptoError, HashAlgorithm,
};

pub enum ConfigSource<'a> {
    Storage { storage: &'a dyn Storage, key: &'a str },
    /// A plain or password-encrypted export
    File(PathBuf),
    RemoteUrl(String),
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions<'a> {
    pub passwords: &'a [SecretString],
    /// PBKDF2 hash for pre-keys that do not name one
    pub hash: HashAlgorithm,
    /// Host canonicalization hint for storage and file sources
    pub domain: Option<&'a str>,
}

impl<'a> LoadOptions<'a> {
    pub fn new(passwords: &'a [SecretString]) -> Self {
        Self {
            passwords,
            hash: DEFAULT_HASH_ALGORITHM,
            domain: None,
        }
    }
}

pub async fn load_config<T: Transport>(
    source: ConfigSource<'_>,
    options: &LoadOptions<'_>,
    transport: &T,
) -> ConfigResult<(Option<Config>, bool)> {
    match source {
        ConfigSource::Storage { storage, key } => load_config_sync(storage, key, options.domain),
        ConfigSource::File(path) => {
            let text = tokio::fs::read_to_string(&path).await?;
            load_config_from_text(&text, options)
        }
        ConfigSource::RemoteUrl(url) => load_config_from_url(&url, options, transport).await,
    }
}

/// Parse an export. Encrypted exports are unlocked with `options.passwords`.
pub fn load_config_from_text(
    text: &str,
    options: &LoadOptions<'_>,
) -> ConfigResult<(Option<Config>, bool)> {
    let value: Value = serde_json::from_str(text)?;
    let is_encrypted = ["data", "nonce", "prekeys"]
        .iter()
        .all(|field| value.get(field).is_some());
    if !is_encrypted {
        return Ok(clean_config(value, options.domain));
    }

    let export: EncryptedExport = serde_json::from_value(value)?;
    let data = base64_to_buffer(&export.data)?;
    let nonce = base64_to_buffer(&export.nonce)?;
    let unlocked = decrypt_first_pre_key_with(
        &export.prekeys,
        options.passwords,
        export.hash(),
        export.iterations,
        |main_key| {
            let plaintext = decrypt_aead(&main_key.plaintext, &data, &nonce)?;
            serde_json::from_slice::<Value>(&plaintext)
                .map_err(|e| CryptoError::Decryption(format!("decrypted export is not JSON: {e}")))
        },
    );
    match unlocked {
        Ok(value) => Ok(clean_config(value, options.domain)),
        Err(CryptoError::AllCandidatesFailed { attempts }) => {
            debug!(attempts, "no password unlocks the export");
            Ok((None, false))
        }
        Err(e) => Err(e.into()),
    }
}

/// Credentials lifted out of a config URL.
#[derive(Default)]
struct UrlCredentials {
    /// `(key hash, key)` from `key=[hash:]base64`
    keys: Vec<(Option<String>, Vec<u8>)>,
    prekeys: Vec<String>,
    tokens: Vec<String>,
    iterations: Option<u32>,
}

/// Strip `prekey`, `key`, `token` and `iterations` from the query.
fn split_credentials(raw: &str) -> ConfigResult<(Url, UrlCredentials)> {
    let mut url =
        Url::parse(raw).map_err(|e| ConfigError::Transport(format!("invalid url {raw}: {e}")))?;
    let mut credentials = UrlCredentials::default();
    let mut kept: Vec<(String, String)> = Vec::new();

    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "key" => {
                let (hash, encoded) = match value.rsplit_once(':') {
                    Some((hash, encoded)) => (Some(hash.to_string()), encoded),
                    None => (None, value.as_ref()),
                };
                match base64_to_buffer(encoded) {
                    Ok(key) => credentials.keys.push((hash, key)),
                    Err(e) => warn!(error = %e, "ignoring undecodable key parameter"),
                }
            }
            "prekey" => credentials.prekeys.push(value.into_owned()),
            "token" => credentials.tokens.push(value.into_owned()),
            "iterations" => credentials.iterations = value.parse().ok(),
            _ => kept.push((name.into_owned(), value.into_owned())),
        }
    }

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    Ok((url, credentials))
}

fn domain_of(url: &Url) -> String {
    format!("{}/", url.origin().ascii_serialization())
}

fn parse_config(bytes: &[u8], domain: &str) -> Option<(Config, bool)> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    match clean_config(value, Some(domain)) {
        (Some(config), changed) => Some((config, changed)),
        (None, _) => None,
    }
}

fn decrypt_body(key: &[u8], body: &[u8], nonce: &[u8], domain: &str) -> ConfigResult<(Config, bool)> {
    let plaintext = decrypt_aead(key, body, nonce)?;
    parse_config(&plaintext, domain)
        .ok_or_else(|| ConfigError::Other(anyhow::anyhow!("decrypted body is not a config")))
}

/// Fetch a config from `raw_url`, trying in order: plaintext JSON, direct
/// decryption with the URL's keys and unlocked pre-keys, and a follow-up
/// request for shared keys wrapped under those keys' hashes.
pub async fn load_config_from_url<T: Transport>(
    raw_url: &str,
    options: &LoadOptions<'_>,
    transport: &T,
) -> ConfigResult<(Option<Config>, bool)> {
    let (url, credentials) = split_credentials(raw_url)?;
    let domain = domain_of(&url);
    let request = FetchRequest {
        url: url.to_string(),
        tokens: credentials.tokens.clone(),
        key_hashes: Vec::new(),
    };
    let response = match transport.fetch(request).await {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
            debug!(url = %url, status = response.status, "config fetch rejected");
            return Ok((None, false));
        }
        Err(e) => {
            debug!(url = %url, error = %e, "config fetch failed");
            return Ok((None, false));
        }
    };

    // 1: plaintext
    if let Some((config, changed)) = parse_config(&response.body, &domain) {
        debug!(url = %url, "loaded plaintext config");
        return Ok((Some(config), changed));
    }

    let Some(nonce) = response.header(HEADER_NONCE).and_then(|n| base64_to_buffer(n).ok()) else {
        debug!(url = %url, "encrypted config without nonce header");
        return Ok((None, false));
    };
    let iterations = credentials
        .iterations
        .or_else(|| response.header(HEADER_ITERATIONS).and_then(|i| i.parse().ok()))
        .unwrap_or(DEFAULT_ITERATIONS);

    let mut keys = credentials.keys.clone();
    for unlocked in decrypt_pre_keys(&credentials.prekeys, options.passwords, options.hash, iterations) {
        keys.push((unlocked.prefix.clone(), unlocked.plaintext.clone()));
    }

    // 2: direct decryption
    let direct = first_success(keys.iter().collect(), |(_, key)| {
        decrypt_body(key, &response.body, &nonce, &domain)
    });
    if let Ok((config, changed)) = direct {
        debug!(url = %url, "loaded config with direct key");
        return Ok((Some(config), changed));
    }

    // 3: shared keys wrapped under our key hashes
    let hashed: BTreeMap<&str, &[u8]> = keys
        .iter()
        .filter_map(|(hash, key)| hash.as_deref().map(|h| (h, key.as_slice())))
        .collect();
    if hashed.is_empty() {
        debug!(url = %url, "no strategy could decrypt config");
        return Ok((None, false));
    }
    let follow_up = FetchRequest {
        url: url.to_string(),
        tokens: credentials.tokens.clone(),
        key_hashes: hashed.keys().map(|h| h.to_string()).collect(),
    };
    match transport.fetch(follow_up).await {
        Ok(wrapped) if wrapped.is_success() => {
            Ok(decrypt_with_shared_keys(&wrapped, &hashed, &response, &nonce, &domain)
                .map_or((None, false), |(config, changed)| (Some(config), changed)))
        }
        Ok(wrapped) => {
            debug!(url = %url, status = wrapped.status, "shared key request rejected");
            Ok((None, false))
        }
        Err(e) => {
            debug!(url = %url, error = %e, "shared key request failed");
            Ok((None, false))
        }
    }
}

/// The follow-up response maps key hash to `base64(nonce || AEAD(key,
/// shared key))`.
fn decrypt_with_shared_keys(
    wrapped: &FetchResponse,
    keys: &BTreeMap<&str, &[u8]>,
    response: &FetchResponse,
    nonce: &[u8],
    domain: &str,
) -> Option<(Config, bool)> {
    let entries: BTreeMap<String, String> = match serde_json::from_slice(&wrapped.body) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(error = %e, "shared key response is not a hash map");
            return None;
        }
    };
    let candidates: Vec<(&[u8], &String)> = entries
        .iter()
        .filter_map(|(hash, payload)| keys.get(hash.as_str()).map(|key| (*key, payload)))
        .collect();
    first_success(candidates, |(key, payload)| {
        let shared_key = decrypt_prefixed(key, &base64_to_buffer(payload)?)?;
        decrypt_body(&shared_key, &response.body, nonce, domain)
    })
    .ok()
}
