//! The config value and its records
//!
//! `Config` has no public setters: the only way to a modified config is
//! [`crate::update::update_config`], which returns a new value.

use std::collections::BTreeMap;

use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sgconf_crypto::asymmetric::private_key_from_der;
use sgconf_crypto::{base64_to_buffer, CryptoResult};

use crate::clean::clean_config;
use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_SLOT: &str = "main";
pub const DEFAULT_CERTIFICATE_ALGORITHM: &str = "rsa";
pub const DEFAULT_SECURITY_QUESTION: (&str, &str) = (
    "The answer to life, the universe, and everything",
    "The answer is 42",
);

/// A symmetric action key, addressed by its hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub data: String,
    #[serde(default)]
    pub note: String,
    /// System tokens may bypass per-action filtering
    #[serde(default)]
    pub system: bool,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("data", &"[REDACTED]")
            .field("note", &self.note)
            .field("system", &self.system)
            .finish()
    }
}

/// A private key (PKCS#8, base64) used to unwrap shared keys and to sign.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub data: String,
    #[serde(default)]
    pub note: String,
    #[serde(default = "default_certificate_algorithm")]
    pub algorithm: String,
}

fn default_certificate_algorithm() -> String {
    DEFAULT_CERTIFICATE_ALGORITHM.to_string()
}

impl Certificate {
    pub fn private_key(&self) -> CryptoResult<RsaPrivateKey> {
        private_key_from_der(&base64_to_buffer(&self.data)?)
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("data", &"[REDACTED]")
            .field("note", &self.note)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Valid values of [`TrustedKey::level`]
pub const TRUST_LEVELS: std::ops::RangeInclusive<u8> = 1..=3;

/// A remembered key with the places it can be re-verified from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedKey {
    pub links: Vec<String>,
    pub note: String,
    /// 1 (highest) to 3
    pub level: u8,
    /// Unix seconds
    pub last_checked: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCluster {
    #[serde(default)]
    pub hashes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigContent {
    #[serde(default)]
    pub hashes: BTreeMap<String, Vec<String>>,
    /// Owning cluster id, never empty in a valid config
    pub cluster: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub clusters: BTreeMap<String, ConfigCluster>,
    #[serde(default)]
    pub contents: BTreeMap<String, ConfigContent>,
}

/// Deserializing a `Config` runs it through [`crate::clean::clean_config`];
/// JSON that cannot be made valid is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "serde_json::Value")]
pub struct Config {
    base_url: String,
    config_cluster: String,
    hosts: BTreeMap<String, Host>,
    tokens: BTreeMap<String, Token>,
    certificates: BTreeMap<String, Certificate>,
    trusted_keys: BTreeMap<String, TrustedKey>,
    slots: Vec<String>,
    sign_with: BTreeMap<String, Vec<String>>,
    config_lock_url: String,
    config_security_question: (String, String),
}

/// Field-for-field shape of a config, before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawConfig {
    base_url: String,
    config_cluster: String,
    hosts: BTreeMap<String, Host>,
    tokens: BTreeMap<String, Token>,
    certificates: BTreeMap<String, Certificate>,
    trusted_keys: BTreeMap<String, TrustedKey>,
    slots: Vec<String>,
    sign_with: BTreeMap<String, Vec<String>>,
    config_lock_url: String,
    config_security_question: (String, String),
}

impl TryFrom<serde_json::Value> for Config {
    type Error = ConfigError;

    fn try_from(value: serde_json::Value) -> ConfigResult<Self> {
        clean_config(value, None)
            .0
            .ok_or_else(|| ConfigError::Invariant("config failed validation".into()))
    }
}

impl Config {
    /// A fresh config for a newly initialised config cluster.
    pub fn new(base_url: impl Into<String>, config_cluster: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let config_cluster = config_cluster.into();
        let mut host = Host::default();
        host.clusters
            .insert(config_cluster.clone(), ConfigCluster::default());
        Self {
            hosts: BTreeMap::from([(base_url.clone(), host)]),
            base_url,
            config_cluster,
            tokens: BTreeMap::new(),
            certificates: BTreeMap::new(),
            trusted_keys: BTreeMap::new(),
            slots: vec![DEFAULT_SLOT.to_string()],
            sign_with: BTreeMap::new(),
            config_lock_url: String::new(),
            config_security_question: (
                DEFAULT_SECURITY_QUESTION.0.to_string(),
                DEFAULT_SECURITY_QUESTION.1.to_string(),
            ),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config_cluster(&self) -> &str {
        &self.config_cluster
    }

    pub fn hosts(&self) -> &BTreeMap<String, Host> {
        &self.hosts
    }

    pub fn host(&self, url: &str) -> Option<&Host> {
        self.hosts.get(url)
    }

    pub fn tokens(&self) -> &BTreeMap<String, Token> {
        &self.tokens
    }

    pub fn certificates(&self) -> &BTreeMap<String, Certificate> {
        &self.certificates
    }

    pub fn trusted_keys(&self) -> &BTreeMap<String, TrustedKey> {
        &self.trusted_keys
    }

    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    /// The first slot is the one this client signs with.
    pub fn main_slot(&self) -> Option<&str> {
        self.slots.first().map(String::as_str)
    }

    pub fn sign_with(&self) -> &BTreeMap<String, Vec<String>> {
        &self.sign_with
    }

    pub fn config_lock_url(&self) -> &str {
        &self.config_lock_url
    }

    pub fn config_security_question(&self) -> (&str, &str) {
        (
            &self.config_security_question.0,
            &self.config_security_question.1,
        )
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub(crate) fn from_raw(raw: RawConfig) -> Self {
        Self {
            base_url: raw.base_url,
            config_cluster: raw.config_cluster,
            hosts: raw.hosts,
            tokens: raw.tokens,
            certificates: raw.certificates,
            trusted_keys: raw.trusted_keys,
            slots: raw.slots,
            sign_with: raw.sign_with,
            config_lock_url: raw.config_lock_url,
            config_security_question: raw.config_security_question,
        }
    }

    /// Assemble a config from parts. Only the merge engine builds configs
    /// this way, and it validates the result.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        base_url: String,
        config_cluster: String,
        hosts: BTreeMap<String, Host>,
        tokens: BTreeMap<String, Token>,
        certificates: BTreeMap<String, Certificate>,
        trusted_keys: BTreeMap<String, TrustedKey>,
        slots: Vec<String>,
        sign_with: BTreeMap<String, Vec<String>>,
        config_lock_url: String,
        config_security_question: (String, String),
    ) -> Self {
        Self {
            base_url,
            config_cluster,
            hosts,
            tokens,
            certificates,
            trusted_keys,
            slots,
            sign_with,
            config_lock_url,
            config_security_question,
        }
    }
}
