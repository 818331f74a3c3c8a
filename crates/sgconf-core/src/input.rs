//! `ConfigInput`: the merge patch for a [`Config`](crate::model::Config)
//!
//! An absent field leaves the config unchanged. Inside maps, a `null` entry
//! deletes the key and a value sets or merges it.

use serde::{Deserialize, Serialize};

use crate::merge::{compose_field, compose_scalar, field_is_noop, Patch, PatchMap};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts: Option<PatchMap<HostInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<PatchMap<TokenInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificates: Option<PatchMap<CertificateInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_keys: Option<PatchMap<TrustedKeyInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_with: Option<PatchMap<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_lock_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_security_question: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<PatchMap<ClusterInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<PatchMap<ContentInput>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<PatchMap<Vec<String>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<PatchMap<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<bool>,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedKeyInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<i64>,
}

impl std::fmt::Debug for TokenInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenInput")
            .field("data", &self.data.as_ref().map(|_| "[REDACTED]"))
            .field("note", &self.note)
            .field("system", &self.system)
            .finish()
    }
}

impl std::fmt::Debug for CertificateInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateInput")
            .field("data", &self.data.as_ref().map(|_| "[REDACTED]"))
            .field("note", &self.note)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl Patch for ConfigInput {
    fn compose(&self, later: &Self) -> Self {
        Self {
            base_url: compose_scalar(&self.base_url, &later.base_url),
            config_cluster: compose_scalar(&self.config_cluster, &later.config_cluster),
            hosts: compose_field(&self.hosts, &later.hosts),
            tokens: compose_field(&self.tokens, &later.tokens),
            certificates: compose_field(&self.certificates, &later.certificates),
            trusted_keys: compose_field(&self.trusted_keys, &later.trusted_keys),
            slots: compose_scalar(&self.slots, &later.slots),
            sign_with: compose_field(&self.sign_with, &later.sign_with),
            config_lock_url: compose_scalar(&self.config_lock_url, &later.config_lock_url),
            config_security_question: compose_scalar(
                &self.config_security_question,
                &later.config_security_question,
            ),
        }
    }

    fn is_noop(&self) -> bool {
        self.base_url.is_none()
            && self.config_cluster.is_none()
            && self.config_lock_url.is_none()
            && field_is_noop(&self.hosts)
            && field_is_noop(&self.tokens)
            && field_is_noop(&self.certificates)
            && field_is_noop(&self.trusted_keys)
            && field_is_noop(&self.sign_with)
            // the merge ignores empty slot lists and malformed questions
            && self.slots.as_ref().map_or(true, |slots| slots.is_empty())
            && self
                .config_security_question
                .as_ref()
                .map_or(true, |question| question.len() != 2)
    }
}

impl Patch for HostInput {
    fn compose(&self, later: &Self) -> Self {
        Self {
            clusters: compose_field(&self.clusters, &later.clusters),
            contents: compose_field(&self.contents, &later.contents),
        }
    }

    fn is_noop(&self) -> bool {
        field_is_noop(&self.clusters) && field_is_noop(&self.contents)
    }
}

impl Patch for ClusterInput {
    fn compose(&self, later: &Self) -> Self {
        Self {
            hashes: compose_field(&self.hashes, &later.hashes),
        }
    }

    fn is_noop(&self) -> bool {
        field_is_noop(&self.hashes)
    }
}

impl Patch for ContentInput {
    fn compose(&self, later: &Self) -> Self {
        Self {
            hashes: compose_field(&self.hashes, &later.hashes),
            cluster: compose_scalar(&self.cluster, &later.cluster),
        }
    }

    fn is_noop(&self) -> bool {
        field_is_noop(&self.hashes) && self.cluster.is_none()
    }
}

impl Patch for TokenInput {
    fn compose(&self, later: &Self) -> Self {
        Self {
            data: compose_scalar(&self.data, &later.data),
            note: compose_scalar(&self.note, &later.note),
            system: compose_scalar(&self.system, &later.system),
        }
    }

    fn is_noop(&self) -> bool {
        self.data.is_none() && self.note.is_none() && self.system.is_none()
    }
}

impl Patch for CertificateInput {
    fn compose(&self, later: &Self) -> Self {
        Self {
            data: compose_scalar(&self.data, &later.data),
            note: compose_scalar(&self.note, &later.note),
            algorithm: compose_scalar(&self.algorithm, &later.algorithm),
        }
    }

    fn is_noop(&self) -> bool {
        self.data.is_none() && self.note.is_none() && self.algorithm.is_none()
    }
}

impl Patch for TrustedKeyInput {
    fn compose(&self, later: &Self) -> Self {
        Self {
            links: compose_scalar(&self.links, &later.links),
            note: compose_scalar(&self.note, &later.note),
            level: compose_scalar(&self.level, &later.level),
            last_checked: compose_scalar(&self.last_checked, &later.last_checked),
        }
    }

    fn is_noop(&self) -> bool {
        self.links.is_none()
            && self.note.is_none()
            && self.level.is_none()
            && self.last_checked.is_none()
    }
}
