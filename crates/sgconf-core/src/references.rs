//! Locating and unwrapping shared keys for a node
//!
//! A shared key is wrapped once per reader. The wrapped copies live either on
//! a private-key node's own `key=` tag or in the `extra` field of reference
//! edges; the `key_hash=` tags next to them say which certificate can
//! unwrap each copy.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConfigResult;
use crate::model::Config;
use sgconf_crypto::{
    base64_to_buffer, first_success, split_tagged_hash, unwrap_asymmetric, CryptoError,
    HashAlgorithm,
};

pub const KEY_GROUP: &str = "key";
pub const KEY_HASH_TAG: &str = "key_hash";
pub const KEY_TAG: &str = "key";
pub const PRIVATE_KEY_TYPE: &str = "type=PrivateKey";

/// A node as delivered by the graph API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawNode")]
pub struct Node {
    pub id: String,
    pub tags: Vec<String>,
    pub references: Vec<ReferenceEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceEdge {
    pub group: String,
    /// Wrapped key payload carried by the reference
    pub extra: String,
    pub target_tags: Vec<String>,
}

// references: { edges: [ { node: { group, extra, target: { tags } } } ] }
#[derive(Deserialize)]
struct RawNode {
    #[serde(default)]
    id: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    references: RawReferences,
}

#[derive(Default, Deserialize)]
struct RawReferences {
    #[serde(default)]
    edges: Vec<RawEdge>,
}

#[derive(Deserialize)]
struct RawEdge {
    node: RawReference,
}

#[derive(Deserialize)]
struct RawReference {
    #[serde(default)]
    group: String,
    #[serde(default)]
    extra: String,
    #[serde(default)]
    target: RawTarget,
}

#[derive(Default, Deserialize)]
struct RawTarget {
    #[serde(default)]
    tags: Vec<String>,
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        Self {
            id: raw.id,
            tags: raw.tags,
            references: raw
                .references
                .edges
                .into_iter()
                .map(|edge| ReferenceEdge {
                    group: edge.node.group,
                    extra: edge.node.extra,
                    target_tags: edge.node.target.tags,
                })
                .collect(),
        }
    }
}

/// A certificate that may unwrap `shared_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateCandidate {
    /// Key into `config.certificates`
    pub hash: String,
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Base64 wrapped shared key
    pub shared_key: String,
}

fn tag_values<'a>(tags: &'a [String], name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    tags.iter().filter_map(move |tag| {
        tag.split_once('=')
            .filter(|(key, _)| *key == name)
            .map(|(_, value)| value)
    })
}

/// Resolve a `[algo:]hash` tag value against the held certificates.
fn match_certificate(config: &Config, value: &str) -> Option<(String, Option<HashAlgorithm>)> {
    let (algorithm, digest) = match split_tagged_hash(value) {
        Ok(parts) => parts,
        Err(e) => {
            warn!(value, error = %e, "skipping key hash with unknown algorithm");
            return None;
        }
    };
    let certificates = config.certificates();
    if certificates.contains_key(value) {
        return Some((value.to_string(), algorithm));
    }
    if certificates.contains_key(digest) {
        return Some((digest.to_string(), algorithm));
    }
    None
}

/// Collect certificates that could unwrap a shared key of `node` via
/// references in `group`. For a private-key node viewed in the `key` group,
/// its own `key_hash=` and `key=` tags are considered first.
pub fn find_certificate_candidates_for_references(
    config: &Config,
    node: &Node,
    group: &str,
) -> Vec<CertificateCandidate> {
    let mut candidates = Vec::new();

    if group == KEY_GROUP && node.tags.iter().any(|tag| tag == PRIVATE_KEY_TYPE) {
        if let Some(shared_key) = tag_values(&node.tags, KEY_TAG).next() {
            for value in tag_values(&node.tags, KEY_HASH_TAG) {
                if let Some((hash, hash_algorithm)) = match_certificate(config, value) {
                    candidates.push(CertificateCandidate {
                        hash,
                        hash_algorithm,
                        shared_key: shared_key.to_string(),
                    });
                }
            }
        }
    }

    for reference in node.references.iter().filter(|r| r.group == group) {
        for value in tag_values(&reference.target_tags, KEY_HASH_TAG) {
            if let Some((hash, hash_algorithm)) = match_certificate(config, value) {
                candidates.push(CertificateCandidate {
                    hash,
                    hash_algorithm,
                    shared_key: reference.extra.clone(),
                });
            }
        }
    }

    debug!(node = %node.id, group, count = candidates.len(), "certificate candidates");
    candidates
}

/// Try the candidates in order and return the first shared key that
/// unwraps. `Ok(None)` means no held certificate can access the content.
pub fn unwrap_first_shared_key(
    config: &Config,
    candidates: &[CertificateCandidate],
    default_hash: HashAlgorithm,
) -> ConfigResult<Option<Vec<u8>>> {
    let attempts: Vec<&CertificateCandidate> = candidates.iter().collect();
    let result = first_success(attempts, |candidate| {
        let certificate = config
            .certificates()
            .get(&candidate.hash)
            .ok_or_else(|| CryptoError::InvalidKey(format!("no certificate {}", candidate.hash)))?;
        let private_key = certificate.private_key()?;
        let wrapped = base64_to_buffer(&candidate.shared_key)?;
        unwrap_asymmetric(
            &private_key,
            &wrapped,
            candidate.hash_algorithm.unwrap_or(default_hash),
        )
    });
    match result {
        Ok(shared_key) => Ok(Some(shared_key)),
        Err(CryptoError::AllCandidatesFailed { attempts }) => {
            debug!(attempts, "no candidate unwrapped the shared key");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
