//! Re-verification of trusted keys against their remembered links

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::input::{ConfigInput, TrustedKeyInput};
use crate::merge::PatchMap;
use crate::model::{Config, TrustedKey};
use crate::transport::{FetchRequest, Transport, HEADER_STATE};
use sgconf_crypto::{compute_hash, split_tagged_hash, HashAlgorithm};

/// Keys checked within this window are skipped
pub const DEFAULT_RECHECK_SECS: i64 = 24 * 60 * 60;

/// `X-STATE` values under which a link stays trusted
pub const TRUSTED_STATES: [&str; 3] = ["public", "trusted", "required"];

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct PruneRequest<'a> {
    pub config: &'a Config,
    /// Only these keys (all when `None`)
    pub target_hashes: Option<BTreeSet<String>>,
    /// Only keys last checked before this time (unix seconds)
    pub last_checked_before: i64,
    /// Require fetched content to hash to the key's digest
    pub validate_hash: bool,
    /// Stamped as `lastChecked` on keys that keep a link
    pub now: i64,
}

impl<'a> PruneRequest<'a> {
    pub fn new(config: &'a Config) -> Self {
        let now = unix_now();
        Self {
            config,
            target_hashes: None,
            last_checked_before: now - DEFAULT_RECHECK_SECS,
            validate_hash: false,
            now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkVerdict {
    Keep,
    Drop,
}

fn digest_matches(key_hash: &str, body: &[u8]) -> bool {
    match split_tagged_hash(key_hash) {
        Ok((Some(algorithm), digest)) => compute_hash(body, algorithm) == digest,
        Ok((None, digest)) => HashAlgorithm::ALL
            .iter()
            .any(|algorithm| compute_hash(body, *algorithm) == digest),
        Err(e) => {
            warn!(key_hash, error = %e, "cannot validate key hash");
            false
        }
    }
}

async fn probe_link<T: Transport>(
    transport: &T,
    key_hash: &str,
    link: &str,
    validate_hash: bool,
) -> LinkVerdict {
    let response = match transport.fetch(FetchRequest::get(link)).await {
        Ok(response) => response,
        Err(e) => {
            warn!(link, error = %e, "dropping unreachable link");
            return LinkVerdict::Drop;
        }
    };
    if response.is_server_error() {
        debug!(link, status = response.status, "server error, keeping link");
        return LinkVerdict::Keep;
    }
    if !response.is_success() {
        warn!(link, status = response.status, "dropping failed link");
        return LinkVerdict::Drop;
    }
    if let Some(state) = response.header(HEADER_STATE) {
        if !TRUSTED_STATES.contains(&state) {
            warn!(link, state, "dropping link with untrusted state");
            return LinkVerdict::Drop;
        }
    }
    if validate_hash && !digest_matches(key_hash, &response.body) {
        warn!(link, key_hash, "dropping link whose content does not match");
        return LinkVerdict::Drop;
    }
    LinkVerdict::Keep
}

async fn prune_key<T: Transport>(
    transport: &T,
    key_hash: &str,
    key: &TrustedKey,
    validate_hash: bool,
) -> Vec<String> {
    let verdicts = join_all(
        key.links
            .iter()
            .map(|link| probe_link(transport, key_hash, link, validate_hash)),
    )
    .await;
    key.links
        .iter()
        .zip(verdicts)
        .filter(|(_, verdict)| *verdict == LinkVerdict::Keep)
        .map(|(link, _)| link.clone())
        .collect()
}

/// Probe the links of stale trusted keys and return a patch that keeps the
/// surviving links (stamped with `request.now`) and deletes keys with none.
pub async fn prune_old_trusted_keys<T: Transport>(
    request: PruneRequest<'_>,
    transport: &T,
) -> ConfigInput {
    let stale: Vec<(&String, &TrustedKey)> = request
        .config
        .trusted_keys()
        .iter()
        .filter(|(hash, _)| {
            request
                .target_hashes
                .as_ref()
                .map_or(true, |targets| targets.contains(*hash))
        })
        .filter(|(_, key)| key.last_checked < request.last_checked_before)
        .collect();

    let survivors = join_all(
        stale
            .iter()
            .map(|(hash, key)| prune_key(transport, hash, key, request.validate_hash)),
    )
    .await;

    let mut patch: PatchMap<TrustedKeyInput> = PatchMap::new();
    for ((hash, _), links) in stale.iter().zip(survivors) {
        let entry = if links.is_empty() {
            info!(key_hash = %hash, "trusted key has no valid links left");
            None
        } else {
            Some(TrustedKeyInput {
                links: Some(links),
                last_checked: Some(request.now),
                ..Default::default()
            })
        };
        patch.insert((*hash).clone(), entry);
    }
    debug!(checked = stale.len(), "trusted keys probed");

    ConfigInput {
        trusted_keys: Some(patch),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::MockTransport;
    use crate::transport::FetchResponse;
    use crate::update::update_config;
    use serde_json::json;
    use sgconf_crypto::hash_tagged;

    fn config_with_keys(keys: serde_json::Value) -> Config {
        let patch: ConfigInput = serde_json::from_value(json!({"trustedKeys": keys})).unwrap();
        update_config(&Config::new("https://x/", "c1"), &patch).unwrap().0
    }

    fn request(config: &Config) -> PruneRequest<'_> {
        PruneRequest {
            config,
            target_hashes: None,
            last_checked_before: 100,
            validate_hash: false,
            now: 500,
        }
    }

    #[tokio::test]
    async fn test_link_verdicts() {
        let config = config_with_keys(json!({"k": {
            "links": ["https://ok/", "https://gone/", "https://flaky/", "https://down/", "https://revoked/"],
            "note": "", "level": 1, "lastChecked": 0
        }}));
        let transport = MockTransport::default()
            .with("https://ok/", FetchResponse::ok("x").with_header("X-STATE", "public"))
            .with("https://gone/", FetchResponse { status: 404, ..Default::default() })
            .with("https://flaky/", FetchResponse { status: 503, ..Default::default() })
            .with("https://revoked/", FetchResponse::ok("x").with_header("X-STATE", "protected"));

        let patch = prune_old_trusted_keys(request(&config), &transport).await;
        let entry = patch.trusted_keys.unwrap()["k"].clone().unwrap();
        assert_eq!(
            entry.links.unwrap(),
            vec!["https://ok/", "https://flaky/"]
        );
        assert_eq!(entry.last_checked, Some(500));
    }

    #[tokio::test]
    async fn test_key_without_links_deleted() {
        let config = config_with_keys(json!({"k": {
            "links": ["https://gone/"], "note": "", "level": 2, "lastChecked": 0
        }}));
        let transport = MockTransport::default()
            .with("https://gone/", FetchResponse { status: 410, ..Default::default() });

        let patch = prune_old_trusted_keys(request(&config), &transport).await;
        assert_eq!(patch.trusted_keys.as_ref().unwrap()["k"], None);

        let (pruned, _) = update_config(&config, &patch).unwrap();
        assert!(pruned.trusted_keys().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_only_link_deletes_key() {
        let config = config_with_keys(json!({"k": {
            "links": ["https://down/"], "note": "", "level": 1, "lastChecked": 0
        }}));
        let transport = MockTransport::default();

        let patch = prune_old_trusted_keys(request(&config), &transport).await;
        assert_eq!(patch.trusted_keys.as_ref().unwrap()["k"], None);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_and_untargeted_keys_skipped() {
        let config = config_with_keys(json!({
            "fresh": {"links": ["https://gone/"], "note": "", "level": 1, "lastChecked": 200},
            "other": {"links": ["https://gone/"], "note": "", "level": 1, "lastChecked": 0},
        }));
        let transport = MockTransport::default();
        let mut req = request(&config);
        req.target_hashes = Some(BTreeSet::from(["fresh".to_string()]));

        let patch = prune_old_trusted_keys(req, &transport).await;
        assert!(patch.trusted_keys.unwrap().is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_validate_hash() {
        let body = b"public key bytes";
        let key_hash = hash_tagged(body, HashAlgorithm::Sha256);
        let mut keys = serde_json::Map::new();
        keys.insert(
            key_hash.clone(),
            json!({"links": ["https://good/", "https://bad/"], "note": "", "level": 1, "lastChecked": 0}),
        );
        let config = config_with_keys(keys.into());
        let transport = MockTransport::default()
            .with("https://good/", FetchResponse::ok(body.to_vec()))
            .with("https://bad/", FetchResponse::ok("tampered"));
        let mut req = request(&config);
        req.validate_hash = true;

        let patch = prune_old_trusted_keys(req, &transport).await;
        let entry = patch.trusted_keys.unwrap()[&key_hash].clone().unwrap();
        assert_eq!(entry.links.unwrap(), vec!["https://good/"]);
    }

    #[test]
    fn test_bare_digest_matches_any_algorithm() {
        let digest = compute_hash(b"data", HashAlgorithm::Sha384);
        assert!(digest_matches(&digest, b"data"));
        assert!(!digest_matches("md5:abc", b"data"));
    }
}
