//! Permission index: which locally held secrets may act on a target
//!
//! Entities (clusters or contents of one host) map hashes to permission
//! lists. A hash matching a held certificate always counts; a hash matching
//! a held token counts when its permissions intersect the required set.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::error::ConfigResult;
use crate::model::Config;
use sgconf_crypto::base64_to_buffer;

pub const DEFAULT_LIMIT: usize = 100;
pub const MANAGE: &str = "manage";

/// Target and filters for [`resolve_auth_info`].
#[derive(Debug, Clone, Default)]
pub struct AuthQuery {
    pub url: String,
    /// Restrict to these clusters (all clusters of the host when `None`)
    pub clusters: Option<BTreeSet<String>>,
    /// Contents take precedence over clusters when given
    pub contents: Option<BTreeSet<String>>,
    pub require: BTreeSet<String>,
    pub exclude_clusters: BTreeSet<String>,
    /// Only match `system` tokens carrying exactly this note
    pub search_note: Option<String>,
    /// Cap on token matches (default [`DEFAULT_LIMIT`])
    pub limit: Option<usize>,
}

impl AuthQuery {
    pub fn new<I, S>(url: impl Into<String>, require: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url: url.into(),
            require: require.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn clusters<I: IntoIterator<Item = S>, S: Into<String>>(mut self, ids: I) -> Self {
        self.clusters = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn contents<I: IntoIterator<Item = S>, S: Into<String>>(mut self, ids: I) -> Self {
        self.contents = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude_clusters<I: IntoIterator<Item = S>, S: Into<String>>(mut self, ids: I) -> Self {
        self.exclude_clusters = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn search_note(mut self, note: impl Into<String>) -> Self {
        self.search_note = Some(note.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Derived authorization for a query. All lists are sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    /// `"<entityId>:<token data>"`
    pub tokens: Vec<String>,
    pub token_hashes: Vec<String>,
    pub certificate_hashes: Vec<String>,
    /// Entity kinds a token matched on (`Cluster`, `Content`)
    pub types: BTreeSet<String>,
    pub limit_reached: bool,
}

#[derive(Default)]
struct Matches {
    tokens: BTreeSet<String>,
    token_hashes: BTreeSet<String>,
    certificate_hashes: BTreeSet<String>,
    types: BTreeSet<String>,
    limit_reached: bool,
}

pub fn resolve_auth_info(config: &Config, query: &AuthQuery) -> AuthInfo {
    let Some(host) = config.host(&query.url) else {
        debug!(url = %query.url, "no host entry");
        return AuthInfo::default();
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    let entities: Vec<(&str, &str, &BTreeMap<String, Vec<String>>)> = match &query.contents {
        Some(ids) if !ids.is_empty() => host
            .contents
            .iter()
            .filter(|(id, _)| ids.contains(*id))
            .map(|(id, content)| ("Content", id.as_str(), &content.hashes))
            .collect(),
        _ => host
            .clusters
            .iter()
            .filter(|(id, _)| query.clusters.as_ref().map_or(true, |ids| ids.contains(*id)))
            .filter(|(id, _)| !query.exclude_clusters.contains(*id))
            .map(|(id, cluster)| ("Cluster", id.as_str(), &cluster.hashes))
            .collect(),
    };

    // manage acts as an override: look for manage tokens first and widen to
    // the full set only for entities where none matched
    let manage_only: BTreeSet<String> = BTreeSet::from([MANAGE.to_string()]);
    let passes: Vec<&BTreeSet<String>> = if query.require.contains(MANAGE) {
        vec![&manage_only, &query.require]
    } else {
        vec![&query.require]
    };

    let mut matches = Matches::default();
    for (kind, id, hashes) in entities {
        for required in &passes {
            if scan_entity(config, query, limit, kind, id, hashes, required, &mut matches) {
                break;
            }
        }
    }

    AuthInfo {
        tokens: matches.tokens.into_iter().collect(),
        token_hashes: matches.token_hashes.into_iter().collect(),
        certificate_hashes: matches.certificate_hashes.into_iter().collect(),
        types: matches.types,
        limit_reached: matches.limit_reached,
    }
}

/// Scan one entity. Returns whether any token matched, including matches
/// dropped by the limit.
#[allow(clippy::too_many_arguments)]
fn scan_entity(
    config: &Config,
    query: &AuthQuery,
    limit: usize,
    kind: &str,
    id: &str,
    hashes: &BTreeMap<String, Vec<String>>,
    required: &BTreeSet<String>,
    matches: &mut Matches,
) -> bool {
    let mut found = false;
    for (hash, actions) in hashes {
        if config.certificates().contains_key(hash) {
            matches.certificate_hashes.insert(hash.clone());
            continue;
        }
        let Some(token) = config.tokens().get(hash) else {
            continue;
        };
        if let Some(note) = &query.search_note {
            if !token.system || token.note != *note {
                continue;
            }
        }
        if !actions.iter().any(|action| required.contains(action)) {
            continue;
        }
        found = true;
        let entry = format!("{id}:{}", token.data);
        if matches.tokens.contains(&entry) {
            continue;
        }
        if matches.tokens.len() >= limit {
            matches.limit_reached = true;
            continue;
        }
        matches.tokens.insert(entry);
        matches.token_hashes.insert(hash.clone());
        matches.types.insert(kind.to_string());
    }
    found
}

/// Filters for [`extract_private_keys`].
#[derive(Debug, Clone, Default)]
pub struct KeyQuery {
    pub url: String,
    pub clusters: Option<BTreeSet<String>>,
    /// Only keys listed in `signWith` for the main slot
    pub only_sign_keys: bool,
    /// Hashes the caller already holds
    pub source: BTreeSet<String>,
}

/// Decode the certificates referenced by the host's clusters, keyed by hash.
pub fn extract_private_keys(
    config: &Config,
    query: &KeyQuery,
) -> ConfigResult<BTreeMap<String, Vec<u8>>> {
    let mut keys = BTreeMap::new();
    let Some(host) = config.host(&query.url) else {
        return Ok(keys);
    };
    let sign_keys: Option<BTreeSet<&str>> = query.only_sign_keys.then(|| {
        config
            .main_slot()
            .and_then(|slot| config.sign_with().get(slot))
            .map(|hashes| hashes.iter().map(String::as_str).collect())
            .unwrap_or_default()
    });

    let clusters = host
        .clusters
        .iter()
        .filter(|(id, _)| query.clusters.as_ref().map_or(true, |ids| ids.contains(*id)));
    for (_, cluster) in clusters {
        for hash in cluster.hashes.keys() {
            if keys.contains_key(hash) || query.source.contains(hash) {
                continue;
            }
            if sign_keys.as_ref().is_some_and(|allowed| !allowed.contains(hash.as_str())) {
                continue;
            }
            let Some(certificate) = config.certificates().get(hash) else {
                continue;
            };
            keys.insert(hash.clone(), base64_to_buffer(&certificate.data)?);
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ConfigInput;
    use crate::update::update_config;
    use serde_json::json;

    const URL: &str = "https://example.com/graphql";

    fn config_with(patch: serde_json::Value) -> Config {
        let patch: ConfigInput = serde_json::from_value(patch).unwrap();
        update_config(&Config::new(URL, "c1"), &patch).unwrap().0
    }

    fn sample() -> Config {
        config_with(json!({
            "tokens": {
                "th-view": {"data": "tok-view"},
                "th-manage": {"data": "tok-manage", "system": true, "note": "admin"},
                "th-other": {"data": "tok-other"},
            },
            "certificates": {"ch-1": {"data": "Y2VydA=="}},
            "hosts": {URL: {
                "clusters": {
                    "c1": {"hashes": {"th-view": ["view"], "ch-1": [], "th-manage": ["manage"]}},
                    "c2": {"hashes": {"th-other": ["view", "update"]}},
                },
                "contents": {"ct1": {"cluster": "c1", "hashes": {"th-other": ["view"]}}},
            }},
            "signWith": {"main": ["ch-1"]},
        }))
    }

    #[test]
    fn test_cluster_scan() {
        let info = resolve_auth_info(&sample(), &AuthQuery::new(URL, ["view"]));
        assert_eq!(info.tokens, vec!["c1:tok-view", "c2:tok-other"]);
        assert_eq!(info.token_hashes, vec!["th-other", "th-view"]);
        assert_eq!(info.certificate_hashes, vec!["ch-1"]);
        assert!(info.types.contains("Cluster"));
        assert!(!info.limit_reached);
    }

    #[test]
    fn test_contents_take_precedence() {
        let query = AuthQuery::new(URL, ["view"]).contents(["ct1"]).clusters(["c1"]);
        let info = resolve_auth_info(&sample(), &query);
        assert_eq!(info.tokens, vec!["ct1:tok-other"]);
        assert_eq!(info.types, BTreeSet::from(["Content".to_string()]));
    }

    #[test]
    fn test_excluded_clusters_skipped() {
        let query = AuthQuery::new(URL, ["view"]).exclude_clusters(["c2"]);
        let info = resolve_auth_info(&sample(), &query);
        assert_eq!(info.tokens, vec!["c1:tok-view"]);
    }

    #[test]
    fn test_manage_override() {
        let config = config_with(json!({
            "tokens": {"th-m": {"data": "m"}, "th-v": {"data": "v"}},
            "hosts": {URL: {"clusters": {"c1": {"hashes": {
                "th-m": ["manage"], "th-v": ["view"]
            }}}}},
        }));
        // manage requested: the manage pass wins and the view token is not added
        let info = resolve_auth_info(&config, &AuthQuery::new(URL, ["view", "update", "manage"]));
        assert_eq!(info.tokens, vec!["c1:m"]);

        // manage not requested: a manage-only token never matches
        let info = resolve_auth_info(&config, &AuthQuery::new(URL, ["view"]));
        assert_eq!(info.tokens, vec!["c1:v"]);
    }

    #[test]
    fn test_manage_falls_through_to_full_set() {
        let config = config_with(json!({
            "tokens": {"th-v": {"data": "v"}},
            "hosts": {URL: {"clusters": {"c1": {"hashes": {"th-v": ["view"]}}}}},
        }));
        let info = resolve_auth_info(&config, &AuthQuery::new(URL, ["view", "manage"]));
        assert_eq!(info.tokens, vec!["c1:v"]);
    }

    #[test]
    fn test_search_note_requires_system_token() {
        let query = AuthQuery::new(URL, ["manage", "view"]).search_note("admin");
        let info = resolve_auth_info(&sample(), &query);
        assert_eq!(info.tokens, vec!["c1:tok-manage"]);
    }

    #[test]
    fn test_limit_still_collects_certificates() {
        let info = resolve_auth_info(&sample(), &AuthQuery::new(URL, ["view"]).limit(1));
        assert_eq!(info.tokens.len(), 1);
        assert!(info.limit_reached);
        assert_eq!(info.certificate_hashes, vec!["ch-1"]);
    }

    #[test]
    fn test_unknown_host_is_empty() {
        let info = resolve_auth_info(&sample(), &AuthQuery::new("https://other/", ["view"]));
        assert_eq!(info, AuthInfo::default());
    }

    #[test]
    fn test_extract_private_keys() {
        let config = sample();
        let query = KeyQuery {
            url: URL.into(),
            ..Default::default()
        };
        let keys = extract_private_keys(&config, &query).unwrap();
        assert_eq!(keys["ch-1"], b"cert");

        let held = KeyQuery {
            url: URL.into(),
            source: BTreeSet::from(["ch-1".to_string()]),
            ..Default::default()
        };
        assert!(extract_private_keys(&config, &held).unwrap().is_empty());
    }

    #[test]
    fn test_extract_only_sign_keys() {
        let config = config_with(json!({
            "certificates": {"ch-1": {"data": "YQ=="}, "ch-2": {"data": "Yg=="}},
            "hosts": {URL: {"clusters": {"c1": {"hashes": {"ch-1": [], "ch-2": []}}}}},
            "signWith": {"main": ["ch-2"]},
        }));
        let query = KeyQuery {
            url: URL.into(),
            only_sign_keys: true,
            ..Default::default()
        };
        let keys = extract_private_keys(&config, &query).unwrap();
        assert_eq!(keys.keys().collect::<Vec<_>>(), vec!["ch-2"]);
    }
}
