//! Config-specific merge: applying [`ConfigInput`] patches
//!
//! Each top-level field has its own rule. Maps go through
//! [`merge_delete_maps`]; permission lists replace whole but equal lists
//! are not counted. The merged state is re-validated by
//! [`clean_config`]; a rejection there is a bug, not a user error.

use std::collections::BTreeMap;

use tracing::debug;

use crate::clean::{clean_config, is_valid_link};
use crate::error::{ConfigError, ConfigResult};
use crate::input::{
    CertificateInput, ClusterInput, ConfigInput, ContentInput, HostInput, TokenInput,
    TrustedKeyInput,
};
use crate::merge::{
    merge_delete_maps, merge_scalar, replace_list, replace_set, Patch, PatchMap,
};
use crate::model::{
    Certificate, Config, ConfigCluster, ConfigContent, Host, Token, TrustedKey,
    DEFAULT_CERTIFICATE_ALGORITHM, TRUST_LEVELS,
};

/// Apply `patch` to `config`, returning the new config and the number of
/// changes. `config` itself is never modified.
pub fn update_config(config: &Config, patch: &ConfigInput) -> ConfigResult<(Config, usize)> {
    let mut changes = 0;

    let (base_url, n) = merge_scalar(&config.base_url().to_string(), patch.base_url.as_ref());
    changes += n;
    let (config_cluster, n) = merge_scalar(
        &config.config_cluster().to_string(),
        patch.config_cluster.as_ref(),
    );
    changes += n;
    let (config_lock_url, n) = merge_scalar(
        &config.config_lock_url().to_string(),
        patch.config_lock_url.as_ref(),
    );
    changes += n;

    let (hosts, n) = apply_map(config.hosts(), patch.hosts.as_ref(), merge_host)?;
    changes += n;
    let (tokens, n) = apply_map(config.tokens(), patch.tokens.as_ref(), merge_token)?;
    changes += n;
    let (certificates, n) = apply_map(
        config.certificates(),
        patch.certificates.as_ref(),
        merge_certificate,
    )?;
    changes += n;
    let (trusted_keys, n) = apply_map(
        config.trusted_keys(),
        patch.trusted_keys.as_ref(),
        merge_trusted_key,
    )?;
    changes += n;
    let (sign_with, n) = apply_map(config.sign_with(), patch.sign_with.as_ref(), |_, current, next| {
        Ok(replace_set(current, next))
    })?;
    changes += n;

    let mut slots = config.slots().to_vec();
    if let Some(next) = patch.slots.as_ref().filter(|s| !s.is_empty()) {
        if *next != slots {
            slots = next.clone();
            changes += 1;
        }
    }

    let (question, answer) = config.config_security_question();
    let mut security_question = (question.to_string(), answer.to_string());
    if let Some([q, a]) = patch.config_security_question.as_deref() {
        if (q, a) != (&security_question.0, &security_question.1) {
            security_question = (q.clone(), a.clone());
            changes += 1;
        }
    }

    let merged = Config::from_parts(
        base_url,
        config_cluster,
        hosts,
        tokens,
        certificates,
        trusted_keys,
        slots,
        sign_with,
        config_lock_url,
        security_question,
    );
    let (cleaned, migrated) = clean_config(merged.to_json()?, None);
    let Some(cleaned) = cleaned else {
        return Err(ConfigError::Invariant(
            "merged config failed validation".into(),
        ));
    };
    if migrated {
        changes += 1;
    }
    debug!(changes, "config updated");
    Ok((cleaned, changes))
}

fn apply_map<V, P, F>(
    target: &BTreeMap<String, V>,
    patch: Option<&PatchMap<P>>,
    handler: F,
) -> ConfigResult<(BTreeMap<String, V>, usize)>
where
    V: Clone,
    F: FnMut(&str, Option<&V>, &P) -> ConfigResult<(V, usize)>,
{
    match patch {
        Some(patch) => merge_delete_maps(target, patch, handler),
        None => Ok((target.clone(), 0)),
    }
}

fn merge_hashes(
    current: &BTreeMap<String, Vec<String>>,
    patch: Option<&PatchMap<Vec<String>>>,
) -> ConfigResult<(BTreeMap<String, Vec<String>>, usize)> {
    apply_map(current, patch, |_, current, next| Ok(replace_list(current, next)))
}

fn merge_cluster(
    _id: &str,
    current: Option<&ConfigCluster>,
    patch: &ClusterInput,
) -> ConfigResult<(ConfigCluster, usize)> {
    let current = current.cloned().unwrap_or_default();
    let (hashes, changes) = merge_hashes(&current.hashes, patch.hashes.as_ref())?;
    Ok((ConfigCluster { hashes }, changes))
}

fn merge_content(
    id: &str,
    current: Option<&ConfigContent>,
    patch: &ContentInput,
) -> ConfigResult<(ConfigContent, usize)> {
    let current = current.cloned().unwrap_or_default();
    let (hashes, mut changes) = merge_hashes(&current.hashes, patch.hashes.as_ref())?;
    let (cluster, n) = merge_scalar(&current.cluster, patch.cluster.as_ref());
    changes += n;
    if cluster.is_empty() {
        return Err(ConfigError::InvalidMerge(format!(
            "content {id} has no cluster"
        )));
    }
    Ok((ConfigContent { hashes, cluster }, changes))
}

fn merge_host(
    _url: &str,
    current: Option<&Host>,
    patch: &HostInput,
) -> ConfigResult<(Host, usize)> {
    let current = current.cloned().unwrap_or_default();
    let (clusters, n) = apply_map(&current.clusters, patch.clusters.as_ref(), merge_cluster)?;
    let (contents, m) = apply_map(&current.contents, patch.contents.as_ref(), merge_content)?;
    Ok((Host { clusters, contents }, n + m))
}

fn required_data(field: &str, hash: &str, data: String) -> ConfigResult<String> {
    if data.is_empty() {
        return Err(ConfigError::InvalidMerge(format!("{field} {hash} has no data")));
    }
    Ok(data)
}

fn merge_token(
    hash: &str,
    current: Option<&Token>,
    patch: &TokenInput,
) -> ConfigResult<(Token, usize)> {
    let current = current.cloned().unwrap_or_else(|| Token {
        data: String::new(),
        note: String::new(),
        system: false,
    });
    let (data, a) = merge_scalar(&current.data, patch.data.as_ref());
    let (note, b) = merge_scalar(&current.note, patch.note.as_ref());
    let (system, c) = merge_scalar(&current.system, patch.system.as_ref());
    let data = required_data("token", hash, data)?;
    Ok((Token { data, note, system }, a + b + c))
}

fn merge_certificate(
    hash: &str,
    current: Option<&Certificate>,
    patch: &CertificateInput,
) -> ConfigResult<(Certificate, usize)> {
    let current = current.cloned().unwrap_or_else(|| Certificate {
        data: String::new(),
        note: String::new(),
        algorithm: DEFAULT_CERTIFICATE_ALGORITHM.to_string(),
    });
    let (data, a) = merge_scalar(&current.data, patch.data.as_ref());
    let (note, b) = merge_scalar(&current.note, patch.note.as_ref());
    let (algorithm, c) = merge_scalar(&current.algorithm, patch.algorithm.as_ref());
    let data = required_data("certificate", hash, data)?;
    Ok((
        Certificate {
            data,
            note,
            algorithm,
        },
        a + b + c,
    ))
}

fn merge_trusted_key(
    hash: &str,
    current: Option<&TrustedKey>,
    patch: &TrustedKeyInput,
) -> ConfigResult<(TrustedKey, usize)> {
    let missing = |field: &str| {
        ConfigError::InvalidMerge(format!("trusted key {hash} is missing {field}"))
    };
    let mut changes = 0;

    let links = match (&patch.links, current) {
        (Some(next), current) => {
            let mut deduped: Vec<String> = Vec::with_capacity(next.len());
            for link in next {
                if !is_valid_link(link) {
                    return Err(ConfigError::InvalidMerge(format!(
                        "trusted key {hash} has invalid link {link}"
                    )));
                }
                if !deduped.contains(link) {
                    deduped.push(link.clone());
                }
            }
            let (links, n) = replace_list(current.map(|c| &c.links), &deduped);
            changes += n;
            links
        }
        (None, Some(current)) => current.links.clone(),
        (None, None) => return Err(missing("links")),
    };
    let note = match (&patch.note, current) {
        (Some(next), Some(c)) => {
            let (note, n) = merge_scalar(&c.note, Some(next));
            changes += n;
            note
        }
        (Some(next), None) => next.clone(),
        (None, Some(c)) => c.note.clone(),
        (None, None) => return Err(missing("note")),
    };
    let level = match (patch.level, current) {
        (Some(next), Some(c)) => {
            let (level, n) = merge_scalar(&c.level, Some(&next));
            changes += n;
            level
        }
        (Some(next), None) => next,
        (None, Some(c)) => c.level,
        (None, None) => return Err(missing("level")),
    };
    if !TRUST_LEVELS.contains(&level) {
        return Err(ConfigError::InvalidMerge(format!(
            "trusted key {hash} has invalid level {level}"
        )));
    }
    let last_checked = match (patch.last_checked, current) {
        (Some(next), Some(c)) => {
            let (last_checked, n) = merge_scalar(&c.last_checked, Some(&next));
            changes += n;
            last_checked
        }
        (Some(next), None) => next,
        (None, Some(c)) => c.last_checked,
        (None, None) => return Err(missing("lastChecked")),
    };

    Ok((
        TrustedKey {
            links,
            note,
            level,
            last_checked,
        },
        changes,
    ))
}

/// Fold `patches` left to right into one patch equivalent to applying them
/// in sequence.
pub fn merge_updates(patches: &[ConfigInput]) -> ConfigInput {
    patches
        .iter()
        .fold(ConfigInput::default(), |acc, next| acc.compose(next))
}

/// True when `patch` cannot change any config.
pub fn is_update_empty(patch: &ConfigInput) -> bool {
    patch.is_noop()
}


#[cfg(test)]
mod proptest_suite {
    use super::*;
    use proptest::prelude::*;

    fn permissions() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            prop::sample::select(vec!["view", "update", "manage", "delete"]),
            0..4,
        )
        .prop_map(|perms| perms.into_iter().map(String::from).collect())
    }

    proptest! {
        #[test]
        fn update_twice_counts_nothing(
            hashes in prop::collection::btree_map("[a-z]{1,6}", permissions(), 0..5),
            note in "[ -~]{0,16}",
        ) {
            let hashes: PatchMap<Vec<String>> =
                hashes.into_iter().map(|(h, p)| (h, Some(p))).collect();
            let tokens: PatchMap<TokenInput> = hashes
                .keys()
                .map(|h| {
                    (h.clone(), Some(TokenInput {
                        data: Some(format!("data-{h}")),
                        note: Some(note.clone()),
                        system: None,
                    }))
                })
                .collect();
            let cluster = ClusterInput { hashes: Some(hashes) };
            let host = HostInput {
                clusters: Some(PatchMap::from([("c1".to_string(), Some(cluster))])),
                contents: None,
            };
            let update = ConfigInput {
                hosts: Some(PatchMap::from([("https://h/".to_string(), Some(host))])),
                tokens: Some(tokens),
                ..Default::default()
            };

            let start = Config::new("https://h/", "c1");
            let (once, _) = update_config(&start, &update).unwrap();
            let (twice, changes) = update_config(&once, &update).unwrap();
            prop_assert_eq!(changes, 0);
            prop_assert_eq!(once, twice);
        }
    }
}
