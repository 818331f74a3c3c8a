//! Validation and migration of raw config JSON
//!
//! [`clean_config`] is the only way from untrusted JSON to a [`Config`].
//! It never fails: input that cannot be made valid yields `None`.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::model::{
    Config, RawConfig, DEFAULT_CERTIFICATE_ALGORITHM, DEFAULT_SECURITY_QUESTION, DEFAULT_SLOT,
    TRUST_LEVELS,
};

const REQUIRED_MAPS: [&str; 3] = ["hosts", "tokens", "certificates"];
const REQUIRED_STRINGS: [&str; 2] = ["baseUrl", "configCluster"];

/// Validate and migrate `raw`. Returns the config (or `None` when required
/// fields are missing or malformed) and whether any migration was applied.
/// With a `domain`, host keys, `baseUrl` and trusted-key links are resolved
/// against it.
pub fn clean_config(raw: Value, domain: Option<&str>) -> (Option<Config>, bool) {
    let Value::Object(mut obj) = raw else {
        debug!("config is not an object");
        return (None, false);
    };
    for field in REQUIRED_STRINGS {
        if !obj.get(field).is_some_and(Value::is_string) {
            debug!(field, "config missing required field");
            return (None, false);
        }
    }
    for field in REQUIRED_MAPS {
        if !obj.get(field).is_some_and(Value::is_object) {
            debug!(field, "config missing required field");
            return (None, false);
        }
    }

    let domain = match domain.map(Url::parse).transpose() {
        Ok(domain) => domain,
        Err(e) => {
            warn!(error = %e, "ignoring invalid domain hint");
            None
        }
    };

    let mut changed = backfill(&mut obj);
    changed |= match upgrade_entries(&mut obj, "tokens", &token_defaults()) {
        Some(c) => c,
        None => return (None, false),
    };
    changed |= match upgrade_entries(&mut obj, "certificates", &certificate_defaults()) {
        Some(c) => c,
        None => return (None, false),
    };
    if let Some(domain) = &domain {
        changed |= canonicalize_base_url(&mut obj, domain);
        changed |= canonicalize_hosts(&mut obj, domain);
    }
    if !contents_have_clusters(&obj) {
        debug!("content without owning cluster");
        return (None, false);
    }
    changed |= clean_trusted_links(&mut obj, domain.as_ref());
    if !trusted_keys_valid(&obj) {
        debug!("trusted key with invalid level or link");
        return (None, false);
    }

    match serde_json::from_value::<RawConfig>(Value::Object(obj)) {
        Ok(raw) => (Some(Config::from_raw(raw)), changed),
        Err(e) => {
            debug!(error = %e, "config failed to deserialize");
            (None, false)
        }
    }
}

fn backfill(obj: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    let slots_ok = obj
        .get("slots")
        .and_then(Value::as_array)
        .is_some_and(|slots| !slots.is_empty());
    if !slots_ok {
        obj.insert("slots".into(), json!([DEFAULT_SLOT]));
        changed = true;
    }
    for (field, default) in [
        ("signWith", json!({})),
        ("trustedKeys", json!({})),
        ("configLockUrl", json!("")),
    ] {
        let present = match &default {
            Value::Object(_) => obj.get(field).is_some_and(Value::is_object),
            _ => obj.get(field).is_some_and(Value::is_string),
        };
        if !present {
            obj.insert(field.into(), default);
            changed = true;
        }
    }
    let question_ok = obj
        .get("configSecurityQuestion")
        .and_then(Value::as_array)
        .is_some_and(|q| q.len() == 2 && q.iter().all(Value::is_string));
    if !question_ok {
        obj.insert(
            "configSecurityQuestion".into(),
            json!([DEFAULT_SECURITY_QUESTION.0, DEFAULT_SECURITY_QUESTION.1]),
        );
        changed = true;
    }
    changed
}

fn token_defaults() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert("note".into(), json!(""));
    defaults.insert("system".into(), json!(false));
    defaults
}

fn certificate_defaults() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert("note".into(), json!(""));
    defaults.insert("algorithm".into(), json!(DEFAULT_CERTIFICATE_ALGORITHM));
    defaults
}

/// Upgrade legacy string entries to `{data, ...defaults}` and fill missing
/// defaults. `None` if an entry has no usable `data`.
fn upgrade_entries(
    obj: &mut Map<String, Value>,
    field: &str,
    defaults: &Map<String, Value>,
) -> Option<bool> {
    let entries = obj.get_mut(field)?.as_object_mut()?;
    let mut changed = false;
    for (hash, entry) in entries.iter_mut() {
        if let Some(data) = entry.as_str().map(str::to_owned) {
            let mut upgraded = defaults.clone();
            upgraded.insert("data".into(), Value::String(data));
            *entry = Value::Object(upgraded);
            changed = true;
            continue;
        }
        let Some(record) = entry.as_object_mut() else {
            debug!(field, hash, "entry is neither string nor object");
            return None;
        };
        if !record
            .get("data")
            .and_then(Value::as_str)
            .is_some_and(|data| !data.is_empty())
        {
            debug!(field, hash, "entry without data");
            return None;
        }
        for (key, default) in defaults {
            if !record.contains_key(key) {
                record.insert(key.clone(), default.clone());
                changed = true;
            }
        }
    }
    Some(changed)
}

fn canonical(domain: &Url, value: &str) -> Option<String> {
    domain.join(value).ok().map(String::from)
}

fn canonicalize_base_url(obj: &mut Map<String, Value>, domain: &Url) -> bool {
    let Some(Value::String(base_url)) = obj.get_mut("baseUrl") else {
        return false;
    };
    match canonical(domain, base_url) {
        Some(joined) if joined != *base_url => {
            *base_url = joined;
            true
        }
        _ => false,
    }
}

fn canonicalize_hosts(obj: &mut Map<String, Value>, domain: &Url) -> bool {
    let Some(Value::Object(hosts)) = obj.get_mut("hosts") else {
        return false;
    };
    let mut changed = false;
    let mut canonical_hosts = Map::new();
    for (url, host) in std::mem::take(hosts) {
        let key = match canonical(domain, &url) {
            Some(joined) => {
                changed |= joined != url;
                joined
            }
            None => url,
        };
        match canonical_hosts.get_mut(&key) {
            Some(existing) => {
                merge_host_values(existing, host);
                changed = true;
            }
            None => {
                canonical_hosts.insert(key, host);
            }
        }
    }
    *hosts = canonical_hosts;
    changed
}

/// Fold a duplicate host into `target`: entities are merged, permission
/// lists are unioned.
fn merge_host_values(target: &mut Value, other: Value) {
    match (target, other) {
        (Value::Object(target), Value::Object(other)) => {
            for (key, value) in other {
                match target.get_mut(&key) {
                    Some(existing) => merge_host_values(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(other)) => {
            for item in other {
                if !target.contains(&item) {
                    target.push(item);
                }
            }
        }
        // scalars (content cluster ids): keep the first
        _ => {}
    }
}

fn contents_have_clusters(obj: &Map<String, Value>) -> bool {
    let Some(hosts) = obj.get("hosts").and_then(Value::as_object) else {
        return false;
    };
    hosts
        .values()
        .filter_map(|host| host.get("contents").and_then(Value::as_object))
        .flat_map(|contents| contents.values())
        .all(|content| {
            content
                .get("cluster")
                .and_then(Value::as_str)
                .is_some_and(|cluster| !cluster.is_empty())
        })
}

fn clean_trusted_links(obj: &mut Map<String, Value>, domain: Option<&Url>) -> bool {
    let Some(Value::Object(trusted)) = obj.get_mut("trustedKeys") else {
        return false;
    };
    let mut changed = false;
    for entry in trusted.values_mut() {
        let Some(Value::Array(links)) = entry.get_mut("links") else {
            continue;
        };
        let mut cleaned: Vec<Value> = Vec::with_capacity(links.len());
        for link in links.iter() {
            let link = match (link.as_str(), domain) {
                (Some(s), Some(domain)) => canonical(domain, s)
                    .map(Value::String)
                    .unwrap_or_else(|| link.clone()),
                _ => link.clone(),
            };
            if !cleaned.contains(&link) {
                cleaned.push(link);
            }
        }
        if cleaned != *links {
            *links = cleaned;
            changed = true;
        }
    }
    changed
}

/// Absolute URL or host-relative path
pub(crate) fn is_valid_link(link: &str) -> bool {
    link.starts_with('/') || Url::parse(link).is_ok()
}

/// Levels must be in [`TRUST_LEVELS`] and every link must pass [`is_valid_link`].
fn trusted_keys_valid(obj: &Map<String, Value>) -> bool {
    let Some(Value::Object(trusted)) = obj.get("trustedKeys") else {
        return true;
    };
    trusted.values().all(|entry| {
        let level_ok = entry
            .get("level")
            .and_then(Value::as_u64)
            .and_then(|level| u8::try_from(level).ok())
            .is_some_and(|level| TRUST_LEVELS.contains(&level));
        let links_ok = entry
            .get("links")
            .and_then(Value::as_array)
            .is_some_and(|links| {
                links
                    .iter()
                    .all(|link| link.as_str().is_some_and(is_valid_link))
            });
        level_ok && links_ok
    })
}
