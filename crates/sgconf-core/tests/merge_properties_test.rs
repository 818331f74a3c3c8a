//! Patch application laws: idempotence, composition and change counting.

use proptest::prelude::*;
use serde_json::json;
use sgconf_core::{
    is_update_empty, merge_updates, resolve_auth_info, update_config, AuthQuery, Config,
    ConfigInput,
};

fn patch(value: serde_json::Value) -> ConfigInput {
    serde_json::from_value(value).unwrap()
}

fn base() -> Config {
    Config::new("https://example.com/graphql", "c1")
}

#[test]
fn grant_then_revoke_access() {
    let grant = patch(json!({
        "tokens": {"tok": {"data": "dA==", "note": "", "system": false}},
        "hosts": {"https://example.com/graphql": {
            "clusters": {"c1": {"hashes": {"tok": ["manage"]}}}
        }}
    }));
    let (granted, changes) = update_config(&base(), &grant).unwrap();
    assert!(changes >= 2);

    let query = AuthQuery::new("https://example.com/graphql", ["view", "manage"]).clusters(["c1"]);
    let info = resolve_auth_info(&granted, &query);
    assert_eq!(info.tokens, vec!["c1:dA==".to_string()]);

    let revoke = patch(json!({"tokens": {"tok": null}}));
    let (revoked, changes) = update_config(&granted, &revoke).unwrap();
    assert_eq!(changes, 1);
    assert!(resolve_auth_info(&revoked, &query).tokens.is_empty());
}

#[test]
fn reordered_hash_actions_are_not_a_change() {
    let first = patch(json!({"hosts": {"https://example.com/graphql": {
        "clusters": {"c1": {"hashes": {"tok": ["view", "update"]}}}
    }}}));
    let reordered = patch(json!({"hosts": {"https://example.com/graphql": {
        "clusters": {"c1": {"hashes": {"tok": ["update", "view"]}}}
    }}}));
    let (config, _) = update_config(&base(), &first).unwrap();
    let (_, changes) = update_config(&config, &reordered).unwrap();
    assert_eq!(changes, 0);
}

#[test]
fn empty_patches() {
    assert!(is_update_empty(&ConfigInput::default()));
    assert!(is_update_empty(&patch(json!({"slots": []}))));
    assert!(!is_update_empty(&patch(json!({"tokens": {"tok": null}}))));
    assert_eq!(update_config(&base(), &ConfigInput::default()).unwrap().1, 0);
}

fn arb_patch() -> impl Strategy<Value = ConfigInput> {
    let token = prop_oneof![
        Just(serde_json::Value::Null),
        "[a-z]{1,6}".prop_map(|data| json!({"data": data, "note": "", "system": false})),
    ];
    let actions = prop::collection::vec(prop_oneof![Just("view"), Just("manage"), Just("delete")], 1..3);
    (
        prop::collection::btree_map("t[0-3]", token, 0..3),
        prop::collection::btree_map("t[0-3]", actions, 0..3),
    )
        .prop_map(|(tokens, hashes)| {
            patch(json!({
                "tokens": tokens,
                "hosts": {"https://example.com/graphql": {"clusters": {"c1": {"hashes": hashes}}}}
            }))
        })
}

proptest! {
    #[test]
    fn merged_updates_match_sequential_application(a in arb_patch(), b in arb_patch()) {
        let (step, _) = update_config(&base(), &a).unwrap();
        let (sequential, _) = update_config(&step, &b).unwrap();
        let (merged, _) = update_config(&base(), &merge_updates(&[a, b])).unwrap();
        prop_assert_eq!(merged, sequential);
    }

    #[test]
    fn applying_twice_changes_nothing(a in arb_patch()) {
        let (once, _) = update_config(&base(), &a).unwrap();
        let (twice, changes) = update_config(&once, &a).unwrap();
        prop_assert_eq!(changes, 0);
        prop_assert_eq!(twice, once);
    }
}
