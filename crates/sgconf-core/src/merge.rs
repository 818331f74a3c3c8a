//! Deletion-aware map merging
//!
//! Patches are maps whose entries are `Option<P>`: `None` (JSON `null`)
//! deletes the key, `Some(p)` sets or merges it. A key absent from the patch
//! is left alone. Every merge reports how many values it actually changed so
//! callers can skip no-op writes.

use std::collections::BTreeMap;

use crate::error::ConfigResult;

pub type PatchMap<P> = BTreeMap<String, Option<P>>;

/// A patch that can be folded with a later patch and checked for emptiness.
pub trait Patch: Clone {
    /// Combine `self` followed by `later` into one equivalent patch.
    fn compose(&self, later: &Self) -> Self;

    /// True when applying the patch can never change anything.
    fn is_noop(&self) -> bool;
}

impl Patch for Vec<String> {
    // arrays replace
    fn compose(&self, later: &Self) -> Self {
        later.clone()
    }

    fn is_noop(&self) -> bool {
        false
    }
}

/// Merge `patch` into a copy of `target`. `handler` receives the current
/// value (if any) and the patch entry and returns the merged value with its
/// change count. A deletion of an absent key is a no-op.
pub fn merge_delete_maps<V, P, F>(
    target: &BTreeMap<String, V>,
    patch: &PatchMap<P>,
    mut handler: F,
) -> ConfigResult<(BTreeMap<String, V>, usize)>
where
    V: Clone,
    F: FnMut(&str, Option<&V>, &P) -> ConfigResult<(V, usize)>,
{
    let mut merged = target.clone();
    let mut changes = 0;
    for (key, entry) in patch {
        match entry {
            None => {
                if merged.remove(key).is_some() {
                    changes += 1;
                }
            }
            Some(value) => {
                let existing = target.get(key);
                let (next, count) = handler(key, existing, value)?;
                // inserting a key is a change even if every field is default
                changes += if existing.is_none() { count.max(1) } else { count };
                merged.insert(key.clone(), next);
            }
        }
    }
    Ok((merged, changes))
}

fn normalized(list: &[String]) -> Vec<String> {
    let mut sorted = list.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// Whole-value array replacement. Equal-after-sorting arrays keep the
/// current value and count no change.
pub fn replace_list(current: Option<&Vec<String>>, next: &[String]) -> (Vec<String>, usize) {
    match current {
        Some(current) if normalized(current) == normalized(next) => (current.clone(), 0),
        _ => (next.to_vec(), 1),
    }
}

/// Like [`replace_list`], but the stored value is itself sorted and
/// deduplicated.
pub fn replace_set(current: Option<&Vec<String>>, next: &[String]) -> (Vec<String>, usize) {
    let next = normalized(next);
    match current {
        Some(current) if normalized(current) == next => (current.clone(), 0),
        _ => (next, 1),
    }
}

/// Overwrite a scalar when the patch carries a different value.
pub fn merge_scalar<T: PartialEq + Clone>(current: &T, patch: Option<&T>) -> (T, usize) {
    match patch {
        Some(next) if next != current => (next.clone(), 1),
        _ => (current.clone(), 0),
    }
}

/// Fold a later optional field over an earlier one.
pub fn compose_field<P: Patch>(earlier: &Option<P>, later: &Option<P>) -> Option<P> {
    match (earlier, later) {
        (Some(earlier), Some(later)) => Some(earlier.compose(later)),
        (earlier, None) => earlier.clone(),
        (None, later) => later.clone(),
    }
}

/// Fold a later scalar over an earlier one: the later value wins.
pub fn compose_scalar<T: Clone>(earlier: &Option<T>, later: &Option<T>) -> Option<T> {
    later.clone().or_else(|| earlier.clone())
}

/// Fold two patch maps. Deletion markers survive so the result applies like
/// the two patches in sequence; an entry set after a deletion becomes a
/// plain set.
pub fn compose_maps<P: Patch>(earlier: &PatchMap<P>, later: &PatchMap<P>) -> PatchMap<P> {
    let mut composed = earlier.clone();
    for (key, entry) in later {
        let next = match (earlier.get(key), entry) {
            (Some(Some(before)), Some(after)) => Some(before.compose(after)),
            (_, entry) => entry.clone(),
        };
        composed.insert(key.clone(), next);
    }
    composed
}

impl<P: Patch> Patch for PatchMap<P> {
    fn compose(&self, later: &Self) -> Self {
        compose_maps(self, later)
    }

    fn is_noop(&self) -> bool {
        self.is_empty()
    }
}

/// True when an optional patch field is absent or a no-op.
pub fn field_is_noop<P: Patch>(field: &Option<P>) -> bool {
    field.as_ref().map_or(true, Patch::is_noop)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn merge_counts(
        target: &BTreeMap<String, u32>,
        patch: &PatchMap<u32>,
    ) -> (BTreeMap<String, u32>, usize) {
        merge_delete_maps(target, patch, |_, current, next| {
            Ok(match current {
                Some(current) => merge_scalar(current, Some(next)),
                None => (*next, 1),
            })
        })
        .unwrap()
    }

    #[test]
    fn test_null_deletes() {
        let target = BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)]);
        let patch = PatchMap::from([("a".to_string(), None)]);
        let (merged, changes) = merge_counts(&target, &patch);
        assert!(!merged.contains_key("a"));
        assert_eq!(merged["b"], 2);
        assert_eq!(changes, 1);
        // target untouched
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let target = BTreeMap::from([("a".to_string(), 1)]);
        let patch = PatchMap::from([("zzz".to_string(), None)]);
        let (merged, changes) = merge_counts(&target, &patch);
        assert_eq!(merged, target);
        assert_eq!(changes, 0);
    }

    #[test]
    fn test_equal_scalar_no_change() {
        let target = BTreeMap::from([("a".to_string(), 1)]);
        let patch = PatchMap::from([("a".to_string(), Some(1)), ("b".to_string(), Some(5))]);
        let (merged, changes) = merge_counts(&target, &patch);
        assert_eq!(merged["b"], 5);
        assert_eq!(changes, 1);
    }

    #[test]
    fn test_replace_list_order_insensitive() {
        let current = list(&["view", "update"]);
        let (kept, changes) = replace_list(Some(&current), &list(&["update", "view"]));
        assert_eq!(kept, current);
        assert_eq!(changes, 0);

        let (replaced, changes) = replace_list(Some(&current), &list(&["view"]));
        assert_eq!(replaced, list(&["view"]));
        assert_eq!(changes, 1);
    }

    #[test]
    fn test_replace_set_sorts() {
        let (stored, changes) = replace_set(None, &list(&["b", "a", "b"]));
        assert_eq!(stored, list(&["a", "b"]));
        assert_eq!(changes, 1);
    }

    #[test]
    fn test_compose_keeps_deletions() {
        let first: PatchMap<Vec<String>> =
            PatchMap::from([("x".to_string(), Some(list(&["a"])))]);
        let second: PatchMap<Vec<String>> = PatchMap::from([
            ("x".to_string(), None),
            ("y".to_string(), Some(list(&["b"]))),
        ]);
        let composed = compose_maps(&first, &second);
        assert_eq!(composed["x"], None);
        assert_eq!(composed["y"], Some(list(&["b"])));
    }

    #[test]
    fn test_compose_later_array_wins() {
        let first = PatchMap::from([("x".to_string(), Some(list(&["a"])))]);
        let second = PatchMap::from([("x".to_string(), Some(list(&["b", "c"])))]);
        assert_eq!(compose_maps(&first, &second)["x"], Some(list(&["b", "c"])));
    }
}
