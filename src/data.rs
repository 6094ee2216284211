//! Per-story key/value storage.
//!
//! Scenario generators and actions write their results into a [`DataBag`]
//! under their variable names; later callbacks read them back by name. Keys
//! containing `.` address nested objects, so `user.name` reads the `name`
//! field of the value stored under `user`.

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Per-story shared variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataBag {
    values: IndexMap<String, Value>,
}

impl DataBag {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the value stored under `key`, descending through objects and
    /// arrays for dotted keys.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        lookup(&self.values, key)
    }

    /// Fetch `key`, falling back to `default` when absent.
    #[must_use]
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Report whether `key` resolves to a value.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Store `value` under `key`.
    ///
    /// Dotted keys create intermediate objects, replacing any non-object value
    /// that sits on the path.
    pub fn set(&mut self, key: &str, value: Value) -> &mut Self {
        let Some((head, rest)) = key.split_once('.') else {
            self.values.insert(key.to_owned(), value);
            return self;
        };
        let slot = self
            .values
            .entry(head.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        assign(slot, rest, value);
        self
    }

    /// Remove the top-level entry `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    /// Copy every entry of `other` over this bag.
    pub fn overlay(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Borrow every top-level entry.
    #[must_use]
    pub const fn all(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Iterate over top-level entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Report whether the bag holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolve `key` in `values`, trying an exact match before a dotted path.
pub(crate) fn lookup<'a>(values: &'a IndexMap<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(value) = values.get(key) {
        return Some(value);
    }
    let (head, rest) = key.split_once('.')?;
    rest.split('.')
        .try_fold(values.get(head)?, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn assign(slot: &mut Value, path: &str, value: Value) {
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    let Value::Object(map) = slot else {
        return;
    };
    match path.split_once('.') {
        None => {
            map.insert(path.to_owned(), value);
        }
        Some((head, rest)) => {
            let next = map
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            assign(next, rest, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn flat_keys_round_trip() {
        let mut bag = DataBag::new();
        bag.set("role", json!("admin"));
        assert_eq!(bag.get("role"), Some(&json!("admin")));
        assert!(bag.has("role"));
        assert!(!bag.has("missing"));
        assert_eq!(bag.get_or("missing", json!(3)), json!(3));
    }

    #[rstest]
    fn dotted_keys_build_nested_objects() {
        let mut bag = DataBag::new();
        bag.set("user.profile.name", json!("Ada"));
        bag.set("user.id", json!(7));
        assert_eq!(bag.get("user"), Some(&json!({"profile": {"name": "Ada"}, "id": 7})));
        assert_eq!(bag.get("user.profile.name"), Some(&json!("Ada")));
        assert_eq!(bag.len(), 1);
    }

    #[rstest]
    fn dotted_lookup_indexes_arrays() {
        let mut bag = DataBag::new();
        bag.set("posts", json!([{"title": "first"}, {"title": "second"}]));
        assert_eq!(bag.get("posts.1.title"), Some(&json!("second")));
        assert_eq!(bag.get("posts.9.title"), None);
    }

    #[rstest]
    fn dotted_set_replaces_scalars_on_the_path() {
        let mut bag = DataBag::new();
        bag.set("user", json!("plain"));
        bag.set("user.name", json!("Ada"));
        assert_eq!(bag.get("user"), Some(&json!({"name": "Ada"})));
    }

    #[rstest]
    fn overlay_prefers_incoming_entries() {
        let mut parent = DataBag::new();
        parent.set("a", json!(1)).set("b", json!(1));
        let mut child = DataBag::new();
        child.set("b", json!(2));
        parent.overlay(&child);
        assert_eq!(parent.get("a"), Some(&json!(1)));
        assert_eq!(parent.get("b"), Some(&json!(2)));
    }
}
