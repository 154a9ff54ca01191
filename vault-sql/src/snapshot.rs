//! Current credential snapshot shared between the renewal loop and
//! connection attempts.
//!
//! The store is copy-on-write: readers load an `Arc` to an immutable
//! [`Snapshot`] and never wait on the writer, and every update publishes a
//! complete new snapshot, so a reader sees either the state before an update
//! or after it.

use arc_swap::ArcSwapOption;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Named credential fields believed valid at some point in time.
#[derive(Clone, Default)]
pub struct Snapshot {
    fields: HashMap<String, SecretString>,
}

impl Snapshot {
    /// Value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|value| value.expose_secret())
    }

    /// Whether a field is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Copy every field out in plain text, ordered by name.
    #[must_use]
    pub fn to_exposed_map(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.expose_secret().to_string()))
            .collect()
    }

    fn extend(&mut self, other: &Self) {
        self.fields
            .extend(other.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

impl<K, V> FromIterator<(K, V)> for Snapshot
where
    K: Into<String>,
    V: Into<SecretString>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("fields", &self.names())
            .finish()
    }
}

/// Holder of the current [`Snapshot`].
pub struct SnapshotStore {
    current: ArcSwapOption<Snapshot>,
}

impl SnapshotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    /// Merge fields into the current snapshot, overwriting same-named keys
    /// and leaving other keys untouched. On an empty store the fields become
    /// the whole snapshot.
    pub fn merge(&self, fields: &Snapshot) {
        self.current.rcu(|current| {
            let mut next = current.as_deref().cloned().unwrap_or_default();
            next.extend(fields);
            Some(Arc::new(next))
        });
    }

    /// Replace the current snapshot wholesale.
    pub fn replace(&self, fields: Snapshot) {
        self.current.store(Some(Arc::new(fields)));
    }

    /// The current snapshot, empty if nothing has been stored yet.
    #[must_use]
    pub fn read_all(&self) -> Arc<Snapshot> {
        self.current.load_full().unwrap_or_default()
    }

    /// Whether any snapshot has been stored.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.current.load().is_some()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("current", &self.current.load_full())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, &str)]) -> Snapshot {
        pairs
            .iter()
            .map(|(k, v)| (*k, SecretString::from(*v)))
            .collect()
    }

    #[test]
    fn test_empty_store() {
        let store = SnapshotStore::new();
        assert!(!store.is_populated());
        assert!(store.read_all().is_empty());
    }

    #[test]
    fn test_first_merge_becomes_snapshot() {
        let store = SnapshotStore::new();
        store.merge(&snapshot(&[("username", "u1")]));
        assert!(store.is_populated());
        assert_eq!(store.read_all().names(), vec!["username"]);
    }

    #[test]
    fn test_merge_keeps_unrelated_fields() {
        let store = SnapshotStore::new();
        store.merge(&snapshot(&[("username", "u1")]));
        store.merge(&snapshot(&[("password", "p2")]));

        let current = store.read_all();
        assert_eq!(current.get("username"), Some("u1"));
        assert_eq!(current.get("password"), Some("p2"));
    }

    #[test]
    fn test_merge_overwrites_same_name() {
        let store = SnapshotStore::new();
        store.merge(&snapshot(&[("username", "u1"), ("password", "p1")]));
        store.merge(&snapshot(&[("password", "p2")]));
        assert_eq!(store.read_all().get("password"), Some("p2"));
        assert_eq!(store.read_all().get("username"), Some("u1"));
    }

    #[test]
    fn test_replace_drops_stale_fields() {
        let store = SnapshotStore::new();
        store.merge(&snapshot(&[("username", "u1"), ("role", "ro")]));
        store.replace(snapshot(&[("username", "u2"), ("password", "p2new")]));

        let current = store.read_all();
        assert_eq!(current.names(), vec!["password", "username"]);
        assert_eq!(current.get("username"), Some("u2"));
        assert!(!current.contains("role"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let fields = snapshot(&[("username", "u"), ("password", "p")]);

        let once = SnapshotStore::new();
        once.merge(&fields);

        let twice = SnapshotStore::new();
        twice.merge(&fields);
        twice.merge(&fields);

        assert_eq!(once.read_all().to_exposed_map(), twice.read_all().to_exposed_map());
    }

    #[test]
    fn test_reader_keeps_its_view() {
        let store = SnapshotStore::new();
        store.merge(&snapshot(&[("password", "old")]));
        let view = store.read_all();
        store.merge(&snapshot(&[("password", "new")]));

        assert_eq!(view.get("password"), Some("old"));
        assert_eq!(store.read_all().get("password"), Some("new"));
    }

    #[test]
    fn test_debug_hides_values() {
        let snap = snapshot(&[("password", "hunter2")]);
        let debug = format!("{snap:?}");
        assert!(debug.contains("password"));
        assert!(!debug.contains("hunter2"));
    }
}
