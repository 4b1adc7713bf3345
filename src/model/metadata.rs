//! Metadata: the key-value store on nodes and plugs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Value;

/// A map of metadata keys to values, partitioned into entries that are
/// written on export (`persistent`) and entries that live only in memory
/// (`transient`). A key lives in at most one partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    persistent: BTreeMap<String, Value>,
    #[serde(skip)]
    transient: BTreeMap<String, Value>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value. Re-registering a key moves it to the requested partition.
    pub fn register(&mut self, key: impl Into<String>, value: impl Into<Value>, persistent: bool) {
        let key = key.into();
        if persistent {
            self.transient.remove(&key);
            self.persistent.insert(key, value.into());
        } else {
            self.persistent.remove(&key);
            self.transient.insert(key, value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.persistent.get(key).or_else(|| self.transient.get(key))
    }

    pub fn is_persistent(&self, key: &str) -> bool {
        self.persistent.contains_key(key)
    }

    /// Registered keys, persistent first.
    pub fn keys(&self, persistent_only: bool) -> Vec<&str> {
        let mut keys: Vec<&str> = self.persistent.keys().map(String::as_str).collect();
        if !persistent_only {
            keys.extend(self.transient.keys().map(String::as_str));
        }
        keys
    }

    pub fn persistent(&self) -> &BTreeMap<String, Value> {
        &self.persistent
    }

    /// Drop the transient entries under `previous`, then add `entries` as
    /// transient wherever the key is still free. Returns the keys added.
    pub fn refresh_transient(
        &mut self,
        previous: &[String],
        entries: BTreeMap<String, Value>,
    ) -> Vec<String> {
        for key in previous {
            self.transient.remove(key);
        }
        let mut added = Vec::new();
        for (key, value) in entries {
            if self.persistent.contains_key(&key) || self.transient.contains_key(&key) {
                continue;
            }
            self.transient.insert(key.clone(), value);
            added.push(key);
        }
        added
    }

    pub fn is_empty(&self) -> bool {
        self.persistent.is_empty() && self.transient.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for Metadata {
    fn from(persistent: BTreeMap<String, Value>) -> Self {
        Self { persistent, transient: BTreeMap::new() }
    }
}
