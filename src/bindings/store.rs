//! In-memory key → target bindings

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hotkey::Key;

/// A key bound to a launch target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub key: Key,
    pub target: String,
}

/// The set of bindings, at most one target per key
///
/// Blank targets are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingStore {
    bindings: BTreeMap<Key, String>,
}

impl BindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `target`, or unbind it if `target` is blank
    pub fn set(&mut self, key: Key, target: &str) {
        if target.trim().is_empty() {
            self.remove(key);
        } else {
            self.bindings.insert(key, target.to_string());
        }
    }

    pub fn remove(&mut self, key: Key) {
        self.bindings.remove(&key);
    }

    pub fn get(&self, key: Key) -> Option<&str> {
        self.bindings.get(&key).map(String::as_str)
    }

    /// Snapshot of every binding, ordered by key
    pub fn all(&self) -> Vec<Binding> {
        self.bindings
            .iter()
            .map(|(key, target)| Binding {
                key: *key,
                target: target.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
