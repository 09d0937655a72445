//! Registration table between bound keys and OS hotkey ids

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::backend::{HotkeyBackend, HotkeyError};
use super::keys::Key;
use crate::bindings::BindingStore;

/// A key the OS refused to register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConflict {
    pub key: Key,
    pub error: HotkeyError,
}

/// Owns the OS registrations made for the current set of bindings
///
/// The table holds exactly the ids this process currently has registered.
/// It is rebuilt from scratch on every `register_all`.
pub struct Registrar {
    backend: Box<dyn HotkeyBackend>,
    table: HashMap<u32, Key>,
}

impl Registrar {
    /// Create a registrar with an empty table
    pub fn new(backend: Box<dyn HotkeyBackend>) -> Self {
        Self {
            backend,
            table: HashMap::new(),
        }
    }

    /// Register every bound key with the OS
    ///
    /// A refused key is skipped and returned as a conflict; the pass always
    /// continues with the remaining keys.
    pub fn register_all(&mut self, store: &BindingStore) -> Vec<RegistrationConflict> {
        let mut conflicts = Vec::new();

        for binding in store.all() {
            match self.backend.register(binding.key) {
                Ok(id) => {
                    debug!(key = %binding.key, id, "hotkey registered");
                    if let Some(previous) = self.table.insert(id, binding.key) {
                        warn!(id, %previous, key = %binding.key, "OS reused a live hotkey id");
                    }
                }
                Err(error) => {
                    warn!(key = %binding.key, %error, "hotkey registration refused");
                    conflicts.push(RegistrationConflict {
                        key: binding.key,
                        error,
                    });
                }
            }
        }

        info!(
            registered = self.table.len(),
            refused = conflicts.len(),
            "hotkeys registered"
        );
        conflicts
    }

    /// Release every registration in the table and clear it
    ///
    /// Safe to call repeatedly; a second call finds nothing to release.
    pub fn unregister_all(&mut self) {
        for (id, key) in self.table.drain() {
            match self.backend.unregister(id) {
                Ok(()) => debug!(%key, id, "hotkey unregistered"),
                Err(e) => warn!(%key, id, %e, "failed to unregister hotkey"),
            }
        }
    }

    /// Key currently represented by `id`, if any
    pub fn resolve(&self, id: u32) -> Option<Key> {
        self.table.get(&id).copied()
    }

    /// Number of live registrations
    pub fn registered(&self) -> usize {
        self.table.len()
    }
}

impl Drop for Registrar {
    fn drop(&mut self) {
        self.unregister_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::backend::fake::FakeBackend;

    fn store_with(bindings: &[(Key, &str)]) -> BindingStore {
        let mut store = BindingStore::new();
        for (key, target) in bindings {
            store.set(*key, target);
        }
        store
    }

    #[test]
    fn test_resolve_after_register_all() {
        let backend = FakeBackend::new();
        let mut registrar = Registrar::new(Box::new(backend.clone()));
        let store = store_with(&[(Key::F2, "notepad.exe"), (Key::F3, "https://example.com")]);

        let conflicts = registrar.register_all(&store);
        assert!(conflicts.is_empty());
        assert_eq!(registrar.registered(), 2);

        for (id, key) in backend.active() {
            assert_eq!(registrar.resolve(id), Some(key));
        }
    }

    #[test]
    fn test_conflict_skips_only_that_key() {
        let backend = FakeBackend::new();
        backend.claim_elsewhere(Key::F3);
        let mut registrar = Registrar::new(Box::new(backend.clone()));
        let store = store_with(&[
            (Key::F2, "a.exe"),
            (Key::F3, "b.exe"),
            (Key::F4, "c.exe"),
        ]);

        let conflicts = registrar.register_all(&store);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key, Key::F3);
        assert_eq!(registrar.registered(), 2);

        let mut keys: Vec<Key> = backend.active().into_values().collect();
        keys.sort();
        assert_eq!(keys, vec![Key::F2, Key::F4]);
    }

    #[test]
    fn test_unregister_all_is_idempotent() {
        let backend = FakeBackend::new();
        let mut registrar = Registrar::new(Box::new(backend.clone()));
        registrar.register_all(&store_with(&[(Key::F2, "a.exe")]));

        registrar.unregister_all();
        assert_eq!(registrar.registered(), 0);
        assert!(backend.active().is_empty());

        registrar.unregister_all();
        assert_eq!(registrar.registered(), 0);
        assert_eq!(backend.state.lock().unwrap().unregister_calls, 1);
    }

    #[test]
    fn test_unknown_id_resolves_to_none() {
        let backend = FakeBackend::new();
        let mut registrar = Registrar::new(Box::new(backend));
        assert_eq!(registrar.resolve(1), None);

        registrar.register_all(&store_with(&[(Key::F2, "a.exe")]));
        let stale = registrar.table.keys().copied().next().unwrap();
        registrar.unregister_all();
        assert_eq!(registrar.resolve(stale), None);
    }

    #[test]
    fn test_drop_releases_registrations() {
        let backend = FakeBackend::new();
        {
            let mut registrar = Registrar::new(Box::new(backend.clone()));
            registrar.register_all(&store_with(&[(Key::F7, "a.exe"), (Key::F8, "b.exe")]));
            assert_eq!(backend.active().len(), 2);
        }
        assert!(backend.active().is_empty());
    }
}
