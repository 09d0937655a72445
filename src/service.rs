//! Binding service: the single owner of the store and the OS registrations
//!
//! Every edit runs unregister-all → mutate → save → register-all while
//! holding the write lock, so an activation is never resolved against a
//! half-updated table. Re-registering every key on each edit keeps id
//! lifetimes trivial at the cost of a few extra OS calls.
//!
//! The OS round trips and file writes block, so each cycle runs on the
//! blocking pool with an owned write guard.

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::bindings::{Binding, BindingStore, BindingsFile};
use crate::dispatch::Activation;
use crate::events::CoreEvent;
use crate::hotkey::{Key, Registrar, RegistrationConflict};

/// Result of one rebind cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebindReport {
    /// Bindings after the edit
    pub bindings: Vec<Binding>,
    /// Keys the OS refused during re-registration
    pub conflicts: Vec<Key>,
    /// Set when the bindings file could not be written
    pub save_error: Option<String>,
}

struct Core {
    store: BindingStore,
    registrar: Registrar,
    file: BindingsFile,
}

/// Cloneable handle shared by the dispatcher and the IPC server
#[derive(Clone)]
pub struct Service {
    core: Arc<RwLock<Core>>,
    event_tx: broadcast::Sender<CoreEvent>,
}

impl Service {
    /// Create the service from an already loaded store
    ///
    /// Nothing is registered until `start` is called.
    pub fn new(
        store: BindingStore,
        file: BindingsFile,
        registrar: Registrar,
        event_tx: broadcast::Sender<CoreEvent>,
    ) -> Self {
        Self {
            core: Arc::new(RwLock::new(Core {
                store,
                registrar,
                file,
            })),
            event_tx,
        }
    }

    /// Register every loaded binding with the OS
    pub async fn start(&self) -> Vec<Key> {
        let conflicts = self
            .with_core(|core| {
                if core.store.is_empty() {
                    info!("no bindings to register yet");
                }
                core.registrar.unregister_all();
                core.registrar.register_all(&core.store)
            })
            .await;
        self.report_conflicts(&conflicts);
        conflicts.into_iter().map(|c| c.key).collect()
    }

    /// Snapshot of every binding
    pub async fn get_all_bindings(&self) -> Vec<Binding> {
        self.core.read().await.store.all()
    }

    /// Bind `key` to `target`; a blank target removes the binding
    pub async fn set_binding(&self, key: Key, target: &str) -> RebindReport {
        let target = target.to_string();
        let report = self.rebind(move |store| store.set(key, &target)).await;
        let event = match report.bindings.iter().find(|b| b.key == key) {
            Some(binding) => CoreEvent::BindingSaved {
                key,
                target: binding.target.clone(),
            },
            None => CoreEvent::BindingRemoved { key },
        };
        self.emit(event);
        report
    }

    /// Remove the binding for `key`, if any
    pub async fn remove_binding(&self, key: Key) -> RebindReport {
        let report = self.rebind(move |store| store.remove(key)).await;
        self.emit(CoreEvent::BindingRemoved { key });
        report
    }

    /// Resolve an activation id to the bound target
    pub async fn resolve(&self, id: u32) -> Activation {
        let core = self.core.read().await;
        let Some(key) = core.registrar.resolve(id) else {
            return Activation::UnknownId(id);
        };
        match core.store.get(key) {
            Some(target) => Activation::Dispatched {
                key,
                target: target.to_string(),
            },
            None => Activation::Unbound(key),
        }
    }

    /// Number of bindings and of live OS registrations
    pub async fn counts(&self) -> (usize, usize) {
        let core = self.core.read().await;
        (core.store.len(), core.registrar.registered())
    }

    /// Release every OS registration
    pub async fn shutdown(&self) {
        self.with_core(|core| core.registrar.unregister_all()).await;
        info!("all hotkeys released");
    }

    /// Subscribe to user-facing events
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.event_tx.subscribe()
    }

    async fn rebind(&self, mutate: impl FnOnce(&mut BindingStore) + Send + 'static) -> RebindReport {
        let (bindings, conflicts, save_error) = self
            .with_core(move |core| {
                core.registrar.unregister_all();
                mutate(&mut core.store);
                let saved = core.file.save(&core.store);
                let conflicts = core.registrar.register_all(&core.store);
                (core.store.all(), conflicts, saved.err())
            })
            .await;

        let save_error = save_error.map(|e| {
            warn!(%e, "failed to save bindings");
            self.emit(CoreEvent::SaveFailed {
                reason: e.to_string(),
            });
            e.to_string()
        });
        self.report_conflicts(&conflicts);

        RebindReport {
            bindings,
            conflicts: conflicts.into_iter().map(|c| c.key).collect(),
            save_error,
        }
    }

    /// Run `f` on the blocking pool while holding the write lock
    async fn with_core<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut Core) -> R + Send + 'static,
    ) -> R {
        let mut core = Arc::clone(&self.core).write_owned().await;
        tokio::task::spawn_blocking(move || f(&mut *core))
            .await
            // A blocking task only ends early by panicking
            .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()))
    }

    fn report_conflicts(&self, conflicts: &[RegistrationConflict]) {
        for conflict in conflicts {
            self.emit(CoreEvent::RegistrationConflict {
                key: conflict.key,
                reason: conflict.error.to_string(),
            });
        }
    }

    fn emit(&self, event: CoreEvent) {
        // No receivers just means nobody is listening right now.
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
pub mod testing {
    use tempfile::TempDir;

    use super::*;
    use crate::hotkey::fake::FakeBackend;

    /// Service over a fake backend and a file in a temporary directory
    pub fn service_with(
        bindings: &[(Key, &str)],
    ) -> (Service, FakeBackend, broadcast::Receiver<CoreEvent>, TempDir) {
        let dir = TempDir::new().unwrap();
        let file = BindingsFile::new(dir.path().join("keybindings.json"));
        let mut store = BindingStore::new();
        for (key, target) in bindings {
            store.set(*key, target);
        }
        let backend = FakeBackend::new();
        let registrar = Registrar::new(Box::new(backend.clone()));
        let (event_tx, event_rx) = broadcast::channel(64);
        let service = Service::new(store, file, registrar, event_tx);
        (service, backend, event_rx, dir)
    }
}
