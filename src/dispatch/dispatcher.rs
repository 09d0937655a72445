//! Hotkey activation dispatcher
//!
//! Turns registration ids delivered by the OS into launches. The dispatcher
//! only resolves and hands off; each launch runs on the blocking pool so a
//! slow process start never delays the next activation.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::events::CoreEvent;
use crate::hotkey::Key;
use crate::launcher::Launcher;
use crate::service::Service;

/// The two dispatcher states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    /// Waiting for an activation
    #[default]
    Idle,
    /// Resolving one activation
    Handling,
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchState::Idle => write!(f, "Idle"),
            DispatchState::Handling => write!(f, "Handling"),
        }
    }
}

/// What an activation resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// The id is not currently registered (stale or foreign signal)
    UnknownId(u32),
    /// The key is registered but no longer bound
    Unbound(Key),
    /// A launch was handed off for this target
    Dispatched { key: Key, target: String },
}

/// Consumes activation ids and launches the bound targets
pub struct Dispatcher {
    state: DispatchState,
    service: Service,
    launcher: Arc<dyn Launcher>,
    event_tx: broadcast::Sender<CoreEvent>,
}

impl Dispatcher {
    pub fn new(
        service: Service,
        launcher: Arc<dyn Launcher>,
        event_tx: broadcast::Sender<CoreEvent>,
    ) -> Self {
        Self {
            state: DispatchState::Idle,
            service,
            launcher,
            event_tx,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Process activations until the channel closes
    pub async fn run(&mut self, mut activation_rx: mpsc::Receiver<u32>) {
        info!("dispatcher started in Idle state");

        while let Some(id) = activation_rx.recv().await {
            self.on_activate(id).await;
        }

        info!("dispatcher stopped");
    }

    /// Handle a single activation
    pub async fn on_activate(&mut self, id: u32) -> Activation {
        self.transition_to(DispatchState::Handling);

        let activation = self.service.resolve(id).await;
        match &activation {
            Activation::UnknownId(id) => {
                debug!(id, "activation for unregistered id ignored");
            }
            Activation::Unbound(key) => {
                debug!(%key, "activation for unbound key ignored");
            }
            Activation::Dispatched { key, target } => {
                info!(%key, %target, "launching");
                self.spawn_launch(*key, target.clone());
            }
        }

        self.transition_to(DispatchState::Idle);
        activation
    }

    fn spawn_launch(&self, key: Key, target: String) {
        let launcher = Arc::clone(&self.launcher);
        let event_tx = self.event_tx.clone();

        tokio::task::spawn_blocking(move || {
            let event = match launcher.launch(&target) {
                Ok(launched) => {
                    debug!(%key, %launched, "launch succeeded");
                    CoreEvent::Launched { key, target }
                }
                Err(e) => {
                    warn!(%key, %target, %e, "launch failed");
                    CoreEvent::LaunchFailed {
                        key,
                        target,
                        reason: e.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event);
        });
    }

    fn transition_to(&mut self, new_state: DispatchState) {
        debug!(from = %self.state, to = %new_state, "dispatcher transition");
        self.state = new_state;
    }
}
