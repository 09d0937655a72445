//! Events module for user-facing notifications
//!
//! Every event renders as a short message suitable for a tray balloon or
//! status line. Events are broadcast; the IPC server forwards them to
//! subscribed clients.

use serde::{Deserialize, Serialize};

use crate::hotkey::Key;

/// Events emitted by the core as bindings change and hotkeys fire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    /// A binding was stored
    BindingSaved { key: Key, target: String },

    /// A binding was cleared
    BindingRemoved { key: Key },

    /// The OS refused to register a bound key
    RegistrationConflict { key: Key, reason: String },

    /// The bindings file could not be written
    SaveFailed { reason: String },

    /// A hotkey launched its target
    Launched { key: Key, target: String },

    /// A hotkey fired but its target could not be launched
    LaunchFailed {
        key: Key,
        target: String,
        reason: String,
    },
}

impl CoreEvent {
    /// Whether the event reports something the user should act on
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CoreEvent::RegistrationConflict { .. }
                | CoreEvent::SaveFailed { .. }
                | CoreEvent::LaunchFailed { .. }
        )
    }
}

impl std::fmt::Display for CoreEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreEvent::BindingSaved { key, target } => {
                write!(f, "Binding saved: {} -> {}", key, target)
            }
            CoreEvent::BindingRemoved { key } => write!(f, "Binding removed: {}", key),
            CoreEvent::RegistrationConflict { key, reason } => {
                write!(f, "Could not register {}: {}", key, reason)
            }
            CoreEvent::SaveFailed { reason } => {
                write!(f, "Could not save bindings: {}", reason)
            }
            CoreEvent::Launched { key, target } => write!(f, "{} launched {}", key, target),
            CoreEvent::LaunchFailed { key, target, reason } => {
                write!(f, "Failed to launch {} ({}): {}", target, key, reason)
            }
        }
    }
}
