//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::bindings::Binding;
use crate::events::CoreEvent;
use crate::hotkey::Key;
use crate::service::RebindReport;

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// List every key that can be bound
    ListKeys,

    /// Snapshot of the current bindings
    GetBindings,

    /// Bind a key; a blank target removes the binding
    SetBinding { key: Key, target: String },

    /// Remove a key's binding
    RemoveBinding { key: Key },

    /// Subscribe to event notifications
    Subscribe,

    /// Ask the daemon to exit
    Shutdown,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Every bindable key
    Keys { keys: Vec<Key> },

    /// Current bindings
    Bindings { bindings: Vec<Binding> },

    /// Result of a set/remove
    BindingUpdated {
        bindings: Vec<Binding>,
        conflicts: Vec<Key>,
        save_error: Option<String>,
    },

    /// Subscription confirmed
    Subscribed,

    /// Shutdown accepted
    ShuttingDown,

    /// Error response
    Error { code: String, message: String },
}

impl From<RebindReport> for Response {
    fn from(report: RebindReport) -> Self {
        Response::BindingUpdated {
            bindings: report.bindings,
            conflicts: report.conflicts,
            save_error: report.save_error,
        }
    }
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Something the tray should show
    Event { event: CoreEvent, message: String },
}

impl From<CoreEvent> for Notification {
    fn from(event: CoreEvent) -> Self {
        let message = event.to_string();
        Notification::Event { event, message }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Number of stored bindings
    pub bindings: usize,

    /// Number of live OS hotkey registrations
    pub registered: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            bindings: 0,
            registered: 0,
            uptime_secs: 0,
        }
    }
}
