//! Hotkey module for global key registration
//!
//! Maps bound keys onto OS-level global hotkeys via the `global-hotkey`
//! crate and keeps the id → key table used to route activations.

mod backend;
mod keys;
mod registrar;

pub use backend::{HotkeyBackend, OsHotkeyLoop, Unavailable};
pub use keys::Key;
pub use registrar::{Registrar, RegistrationConflict};

#[cfg(test)]
pub use backend::{fake, HotkeyError};
