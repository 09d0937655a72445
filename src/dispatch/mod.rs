//! Dispatch module for hotkey activations
//!
//! A two-state machine:
//! - Idle: waiting for an activation id
//! - Handling: resolving one id and handing the launch off

mod dispatcher;

pub use dispatcher::{Activation, Dispatcher};
