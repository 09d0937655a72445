//! Key identifiers that can be bound to a launch target
//!
//! Every key has one canonical textual name, used in the bindings file
//! and over IPC, and maps onto a `global_hotkey` key code.

use std::fmt;
use std::str::FromStr;

use global_hotkey::hotkey::Code;
use serde::{Deserialize, Serialize};

macro_rules! keys {
    ($($variant:ident => $code:ident),* $(,)?) => {
        /// A single key that can be registered as a global hotkey
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum Key {
            $($variant,)*
        }

        impl Key {
            /// Every supported key, in declaration order
            pub const ALL: &'static [Key] = &[$(Key::$variant,)*];

            /// Canonical name written to the bindings file
            pub fn name(self) -> &'static str {
                match self {
                    $(Key::$variant => stringify!($variant),)*
                }
            }

            /// Key code understood by the OS hotkey backend
            pub fn code(self) -> Code {
                match self {
                    $(Key::$variant => Code::$code,)*
                }
            }
        }
    };
}

keys! {
    F1 => F1, F2 => F2, F3 => F3, F4 => F4, F5 => F5, F6 => F6,
    F7 => F7, F8 => F8, F9 => F9, F10 => F10, F11 => F11, F12 => F12,
    F13 => F13, F14 => F14, F15 => F15, F16 => F16, F17 => F17, F18 => F18,
    F19 => F19, F20 => F20, F21 => F21, F22 => F22, F23 => F23, F24 => F24,
    NumPad0 => Numpad0, NumPad1 => Numpad1, NumPad2 => Numpad2, NumPad3 => Numpad3,
    NumPad4 => Numpad4, NumPad5 => Numpad5, NumPad6 => Numpad6, NumPad7 => Numpad7,
    NumPad8 => Numpad8, NumPad9 => Numpad9,
    Add => NumpadAdd, Subtract => NumpadSubtract, Multiply => NumpadMultiply,
    Divide => NumpadDivide, Decimal => NumpadDecimal,
    A => KeyA, B => KeyB, C => KeyC, D => KeyD, E => KeyE, F => KeyF, G => KeyG,
    H => KeyH, I => KeyI, J => KeyJ, K => KeyK, L => KeyL, M => KeyM, N => KeyN,
    O => KeyO, P => KeyP, Q => KeyQ, R => KeyR, S => KeyS, T => KeyT, U => KeyU,
    V => KeyV, W => KeyW, X => KeyX, Y => KeyY, Z => KeyZ,
    D0 => Digit0, D1 => Digit1, D2 => Digit2, D3 => Digit3, D4 => Digit4,
    D5 => Digit5, D6 => Digit6, D7 => Digit7, D8 => Digit8, D9 => Digit9,
    Insert => Insert, Delete => Delete, Home => Home, End => End,
    PageUp => PageUp, PageDown => PageDown,
    Pause => Pause, Scroll => ScrollLock, PrintScreen => PrintScreen,
    Escape => Escape, Space => Space, Tab => Tab, Enter => Enter,
    Up => ArrowUp, Down => ArrowDown, Left => ArrowLeft, Right => ArrowRight,
}

/// Older spellings still found in hand-written bindings files
const ALIASES: &[(&str, Key)] = &[
    ("Next", Key::PageDown),
    ("Prior", Key::PageUp),
    ("Return", Key::Enter),
];

/// Error returned when a key name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key name `{0}`")]
pub struct ParseKeyError(pub String);

impl FromStr for Key {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Key::ALL
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(name))
            .or_else(|| {
                ALIASES
                    .iter()
                    .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
                    .map(|(_, key)| *key)
            })
            .ok_or_else(|| ParseKeyError(s.to_string()))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for Key {
    type Error = ParseKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.name().to_string()
    }
}
