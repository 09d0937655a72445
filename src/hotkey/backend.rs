//! OS global hotkey facility
//!
//! `OsHotkeyLoop` owns the `GlobalHotKeyManager` and must run on the thread
//! that created it. On macOS that is the main thread, and on macOS and
//! Windows the loop also pumps the native event loop, without which no
//! press is ever delivered. `OsHotkeys` handles send register and
//! unregister requests to the loop and wait for the answer.

use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::keys::Key;

/// How long the loop waits for a command before checking for presses
#[cfg(any(target_os = "macos", target_os = "windows"))]
const COMMAND_WAIT: Duration = Duration::from_millis(10);
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const COMMAND_WAIT: Duration = Duration::from_millis(50);

/// Registers single keys with the operating system
pub trait HotkeyBackend: Send + Sync {
    /// Claim `key` system-wide with no modifier mask, returning its registration id
    fn register(&mut self, key: Key) -> Result<u32, HotkeyError>;

    /// Release a registration previously returned by `register`
    fn unregister(&mut self, id: u32) -> Result<(), HotkeyError>;
}

/// Errors that can occur while talking to the OS hotkey facility
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HotkeyError {
    #[error("global hotkeys are unavailable: {0}")]
    Unavailable(String),

    #[error("{key} could not be registered: {reason}")]
    Rejected { key: Key, reason: String },

    #[error("hotkey id {0} is not registered")]
    UnknownId(u32),

    #[error("hotkey loop is not running")]
    LoopGone,
}

enum Command {
    Register {
        key: Key,
        reply: std_mpsc::Sender<Result<u32, HotkeyError>>,
    },
    Unregister {
        id: u32,
        reply: std_mpsc::Sender<Result<(), HotkeyError>>,
    },
}

/// The calls the loop makes on the platform manager
pub(crate) trait NativeManager {
    fn register(&self, hotkey: HotKey) -> Result<(), String>;
    fn unregister(&self, hotkey: HotKey) -> Result<(), String>;
}

impl NativeManager for GlobalHotKeyManager {
    fn register(&self, hotkey: HotKey) -> Result<(), String> {
        GlobalHotKeyManager::register(self, hotkey).map_err(|e| e.to_string())
    }

    fn unregister(&self, hotkey: HotKey) -> Result<(), String> {
        GlobalHotKeyManager::unregister(self, hotkey).map_err(|e| e.to_string())
    }
}

/// Handle used by the registrar to reach the hotkey loop
///
/// Once every handle is dropped the loop releases what it still holds and
/// `OsHotkeyLoop::run` returns.
pub struct OsHotkeys {
    command_tx: std_mpsc::Sender<Command>,
}

impl OsHotkeys {
    fn request<T>(
        &self,
        build: impl FnOnce(std_mpsc::Sender<Result<T, HotkeyError>>) -> Command,
    ) -> Result<T, HotkeyError> {
        let (reply_tx, reply_rx) = std_mpsc::channel();
        self.command_tx
            .send(build(reply_tx))
            .map_err(|_| HotkeyError::LoopGone)?;
        reply_rx.recv().map_err(|_| HotkeyError::LoopGone)?
    }
}

impl HotkeyBackend for OsHotkeys {
    fn register(&mut self, key: Key) -> Result<u32, HotkeyError> {
        self.request(|reply| Command::Register { key, reply })
    }

    fn unregister(&mut self, id: u32) -> Result<(), HotkeyError> {
        self.request(|reply| Command::Unregister { id, reply })
    }
}

/// Owner of the platform hotkey manager
///
/// Create it on the thread that will call `run`. On macOS that has to be
/// the main thread.
pub struct OsHotkeyLoop<M = GlobalHotKeyManager> {
    manager: M,
    commands: std_mpsc::Receiver<Command>,
    activation_tx: mpsc::Sender<u32>,
    held: HashMap<u32, HotKey>,
    forwarding: bool,
}

impl OsHotkeyLoop {
    /// Create the platform manager on the calling thread
    ///
    /// Every press of a registered hotkey is sent to `activation_tx` as its
    /// registration id once `run` is called.
    pub fn new(activation_tx: mpsc::Sender<u32>) -> Result<(Self, OsHotkeys), HotkeyError> {
        let manager = GlobalHotKeyManager::new().map_err(|e| {
            error!(%e, "failed to create global hotkey manager");
            HotkeyError::Unavailable(e.to_string())
        })?;
        Ok(Self::with_manager(manager, activation_tx))
    }
}

impl<M: NativeManager> OsHotkeyLoop<M> {
    fn with_manager(manager: M, activation_tx: mpsc::Sender<u32>) -> (Self, OsHotkeys) {
        let (command_tx, commands) = std_mpsc::channel();
        let hotkey_loop = Self {
            manager,
            commands,
            activation_tx,
            held: HashMap::new(),
            forwarding: true,
        };
        (hotkey_loop, OsHotkeys { command_tx })
    }

    /// Serve commands and forward presses until every handle is dropped
    pub fn run(mut self) {
        info!("hotkey loop started");

        loop {
            pump_native_events();

            match self.commands.recv_timeout(COMMAND_WAIT) {
                Ok(command) => {
                    self.handle(command);
                    while let Ok(command) = self.commands.try_recv() {
                        self.handle(command);
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            }

            while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
                if matches!(event.state(), HotKeyState::Pressed) {
                    self.forward(event.id());
                }
            }
        }

        self.release_all();
        info!("hotkey loop stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { key, reply } => {
                let hotkey = HotKey::new(None, key.code());
                let result = match self.manager.register(hotkey) {
                    Ok(()) => {
                        self.held.insert(hotkey.id(), hotkey);
                        Ok(hotkey.id())
                    }
                    Err(reason) => Err(HotkeyError::Rejected { key, reason }),
                };
                let _ = reply.send(result);
            }
            Command::Unregister { id, reply } => {
                let result = match self.held.remove(&id) {
                    Some(hotkey) => self.manager.unregister(hotkey).map_err(|e| {
                        warn!(id, %e, "OS refused to unregister hotkey");
                        HotkeyError::UnknownId(id)
                    }),
                    None => Err(HotkeyError::UnknownId(id)),
                };
                let _ = reply.send(result);
            }
        }
    }

    fn forward(&mut self, id: u32) {
        if !self.forwarding {
            return;
        }
        debug!(id, "hotkey pressed");
        match self.activation_tx.try_send(id) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(id)) => {
                warn!(id, "activation channel full, dropping hotkey press");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("activation channel closed, no longer forwarding hotkeys");
                self.forwarding = false;
            }
        }
    }

    fn release_all(&mut self) {
        for (id, hotkey) in self.held.drain() {
            if let Err(e) = self.manager.unregister(hotkey) {
                warn!(id, %e, "failed to release hotkey on exit");
            }
        }
    }
}

/// Let the Carbon handler installed by the manager see queued key events
#[cfg(target_os = "macos")]
fn pump_native_events() {
    use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop};

    unsafe {
        CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, COMMAND_WAIT, true);
    }
}

/// Dispatch `WM_HOTKEY` to the manager's hidden window
#[cfg(target_os = "windows")]
fn pump_native_events() {
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    };

    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        while PeekMessageW(&mut msg, 0, 0, 0, PM_REMOVE) != 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

/// X11 events are read by the manager's own thread
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn pump_native_events() {}

/// Backend used when the OS facility could not be started
///
/// Every registration is refused so the rest of the daemon keeps working.
pub struct Unavailable {
    reason: String,
}

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl HotkeyBackend for Unavailable {
    fn register(&mut self, _key: Key) -> Result<u32, HotkeyError> {
        Err(HotkeyError::Unavailable(self.reason.clone()))
    }

    fn unregister(&mut self, id: u32) -> Result<(), HotkeyError> {
        Err(HotkeyError::UnknownId(id))
    }
}


#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread::{self, ThreadId};

    use super::fake::FakeBackend;
    use super::*;

    /// Manager that records which thread called it
    #[derive(Debug, Clone, Default)]
    struct ThreadManager {
        callers: Arc<Mutex<Vec<ThreadId>>>,
        active: Arc<Mutex<HashSet<u32>>>,
    }

    impl NativeManager for ThreadManager {
        fn register(&self, hotkey: HotKey) -> Result<(), String> {
            self.callers.lock().unwrap().push(thread::current().id());
            if !self.active.lock().unwrap().insert(hotkey.id()) {
                return Err("already registered".to_string());
            }
            Ok(())
        }

        fn unregister(&self, hotkey: HotKey) -> Result<(), String> {
            self.callers.lock().unwrap().push(thread::current().id());
            self.active.lock().unwrap().remove(&hotkey.id());
            Ok(())
        }
    }

    #[test]
    fn test_loop_serves_commands_on_creating_thread() {
        let manager = ThreadManager::default();
        let (activation_tx, _activation_rx) = mpsc::channel(4);
        let (hotkey_loop, mut handle) = OsHotkeyLoop::with_manager(manager.clone(), activation_tx);

        let client = thread::spawn(move || {
            let id = handle.register(Key::F2).unwrap();
            assert!(matches!(
                handle.register(Key::F2),
                Err(HotkeyError::Rejected { key: Key::F2, .. })
            ));
            handle.register(Key::F3).unwrap();
            handle.unregister(id).unwrap();
            assert_eq!(handle.unregister(id), Err(HotkeyError::UnknownId(id)));
        });

        // Returns once the client drops its handle
        hotkey_loop.run();
        client.join().unwrap();

        let owner = thread::current().id();
        let callers = manager.callers.lock().unwrap();
        assert_eq!(callers.len(), 5);
        assert!(callers.iter().all(|caller| *caller == owner));
        assert!(manager.active.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handle_reports_stopped_loop() {
        let (activation_tx, _activation_rx) = mpsc::channel(4);
        let (hotkey_loop, mut handle) =
            OsHotkeyLoop::with_manager(ThreadManager::default(), activation_tx);
        drop(hotkey_loop);
        assert_eq!(handle.register(Key::F2), Err(HotkeyError::LoopGone));
    }

    #[test]
    fn test_forward_stops_when_dispatcher_is_gone() {
        let (activation_tx, mut activation_rx) = mpsc::channel(1);
        let (mut hotkey_loop, _handle) =
            OsHotkeyLoop::with_manager(ThreadManager::default(), activation_tx);

        hotkey_loop.forward(7);
        hotkey_loop.forward(8);
        assert_eq!(activation_rx.try_recv().unwrap(), 7);
        assert!(activation_rx.try_recv().is_err());

        drop(activation_rx);
        hotkey_loop.forward(9);
        assert!(!hotkey_loop.forwarding);
    }

    #[test]
    fn test_unavailable_refuses_everything() {
        let mut backend = Unavailable::new("no display");
        let err = backend.register(Key::F2).unwrap_err();
        assert_eq!(err, HotkeyError::Unavailable("no display".to_string()));
        assert_eq!(backend.unregister(7), Err(HotkeyError::UnknownId(7)));
    }

    #[test]
    fn test_fake_rejects_foreign_claims() {
        let mut backend = FakeBackend::new();
        backend.claim_elsewhere(Key::F5);

        assert!(matches!(
            backend.register(Key::F5),
            Err(HotkeyError::Rejected { key: Key::F5, .. })
        ));
        let id = backend.register(Key::F6).unwrap();
        assert_eq!(backend.active().get(&id), Some(&Key::F6));
    }

    #[test]
    fn test_error_messages() {
        let err = HotkeyError::Rejected {
            key: Key::F3,
            reason: "already registered".to_string(),
        };
        assert_eq!(err.to_string(), "F3 could not be registered: already registered");
    }
}
