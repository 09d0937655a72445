//! keylaunch-daemon: binds global hotkeys to programs and URIs
//!
//! The daemon runs in the background and provides:
//! - Key → target bindings persisted to a JSON file
//! - System-wide hotkey registration for every bound key
//! - Launching the bound program or URI when a hotkey fires
//! - IPC server for the settings window and tray icon

mod bindings;
mod config;
mod dispatch;
mod events;
mod hotkey;
mod ipc;
mod launcher;
mod lifecycle;
mod service;

use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::bindings::BindingsFile;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::events::CoreEvent;
use crate::hotkey::{HotkeyBackend, OsHotkeyLoop, Registrar, Unavailable};
use crate::ipc::Server;
use crate::launcher::SystemLauncher;
use crate::lifecycle::ShutdownSignal;
use crate::service::Service;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "keylaunch-daemon starting"
    );

    // OS hotkeys -> dispatcher
    let (activation_tx, activation_rx) = mpsc::channel(32);

    // The hotkey manager stays on the main thread, which pumps the native
    // event loop; the async daemon gets a thread of its own.
    match OsHotkeyLoop::new(activation_tx.clone()) {
        Ok((hotkey_loop, hotkeys)) => {
            info!("global hotkeys available");
            let daemon = thread::Builder::new()
                .name("daemon".to_string())
                .spawn(move || run_daemon(Box::new(hotkeys), activation_tx, activation_rx))?;

            // Returns once the daemon has released its handle
            hotkey_loop.run();

            daemon
                .join()
                .map_err(|_| anyhow!("daemon thread panicked"))?
        }
        Err(e) => {
            error!(%e, "failed to start global hotkeys");
            warn!("continuing without hotkey support - bindings can still be edited");
            run_daemon(
                Box::new(Unavailable::new(e.to_string())),
                activation_tx,
                activation_rx,
            )
        }
    }
}

fn run_daemon(
    backend: Box<dyn HotkeyBackend>,
    activation_tx: mpsc::Sender<u32>,
    activation_rx: mpsc::Receiver<u32>,
) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(daemon(backend, activation_tx, activation_rx))
}

async fn daemon(
    backend: Box<dyn HotkeyBackend>,
    activation_tx: mpsc::Sender<u32>,
    activation_rx: mpsc::Receiver<u32>,
) -> Result<()> {
    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.bindings_path, ?config.socket_path, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // Core -> tray / IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<CoreEvent>(64);

    let file = BindingsFile::new(&config.bindings_path);
    let store = file.load();
    info!(path = ?file.path(), bindings = store.len(), "bindings ready");
    let service = Service::new(store, file, Registrar::new(backend), event_tx.clone());

    let conflicts = service.start().await;
    if !conflicts.is_empty() {
        warn!(?conflicts, "some hotkeys could not be registered");
    }

    let mut dispatcher = Dispatcher::new(service.clone(), Arc::new(SystemLauncher), event_tx.clone());

    let server = Server::new(&config.socket_path, service.clone())?;

    let mut log_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Launch targets for incoming hotkey presses
        _ = dispatcher.run(activation_rx) => {
            info!("dispatcher exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log every user-facing event
        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) if event.is_failure() => warn!(%event, "core event"),
                    Ok(event) => info!(%event, "core event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event log receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("event log exited");
        }

        _ = server.shutdown_requested() => {
            info!("shutdown requested by client");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    drop(activation_tx);
    info!("shutting down...");

    service.shutdown().await;
    server.shutdown().await;

    info!("keylaunch-daemon stopped");

    Ok(())
}
