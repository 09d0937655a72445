//! Unix domain socket server for IPC
//!
//! The settings window and tray talk to the daemon here: they read and
//! edit bindings, and subscribed clients receive every user-facing event.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{debug, error, info, warn};

use crate::events::CoreEvent;
use crate::hotkey::Key;
use crate::service::Service;

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Largest accepted request body
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared with every client handler
struct Shared {
    service: Service,
    start_time: Instant,
    shutdown_requested: Notify,
}

impl Server {
    /// Create a new IPC server bound to `socket_path`
    pub fn new(socket_path: &Path, service: Service) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            shared: Arc::new(Shared {
                service,
                start_time: Instant::now(),
                shutdown_requested: Notify::new(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Resolves once a client has asked the daemon to exit
    pub async fn shutdown_requested(&self) {
        self.shared.shutdown_requested.notified().await;
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();

        // Frames are read on their own task so waiting for an event never
        // interrupts a half-read request.
        let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(8);
        let reader_task = tokio::spawn(read_frames(reader, frame_tx));

        let mut events: Option<broadcast::Receiver<CoreEvent>> = None;

        let result = loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else {
                        break Ok(());
                    };

                    let response = match serde_json::from_slice::<Request>(&frame) {
                        Ok(request) => {
                            debug!(?request, "received request");
                            if request == Request::Subscribe && events.is_none() {
                                events = Some(shared.service.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            Self::process_request(request, &shared).await
                        }
                        Err(e) => {
                            warn!(%e, "failed to parse request");
                            Response::Error {
                                code: "bad_request".to_string(),
                                message: e.to_string(),
                            }
                        }
                    };

                    if let Err(e) = send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = next_event(&mut events) => {
                    match event {
                        Ok(event) => {
                            if let Err(e) = send_message(&mut writer, &Notification::from(event)).await {
                                break Err(e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "client notification receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            events = None;
                        }
                    }
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Process a request and return a response
    async fn process_request(request: Request, shared: &Shared) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let (bindings, registered) = shared.service.counts().await;
                Response::Status(DaemonStatus {
                    bindings,
                    registered,
                    uptime_secs: shared.start_time.elapsed().as_secs(),
                    ..DaemonStatus::default()
                })
            }

            Request::ListKeys => Response::Keys {
                keys: Key::ALL.to_vec(),
            },

            Request::GetBindings => Response::Bindings {
                bindings: shared.service.get_all_bindings().await,
            },

            Request::SetBinding { key, target } => {
                info!(%key, %target, "binding edit via IPC");
                shared.service.set_binding(key, &target).await.into()
            }

            Request::RemoveBinding { key } => {
                info!(%key, "binding removal via IPC");
                shared.service.remove_binding(key).await.into()
            }

            Request::Subscribe => Response::Subscribed,

            Request::Shutdown => {
                info!("shutdown requested via IPC");
                shared.shutdown_requested.notify_one();
                Response::ShuttingDown
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Next event for a subscribed client; pending forever otherwise
async fn next_event(
    events: &mut Option<broadcast::Receiver<CoreEvent>>,
) -> Result<CoreEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read length-prefixed frames until EOF or an oversized frame
async fn read_frames<R: AsyncRead + Unpin>(mut reader: R, frame_tx: mpsc::Sender<Vec<u8>>) {
    let mut len_buf = [0u8; 4];

    loop {
        // Read message length (4-byte little-endian)
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("client disconnected");
                return;
            }
            Err(e) => {
                warn!(?e, "failed to read from client");
                return;
            }
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            warn!(len, "message too large, disconnecting");
            return;
        }

        let mut msg_buf = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut msg_buf).await {
            warn!(?e, "truncated message from client");
            return;
        }

        if frame_tx.send(msg_buf).await.is_err() {
            return;
        }
    }
}

/// Send a length-prefixed JSON message
async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}
