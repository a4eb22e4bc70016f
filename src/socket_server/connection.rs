//! WebSocket connection handler
//!
//! One `ConnectionSession` per client. It owns the client's watch engine and
//! dev server supervisor and runs a single dispatch loop over:
//!
//! - inbound frames (`getFile` requests)
//! - watch events (tree snapshots, pushed file content)
//! - process events (error batches, exit notices)
//! - the registry's shutdown signal
//!
//! Teardown stops the watcher and the dev server before the session is
//! unregistered, so a disconnected client leaves nothing running behind.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_async, WebSocketStream};

use crate::config::DaemonConfig;
use crate::error::{Result, SyncError};
use crate::fs_utils::{read_text, WorkspaceRoot, FILE_NOT_FOUND};
use crate::server::{ProcessEvent, ProcessSpec, ProcessSupervisor, WatchEngine, WatchEvent};
use crate::socket_server::protocol::{
    exit_notice, spawn_failure_notice, ClientMessage, Outbound, ServerMessage,
};
use crate::socket_server::session_registry::{SessionId, SessionRegistry};

/// Upper bound on sending the close frame during teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle a single WebSocket connection until it closes
pub async fn handle_connection<S>(
    stream: S,
    peer: Option<SocketAddr>,
    registry: Arc<SessionRegistry>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    tracing::info!("New connection from {:?}", peer);

    // Accept WebSocket handshake
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let mut session = ConnectionSession::new(ws_stream, peer, registry);
    session.run().await;

    tracing::info!("Connection closed from {:?}", peer);
}

/// What the dispatch loop does after handling an input
enum Flow {
    Continue,
    Close,
}

/// State for a single connection
struct ConnectionSession<S> {
    id: SessionId,
    ws: WebSocketStream<S>,
    config: Arc<DaemonConfig>,
    registry: Arc<SessionRegistry>,
    watcher: Option<WatchEngine>,
    supervisor: ProcessSupervisor,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<S> ConnectionSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn new(ws: WebSocketStream<S>, peer: Option<SocketAddr>, registry: Arc<SessionRegistry>) -> Self {
        // Subscribe first so a shutdown racing the registration is not missed
        let shutdown_rx = registry.subscribe_shutdown();
        let info = registry.register(peer);
        let config = registry.shared_config();

        let watcher = match WorkspaceRoot::new(&config.workspace_root)
            .map_err(|_| SyncError::WorkspaceRoot {
                path: config.workspace_root.display().to_string(),
            })
            .and_then(|root| WatchEngine::start(root, &config.watcher))
        {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::error!("Session {}: file watching unavailable: {}", info.id, e);
                None
            }
        };

        Self {
            id: info.id,
            ws,
            config,
            registry,
            watcher,
            supervisor: ProcessSupervisor::new(),
            shutdown_rx,
        }
    }

    async fn run(&mut self) {
        match self.open().await {
            Ok(()) => loop {
                let step = tokio::select! {
                    frame = self.ws.next() => self.on_frame(frame).await,
                    Some(event) = next_watch_event(self.watcher.as_mut()) => {
                        self.on_watch_event(event).await
                    }
                    Some(event) = self.supervisor.next_event() => self.on_process_event(event).await,
                    _ = self.shutdown_rx.recv() => {
                        tracing::info!("Session {} closing for shutdown", self.id);
                        Ok(Flow::Close)
                    }
                };

                match step {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Close) => break,
                    Err(e) => {
                        self.log_transport_error(&e);
                        break;
                    }
                }
            },
            Err(e) => self.log_transport_error(&e),
        }

        self.teardown().await;
    }

    /// Initial snapshot, then the dev server
    async fn open(&mut self) -> Result<()> {
        let data = match self.watcher.as_ref() {
            Some(watcher) => watcher.snapshot().await,
            None => Vec::new(),
        };
        self.send(ServerMessage::DirectoryTree { data }).await?;

        if !self.config.process.enabled {
            return Ok(());
        }

        let process = &self.config.process;
        let spec = ProcessSpec::new(
            process.command.clone(),
            process.args.clone(),
            self.config.workspace_root.clone(),
        )
        .with_flush_interval(process.flush_interval());

        match self.supervisor.start(&spec) {
            Ok(()) => Ok(()),
            Err(SyncError::ProcessSpawn { source, .. }) => {
                let structured = self.config.protocol.structured_notices;
                self.send(spawn_failure_notice(&source.to_string(), structured))
                    .await
            }
            Err(e) => {
                tracing::error!("Session {}: {}", self.id, e);
                Ok(())
            }
        }
    }

    async fn on_frame(
        &mut self,
        frame: Option<std::result::Result<Message, tungstenite::Error>>,
    ) -> Result<Flow> {
        match frame {
            Some(Ok(Message::Text(text))) => self.handle_message(&text).await,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => self.handle_message(&text).await,
                Err(_) => {
                    tracing::debug!("Session {}: ignoring non-UTF-8 binary frame", self.id);
                    Ok(Flow::Continue)
                }
            },
            Some(Ok(Message::Close(_))) => {
                tracing::info!("Client {} requested close", self.id);
                Ok(Flow::Close)
            }
            Some(Ok(_)) => Ok(Flow::Continue),
            Some(Err(e)) => Err(e.into()),
            None => Ok(Flow::Close),
        }
    }

    async fn handle_message(&mut self, text: &str) -> Result<Flow> {
        let msg = match ClientMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Session {}: ignoring malformed message: {}", self.id, e);
                return Ok(Flow::Continue);
            }
        };

        match msg {
            ClientMessage::GetFile { data } => {
                let include_path = self.config.protocol.include_path_on_missing;
                let reply = read_requested_file(&data, include_path).await;
                self.send(reply).await?;
            }
            ClientMessage::Unknown => {
                tracing::debug!("Session {}: ignoring unknown message type", self.id);
            }
        }
        Ok(Flow::Continue)
    }

    async fn on_watch_event(&mut self, event: WatchEvent) -> Result<Flow> {
        let msg = match self.watcher.as_ref() {
            Some(watcher) => watcher.resolve(&event).await,
            None => return Ok(Flow::Continue),
        };
        self.send(msg).await?;
        Ok(Flow::Continue)
    }

    async fn on_process_event(&mut self, event: ProcessEvent) -> Result<Flow> {
        let structured = self.config.protocol.structured_notices;
        match event {
            ProcessEvent::ErrorBatch(data) => self.send(ServerMessage::Error { data }).await?,
            ProcessEvent::Exited(code) => self.send(exit_notice(code, structured)).await?,
        }
        Ok(Flow::Continue)
    }

    async fn send(&mut self, msg: impl Into<Outbound>) -> Result<()> {
        let text = msg.into().into_text()?;
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    fn log_transport_error(&self, e: &SyncError) {
        if e.is_disconnect() {
            tracing::debug!("Session {}: client went away: {}", self.id, e);
        } else {
            tracing::error!("Session {}: {}", self.id, e);
        }
    }

    /// Release everything the session owns
    async fn teardown(&mut self) {
        tracing::info!("Session {} disconnected", self.id);

        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.supervisor.stop().await;

        let _ = tokio::time::timeout(CLOSE_TIMEOUT, self.ws.close(None)).await;
        self.registry.unregister(&self.id);
    }
}

/// Answer a `getFile` request. Paths resolve against the daemon's working
/// directory, the same base the snapshot's paths use.
async fn read_requested_file(requested: &str, include_path: bool) -> ServerMessage {
    match read_text(Path::new(requested)).await {
        Ok(content) => ServerMessage::file_content(content, requested),
        Err(e) => {
            tracing::debug!("getFile {} failed: {}", requested, e);
            ServerMessage::FileContent {
                data: FILE_NOT_FOUND.to_string(),
                file: include_path.then(|| requested.to_string()),
            }
        }
    }
}

async fn next_watch_event(watcher: Option<&mut WatchEngine>) -> Option<WatchEvent> {
    match watcher {
        Some(watcher) => watcher.next_event().await,
        None => None,
    }
}
