//! Workspace Sync Socket Server
//!
//! A standalone daemon that mirrors a workspace to browser clients over
//! WebSocket and supervises the workspace's dev server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 WORKSPACE SYNC DAEMON (workspace-sync-daemon)           │
//! │                  Single daemon, one session per client                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 SessionRegistry (Arc, RwLock map)                │   │
//! │  │                                                                  │   │
//! │  │  cli_1a2b3c4d ──► SessionInfo { peer, connected_at }            │   │
//! │  │  cli_5e6f7a8b ──► SessionInfo { ... }                           │   │
//! │  │                                                                  │   │
//! │  │  shutdown broadcast ──► every session                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  WebSocket Server ──► ConnectionSession per client                      │
//! │    - WatchEngine (own subscription)                                     │
//! │    - ProcessSupervisor (own dev server)                                 │
//! │    - getFile handling                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! All messages are JSON over WebSocket, except the plain-text process
//! notices:
//!
//! ```json
//! // Client -> Server
//! {"type": "getFile", "data": "code-server/workspace/src/app.ts"}
//!
//! // Server -> Client
//! {"type": "directory-tree", "data": [...]}
//! {"type": "fileContent", "data": "...", "file": "code-server/workspace/src/app.ts"}
//! {"type": "error", "data": "line one\nline two"}
//! ```
//!
//! ```text
//! Process exited with code 1
//! Failed to start process: No such file or directory (os error 2)
//! ```

pub mod connection;
pub mod protocol;
pub mod session_registry;

use std::sync::Arc;

use tokio::net::TcpListener;

pub use connection::handle_connection;
pub use protocol::{ClientMessage, Outbound, ServerMessage};
pub use session_registry::{SessionId, SessionInfo, SessionRegistry};

/// Accept connections until the listener fails.
///
/// Each connection runs on its own task. Accept errors are logged and
/// skipped; this only returns when the future is dropped.
pub async fn serve(listener: TcpListener, registry: Arc<SessionRegistry>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tracing::info!("Accepted connection from {}", addr);
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    handle_connection(stream, Some(addr), registry).await;
                });
            }
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
            }
        }
    }
}
