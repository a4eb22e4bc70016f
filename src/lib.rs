//! Workspace Sync: mirror a workspace to browser clients over WebSocket
//!
//! Every connected client gets a session that:
//!
//! - receives a sorted snapshot of the workspace directory on connect
//! - receives a fresh snapshot whenever an entry is added or removed
//! - receives the new content of any file that changes
//! - can request any file's content with `getFile`
//! - receives the dev server's stderr in batches, plus a notice on exit
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use workspace_sync::{serve, DaemonConfig, SessionRegistry};
//!
//! let config = DaemonConfig::load(None)?;
//! let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
//! let registry = Arc::new(SessionRegistry::new(config));
//! serve(listener, registry).await;
//! ```

pub mod config;
pub mod error;
pub mod fs_utils;
pub mod server;
pub mod socket_server;
pub mod tree;

// Re-export commonly used types
pub use config::{DaemonConfig, ProcessConfig, ProtocolConfig, WatcherConfig};
pub use error::{Result, SyncError};
pub use fs_utils::{WorkspaceRoot, FILE_NOT_FOUND};
pub use server::{ProcessEvent, ProcessSpec, ProcessSupervisor, WatchEngine, WatchEvent};
pub use socket_server::{handle_connection, serve, ClientMessage, ServerMessage, SessionRegistry};
pub use tree::{build_tree, snapshot_children, DirectoryNode, ExclusionRules, NodeKind};
