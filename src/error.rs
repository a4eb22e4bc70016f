//! Error types for workspace-sync

use thiserror::Error;

/// Main error type for workspace-sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Workspace root is not a readable directory: {path}")]
    WorkspaceRoot { path: String },

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Failed to start process `{command}`: {source}")]
    ProcessSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process supervisor was already started")]
    AlreadyStarted,

    #[error("Malformed message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether the error means the client transport is gone.
    ///
    /// Sessions treat these as a teardown trigger rather than a failure.
    pub fn is_disconnect(&self) -> bool {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match self {
            Self::WebSocket(WsError::ConnectionClosed)
            | Self::WebSocket(WsError::AlreadyClosed)
            | Self::WebSocket(WsError::Io(_)) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

/// Result type alias for workspace-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
