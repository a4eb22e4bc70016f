//! Socket server protocol message types
//!
//! Defines the JSON message format for client-server communication.
//!
//! ```json
//! // Client -> Server
//! {"type": "getFile", "data": "code-server/workspace/app/page.tsx"}
//!
//! // Server -> Client
//! {"type": "directory-tree", "data": [...]}
//! {"type": "fileContent", "data": "...", "file": "code-server/workspace/app/page.tsx"}
//! {"type": "error", "data": "Module not found: ..."}
//! ```
//!
//! Process lifecycle notices are sent as plain text frames
//! (`Process exited with code 0`) unless structured notices are enabled.

use serde::{Deserialize, Serialize};

use crate::tree::DirectoryNode;

/// Client-to-server message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Request the content of a file
    #[serde(rename = "getFile")]
    GetFile { data: String },
    /// Any message type this server does not understand
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse an inbound frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Server-to-client JSON message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full children list of the workspace root
    #[serde(rename = "directory-tree")]
    DirectoryTree { data: Vec<DirectoryNode> },
    /// File content, pushed on change or returned for `getFile`
    #[serde(rename = "fileContent")]
    FileContent {
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    /// A flushed batch of dev-server stderr lines
    #[serde(rename = "error")]
    Error { data: String },
    /// Structured form of the process exit notice
    #[serde(rename = "process-exit")]
    ProcessExit { code: Option<i32> },
    /// Structured form of the spawn failure notice
    #[serde(rename = "process-error")]
    ProcessError { data: String },
}

impl ServerMessage {
    pub fn file_content(data: impl Into<String>, file: impl Into<String>) -> Self {
        Self::FileContent {
            data: data.into(),
            file: Some(file.into()),
        }
    }
}

/// Anything the session can put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized as a JSON object
    Json(ServerMessage),
    /// Sent verbatim
    Text(String),
}

impl Outbound {
    /// Render the frame payload
    pub fn into_text(self) -> serde_json::Result<String> {
        match self {
            Self::Json(msg) => serde_json::to_string(&msg),
            Self::Text(text) => Ok(text),
        }
    }
}

impl From<ServerMessage> for Outbound {
    fn from(msg: ServerMessage) -> Self {
        Self::Json(msg)
    }
}

/// Notice sent when the dev server exits
pub fn exit_notice(code: Option<i32>, structured: bool) -> Outbound {
    if structured {
        return ServerMessage::ProcessExit { code }.into();
    }
    let code = code.map_or_else(|| "null".to_string(), |c| c.to_string());
    Outbound::Text(format!("Process exited with code {}", code))
}

/// Notice sent when the dev server could not be spawned
pub fn spawn_failure_notice(message: &str, structured: bool) -> Outbound {
    if structured {
        return ServerMessage::ProcessError {
            data: message.to_string(),
        }
        .into();
    }
    Outbound::Text(format!("Failed to start process: {}", message))
}
