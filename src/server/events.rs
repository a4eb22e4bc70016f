//! Events produced by the per-session event sources
//!
//! The watch engine and the process supervisor each yield one of these
//! tagged unions to the session's single dispatch loop.

use std::path::PathBuf;

/// A classified filesystem change under the workspace root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A file or directory appeared
    Added(PathBuf),
    /// A known file's content changed
    Changed(PathBuf),
    /// A known file or directory disappeared
    Removed(PathBuf),
}

impl WatchEvent {
    /// Absolute path the event refers to
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Added(p) | Self::Changed(p) | Self::Removed(p) => p,
        }
    }

    /// Whether the event changes the shape of the tree
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Added(_) | Self::Removed(_))
    }
}

/// Output of a supervised dev-server process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Newline-joined stderr lines from one flush window
    ErrorBatch(String),
    /// The process exited by itself; `None` when killed by a signal
    Exited(Option<i32>),
}
