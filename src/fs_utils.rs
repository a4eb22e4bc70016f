//! Filesystem helpers shared by the tree builder, watcher and sessions
//!
//! - `normalize_path`: Strips Windows `\\?\` prefix from canonicalized paths
//! - `clean_path`: Drops `.` components so display paths match what clients send back
//! - `WorkspaceRoot`: The configured root in both its display and canonical forms
//! - `read_text`: Reads a file as (lossy) UTF-8 text

use std::io;
use std::path::{Component, Path, PathBuf};

/// Content sent in place of a file that could not be read.
pub const FILE_NOT_FOUND: &str = "File not found";

/// Normalize Windows paths by removing the `\\?\` prefix if present.
///
/// `Path::canonicalize()` on Windows returns extended-length paths, which
/// would never match the prefix of paths reported by the watcher.
/// This is a no-op on Unix.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use workspace_sync::fs_utils::normalize_path;
///
/// let path = PathBuf::from("/home/user/workspace");
/// assert_eq!(normalize_path(&path), path);
/// ```
pub fn normalize_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let s = path.to_string_lossy();
        if let Some(stripped) = s.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{}", stripped));
        }
        if let Some(stripped) = s.strip_prefix(r"\\?\") {
            return PathBuf::from(stripped);
        }
    }
    path.to_path_buf()
}

/// Remove `.` components from a path without touching the filesystem.
///
/// `./code-server/workspace` becomes `code-server/workspace`. A path made only
/// of `.` components becomes `.`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use workspace_sync::fs_utils::clean_path;
///
/// assert_eq!(clean_path(Path::new("./a/./b")), Path::new("a/b"));
/// ```
pub fn clean_path(path: &Path) -> PathBuf {
    let cleaned: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

/// The workspace directory being observed and served.
///
/// Keeps the path as configured (used to build the paths clients see) next
/// to its canonical form (used to interpret absolute paths from the OS
/// watcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    display: PathBuf,
    canonical: PathBuf,
}

impl WorkspaceRoot {
    /// Resolve a configured root. Fails if it is not an existing directory.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let canonical = normalize_path(&path.canonicalize()?);
        if !canonical.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", path.display()),
            ));
        }
        Ok(Self {
            display: clean_path(path),
            canonical,
        })
    }

    /// Root as configured, without `.` components.
    pub fn display(&self) -> &Path {
        &self.display
    }

    /// Canonical absolute root.
    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    /// Translate a path reported by the OS into the form used in snapshots.
    ///
    /// Returns `None` when the path is outside the root.
    pub fn to_display(&self, path: &Path) -> Option<PathBuf> {
        let path = normalize_path(path);
        let rel = path
            .strip_prefix(&self.canonical)
            .or_else(|_| path.strip_prefix(&self.display))
            .ok()?;
        if rel.as_os_str().is_empty() {
            Some(self.display.clone())
        } else {
            Some(self.display.join(rel))
        }
    }
}

/// Read a whole file as text, replacing invalid UTF-8 sequences.
pub async fn read_text(path: &Path) -> io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}
