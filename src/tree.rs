//! Directory tree snapshots of the workspace
//!
//! Builds the typed node tree the editor's file explorer renders. A snapshot
//! is rebuilt wholesale whenever an entry is added or removed; snapshots are
//! never diffed against each other.
//!
//! # Ordering
//!
//! Within every `children` list directories come before files, and each
//! group is ordered by name, case-insensitively first with lowercase winning
//! ties (`a.txt` < `A.txt` < `b.txt`).

use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Path segments excluded from snapshots and watch events by default
pub const DEFAULT_EXCLUDES: &[&str] = &["node_modules", ".next", ".git"];

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    File,
}

/// One entry in a directory snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    /// Basename
    pub name: String,
    /// Workspace-root-joined path, unique within a snapshot
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// File size in bytes; for directories the sum of all descendant files
    pub size: u64,
    /// Extension with a leading dot, files only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Tree widget label (same as `name`)
    pub label: String,
    /// Tree widget value (same as `path`)
    pub value: String,
    /// Present only for directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DirectoryNode>>,
}

impl DirectoryNode {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    fn new(name: String, path: String, kind: NodeKind) -> Self {
        Self {
            label: name.clone(),
            value: path.clone(),
            name,
            path,
            kind,
            size: 0,
            extension: None,
            children: None,
        }
    }
}

/// Path-segment exclusion rules shared by the tree builder and the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionRules {
    segments: Vec<String>,
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDES.iter().copied())
    }
}

impl ExclusionRules {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Rules that exclude nothing
    pub fn none() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when a single entry name is excluded
    pub fn matches_name(&self, name: &OsStr) -> bool {
        self.segments.iter().any(|s| OsStr::new(s) == name)
    }

    /// True when any normal component of `path` is excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        path.components().any(|c| match c {
            Component::Normal(name) => self.matches_name(name),
            _ => false,
        })
    }
}

/// Build a snapshot rooted at `root`.
///
/// `display_root` is the prefix used for every node's `path`. Entries that
/// cannot be read are left out; `None` is returned only when `root` itself
/// cannot be read. The result is already sorted.
pub fn build_tree(root: &Path, display_root: &Path, rules: &ExclusionRules) -> Option<DirectoryNode> {
    let mut tree = build_node(root, display_root, rules)?;
    sort_tree(&mut tree);
    Some(tree)
}

/// Sorted children of the root, as carried by `directory-tree` events.
///
/// An unreadable root yields an empty list.
pub fn snapshot_children(root: &Path, display_root: &Path, rules: &ExclusionRules) -> Vec<DirectoryNode> {
    match build_tree(root, display_root, rules) {
        Some(tree) => tree.children.unwrap_or_default(),
        None => {
            tracing::warn!("Workspace root {} could not be read", root.display());
            Vec::new()
        }
    }
}

fn build_node(path: &Path, display: &Path, rules: &ExclusionRules) -> Option<DirectoryNode> {
    let name = display
        .file_name()
        .or_else(|| path.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| display.to_string_lossy().into_owned());
    let display_str = display.to_string_lossy().into_owned();

    let link_meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("Skipping {}: {}", path.display(), e);
            return None;
        }
    };
    let is_link = link_meta.file_type().is_symlink();
    let meta = if is_link {
        match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("Skipping dangling link {}: {}", path.display(), e);
                return None;
            }
        }
    } else {
        link_meta
    };

    if meta.is_dir() {
        let mut node = DirectoryNode::new(name, display_str, NodeKind::Directory);
        // Linked directories are shown but not followed, so cycles can't recurse.
        if is_link {
            node.children = Some(Vec::new());
            return Some(node);
        }

        let entries = match fs::read_dir(path) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("Skipping unreadable directory {}: {}", path.display(), e);
                return None;
            }
        };

        let mut children = Vec::new();
        for entry in entries.flatten() {
            let entry_name = entry.file_name();
            if rules.matches_name(&entry_name) {
                continue;
            }
            if let Some(child) = build_node(&entry.path(), &display.join(&entry_name), rules) {
                children.push(child);
            }
        }

        node.size = children.iter().map(|c| c.size).sum();
        node.children = Some(children);
        Some(node)
    } else if meta.is_file() {
        let mut node = DirectoryNode::new(name, display_str, NodeKind::File);
        node.size = meta.len();
        node.extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()));
        Some(node)
    } else {
        // Sockets, fifos and devices have no place in the explorer
        None
    }
}

/// Compare two names the way the explorer lists them
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

fn compare_nodes(a: &DirectoryNode, b: &DirectoryNode) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => compare_names(&a.name, &b.name),
    }
}

/// Sort a node's direct children, then recurse into each child.
pub fn sort_tree(node: &mut DirectoryNode) {
    if let Some(children) = node.children.as_mut() {
        children.sort_by(compare_nodes);
        for child in children.iter_mut() {
            sort_tree(child);
        }
    }
}

/// Every non-excluded entry below `root` (absolute paths, root excluded).
///
/// Used to seed and refresh the watcher's set of known entries.
pub fn collect_entries(root: &Path, rules: &ExclusionRules) -> Vec<PathBuf> {
    let mut entries = Vec::new();
    collect_entries_recursive(root, rules, &mut entries);
    entries
}

fn collect_entries_recursive(dir: &Path, rules: &ExclusionRules, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        if rules.matches_name(&entry.file_name()) {
            continue;
        }
        let path = entry.path();
        let is_real_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        out.push(path.clone());
        if is_real_dir {
            collect_entries_recursive(&path, rules, out);
        }
    }
}
