//! File system watcher for a session's workspace root
//!
//! Uses `notify` to watch the root recursively. Raw notifications are
//! gathered over a short window (`watcher.debounce_ms`), repeats within the
//! window are collapsed, and what is left is classified in arrival order.
//!
//! Only kinds that can change the tree or a file's content count:
//! creations, removals, renames and data modifications. Access and metadata
//! notifications are dropped, so reads (including the engine's own) and
//! permission or timestamp changes never become events.
//!
//! A counted path is then classified against the set of entries the engine
//! knows about:
//!
//! | on disk   | known | event      |
//! |-----------|-------|------------|
//! | exists    | no    | `Added`    |
//! | file      | yes   | `Changed`  |
//! | directory | yes   | (none)     |
//! | missing   | yes   | `Removed`  |
//! | missing   | no    | (none)     |
//!
//! A file replaced by a rename (editors saving through a temp file) is
//! therefore a `Changed`, not an `Added`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐     ┌─────────┐
//! │   notify    │────>│   window     │────>│ WatchEngine  │────>│ session │
//! │   watcher   │     │  (100ms)     │     │  (classify)  │     │  loop   │
//! └─────────────┘     └──────────────┘     └──────────────┘     └─────────┘
//! ```

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

use crate::config::WatcherConfig;
use crate::error::Result;
use crate::fs_utils::{normalize_path, read_text, WorkspaceRoot, FILE_NOT_FOUND};
use crate::socket_server::protocol::ServerMessage;
use crate::tree::{collect_entries, snapshot_children, DirectoryNode, ExclusionRules};

use super::events::WatchEvent;

/// Paths of a raw notification that may have changed the tree or a file.
///
/// Empty for access and metadata notifications.
fn relevant_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Access(_) | EventKind::Other => &[],
        EventKind::Modify(ModifyKind::Metadata(_)) => &[],
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
            event.paths.as_slice()
        }
    }
}

/// Per-session filesystem subscription
pub struct WatchEngine {
    root: WorkspaceRoot,
    rules: ExclusionRules,
    window: Duration,
    /// Dropping the watcher cancels the OS subscription
    watcher: Option<RecommendedWatcher>,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    /// Raw notifications gathered in the current window, in arrival order
    batch: Vec<Event>,
    /// End of the current window, if one is open
    batch_deadline: Option<Instant>,
    /// Entries that existed at subscription time or were added since
    known: HashSet<PathBuf>,
    /// Classified events not yet handed out
    pending: VecDeque<WatchEvent>,
}

impl WatchEngine {
    /// Subscribe to changes under `root`.
    ///
    /// Entries that already exist are recorded but produce no events.
    pub fn start(root: WorkspaceRoot, config: &WatcherConfig) -> Result<Self> {
        let rules = config.exclusion_rules();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The receiver is gone once the engine stops
            let _ = tx.send(res);
        })?;
        watcher.watch(root.canonical(), RecursiveMode::Recursive)?;

        // Scan after subscribing so nothing slips between the scan and the watch
        let mut known = HashSet::new();
        Self::remember_tree(&mut known, root.canonical(), &rules);

        tracing::info!(
            "[WATCHER] Watching {} ({} existing entries)",
            root.display().display(),
            known.len()
        );

        Ok(Self {
            root,
            rules,
            window: config.debounce_duration(),
            watcher: Some(watcher),
            rx,
            batch: Vec::new(),
            batch_deadline: None,
            known,
            pending: VecDeque::new(),
        })
    }

    pub fn root(&self) -> &WorkspaceRoot {
        &self.root
    }

    /// Check if the subscription is still active
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Wait for the next classified event.
    ///
    /// Returns `None` once the engine has been stopped. Cancel-safe: a
    /// partially gathered window is kept on the engine.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.watcher.is_none() {
                return None;
            }

            match self.batch_deadline {
                None => match self.rx.recv().await {
                    Some(res) => {
                        self.gather(res);
                        self.batch_deadline = Some(Instant::now() + self.window);
                    }
                    None => return None,
                },
                Some(deadline) => match timeout_at(deadline, self.rx.recv()).await {
                    Ok(Some(res)) => self.gather(res),
                    // Window elapsed, or the channel closed with a window open
                    Ok(None) | Err(_) => {
                        self.batch_deadline = None;
                        let batch = std::mem::take(&mut self.batch);
                        tracing::debug!("[WATCHER] Received {} raw events", batch.len());
                        self.classify_batch(batch);
                    }
                },
            }
        }
    }

    fn gather(&mut self, res: notify::Result<Event>) {
        match res {
            Ok(event) => self.batch.push(event),
            Err(e) => tracing::warn!("[WATCHER] Watch error: {:?}", e),
        }
    }

    /// Classify one window of raw notifications, keeping arrival order
    fn classify_batch(&mut self, events: Vec<Event>) {
        let mut classified: Vec<WatchEvent> = Vec::new();

        for event in &events {
            for raw in relevant_paths(event) {
                let path = normalize_path(raw);
                let rel = match path.strip_prefix(self.root.canonical()) {
                    Ok(rel) => rel,
                    Err(_) => continue,
                };
                if rel.as_os_str().is_empty() || self.rules.is_excluded(rel) {
                    continue;
                }

                if let Some(watch_event) = self.classify(path) {
                    if !classified.contains(&watch_event) {
                        classified.push(watch_event);
                    }
                }
            }
        }

        for event in &classified {
            tracing::debug!("[WATCHER] {:?}", event);
        }
        self.pending.extend(classified);
    }

    /// Classify one path by what is on disk now, updating the known set
    fn classify(&mut self, path: PathBuf) -> Option<WatchEvent> {
        let on_disk = fs::symlink_metadata(&path).ok().map(|meta| meta.is_dir());
        let known = self.known.contains(&path);

        match (on_disk, known) {
            (Some(is_dir), false) => {
                if is_dir {
                    Self::remember_tree(&mut self.known, &path, &self.rules);
                }
                self.known.insert(path.clone());
                Some(WatchEvent::Added(path))
            }
            (Some(false), true) => Some(WatchEvent::Changed(path)),
            (Some(true), true) => None,
            (None, true) => {
                self.known.retain(|p| !p.starts_with(&path));
                Some(WatchEvent::Removed(path))
            }
            (None, false) => {
                tracing::debug!("[WATCHER] Ignoring transient entry {:?}", path);
                None
            }
        }
    }

    fn remember_tree(known: &mut HashSet<PathBuf>, dir: &Path, rules: &ExclusionRules) {
        known.extend(collect_entries(dir, rules).iter().map(|entry| normalize_path(entry)));
    }

    /// Turn an event into the message the client receives.
    ///
    /// Structural events rebuild the snapshot; content changes read the file,
    /// falling back to a sentinel when it can't be read.
    pub async fn resolve(&self, event: &WatchEvent) -> ServerMessage {
        match event {
            WatchEvent::Added(_) | WatchEvent::Removed(_) => ServerMessage::DirectoryTree {
                data: self.snapshot().await,
            },
            WatchEvent::Changed(path) => {
                let display = self.root.to_display(path).unwrap_or_else(|| path.clone());
                let content = match read_text(path).await {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::debug!("[WATCHER] Could not read {:?}: {}", path, e);
                        FILE_NOT_FOUND.to_string()
                    }
                };
                ServerMessage::file_content(content, display.to_string_lossy())
            }
        }
    }

    /// Build a fresh snapshot of the root's children on a blocking worker
    pub async fn snapshot(&self) -> Vec<DirectoryNode> {
        let root = self.root.clone();
        let rules = self.rules.clone();
        match tokio::task::spawn_blocking(move || {
            snapshot_children(root.canonical(), root.display(), &rules)
        })
        .await
        {
            Ok(children) => children,
            Err(e) => {
                tracing::error!("[WATCHER] Snapshot task failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Cancel the subscription.
    ///
    /// Safe to call more than once. Once it returns, `next_event` yields
    /// `None` and nothing buffered is handed out.
    pub fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            tracing::info!("[WATCHER] Stopped watching {}", self.root.display().display());
        }
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        self.batch.clear();
        self.batch_deadline = None;
        self.pending.clear();
    }
}

impl Drop for WatchEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
