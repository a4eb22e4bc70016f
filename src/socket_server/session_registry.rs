//! Session registry
//!
//! Tracks live client sessions and coordinates daemon shutdown. The registry
//! holds no per-session resources: every session owns its watcher and dev
//! server itself, so events can never leak between clients.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{broadcast, Notify};

use crate::config::DaemonConfig;

/// Unique identifier for a session
pub type SessionId = String;

/// Bookkeeping for one connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
}

/// Registry of live sessions
pub struct SessionRegistry {
    config: Arc<DaemonConfig>,
    sessions: RwLock<HashMap<SessionId, SessionInfo>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Woken whenever a session unregisters
    drained: Notify,
}

impl SessionRegistry {
    pub fn new(config: DaemonConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config: Arc::new(config),
            sessions: RwLock::new(HashMap::new()),
            shutdown_tx,
            drained: Notify::new(),
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Shared handle to the configuration, for sessions to keep
    pub fn shared_config(&self) -> Arc<DaemonConfig> {
        Arc::clone(&self.config)
    }

    /// Record a new session and hand out its id
    pub fn register(&self, peer: Option<SocketAddr>) -> SessionInfo {
        let info = SessionInfo {
            id: new_session_id(),
            peer,
            connected_at: Utc::now(),
        };
        let count = {
            let mut sessions = self.sessions.write();
            sessions.insert(info.id.clone(), info.clone());
            sessions.len()
        };
        tracing::info!("Session {} registered ({} active)", info.id, count);
        info
    }

    /// Forget a session. Returns whether it was registered.
    pub fn unregister(&self, id: &str) -> bool {
        let (removed, count) = {
            let mut sessions = self.sessions.write();
            let removed = sessions.remove(id);
            (removed, sessions.len())
        };
        self.drained.notify_waiters();

        match removed {
            Some(info) => {
                let lifetime = Utc::now() - info.connected_at;
                tracing::info!(
                    "Session {} unregistered after {}s ({} active)",
                    id,
                    lifetime.num_seconds(),
                    count
                );
                true
            }
            None => false,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Snapshot of live sessions, oldest first
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Receiver that fires when the daemon shuts down
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Ask every session to tear down and wait until they are gone.
    ///
    /// Returns `true` if all sessions finished within `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let active = self.session_count();
        tracing::info!("Shutting down {} session(s)", active);
        let _ = self.shutdown_tx.send(());

        let drained = async {
            loop {
                let notified = self.drained.notified();
                if self.session_count() == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(grace, drained).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    "{} session(s) still active after {:?}",
                    self.session_count(),
                    grace
                );
                false
            }
        }
    }
}

fn new_session_id() -> SessionId {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("cli_{}", &uuid[..8])
}
