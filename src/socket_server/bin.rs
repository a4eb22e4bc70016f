//! Workspace Sync Daemon Binary
//!
//! A WebSocket server that mirrors a workspace directory to browser clients
//! and runs the workspace's dev server for each of them.
//!
//! # Usage
//!
//! ```bash
//! workspace-sync-daemon
//! workspace-sync-daemon --port 3002 --root ./code-server/workspace
//! workspace-sync-daemon --command pnpm --arg dev --flush-interval 2
//! workspace-sync-daemon --config ./workspace-sync.toml --no-process
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use workspace_sync::config::DaemonConfig;
use workspace_sync::socket_server::{serve, SessionRegistry};

/// How long sessions get to stop their dev servers on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Workspace Sync Daemon
#[derive(Parser, Debug)]
#[command(name = "workspace-sync-daemon")]
#[command(about = "Mirror a workspace to WebSocket clients and supervise its dev server")]
struct Args {
    /// Configuration file (default: ./workspace-sync.toml when present)
    #[arg(short, long, env = "WORKSPACE_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "WORKSPACE_SYNC_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "WORKSPACE_SYNC_HOST")]
    host: Option<String>,

    /// Workspace directory to watch and serve
    #[arg(short, long, env = "WORKSPACE_SYNC_ROOT")]
    root: Option<PathBuf>,

    /// Dev server command
    #[arg(long)]
    command: Option<String>,

    /// Dev server argument (repeatable, replaces the configured arguments)
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Seconds between stderr flushes
    #[arg(long)]
    flush_interval: Option<u64>,

    /// Watcher gathering window in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Don't spawn a dev server for sessions
    #[arg(long)]
    no_process: bool,

    /// Send process notices as JSON messages instead of plain text
    #[arg(long)]
    structured_notices: bool,
}

impl Args {
    /// Layer flags over the loaded configuration
    fn apply(self, mut config: DaemonConfig) -> DaemonConfig {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(root) = self.root {
            config.workspace_root = root;
        }
        if let Some(command) = self.command {
            config.process.command = command;
        }
        if !self.args.is_empty() {
            config.process.args = self.args;
        }
        if let Some(secs) = self.flush_interval {
            config.process.flush_interval_secs = secs;
        }
        if let Some(ms) = self.debounce_ms {
            config.watcher.debounce_ms = ms;
        }
        if self.no_process {
            config.process.enabled = false;
        }
        if self.structured_notices {
            config.protocol.structured_notices = true;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("workspace_sync=info".parse()?)
                .add_directive("workspace_sync_daemon=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config =
        DaemonConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let config = args.apply(config);
    config.validate().context("Invalid configuration")?;

    if !config.workspace_root.is_dir() {
        tracing::warn!(
            "Workspace root {} does not exist yet; sessions will get an empty tree",
            config.workspace_root.display()
        );
    }

    // Start the TCP listener
    let listener = bind(&config).await?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    tracing::info!("Workspace sync daemon listening on ws://{}", addr);

    let registry = Arc::new(SessionRegistry::new(config));
    tracing::info!("Serving {}", registry.config().workspace_root.display());

    tokio::select! {
        _ = serve(listener, Arc::clone(&registry)) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Received shutdown signal");
        }
    }

    if !registry.shutdown(SHUTDOWN_GRACE).await {
        tracing::warn!("Exiting with sessions still active");
    }
    tracing::info!("Workspace sync daemon stopped");

    Ok(())
}

/// Bind the configured host, which may be a hostname or an IPv6 literal
async fn bind(config: &DaemonConfig) -> anyhow::Result<TcpListener> {
    TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))
}
