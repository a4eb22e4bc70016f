//! Dev server process supervision
//!
//! Spawns the workspace's dev server (by default `npm run dev`) and turns its
//! stderr into batched error events:
//!
//! - every stderr line is trimmed, stripped of ANSI escapes and appended to
//!   an [`ErrorBuffer`]
//! - every flush interval (default 5s) the buffer is drained; a non-empty
//!   drain becomes one [`ProcessEvent::ErrorBatch`], an empty one is silent
//! - when the process exits by itself the last lines are flushed and
//!   [`ProcessEvent::Exited`] is emitted
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted ──start()──> Running ──(exit | stop() | spawn failure)──> Stopped
//! ```
//!
//! A supervisor is never restarted; a new instance is needed.
//!
//! # Termination
//!
//! On Unix the child leads its own process group, so `stop()` reaches the
//! whole tree (`npm` and the server it forks): SIGTERM to the group, up to
//! [`TERM_GRACE`] for the leader to exit, then SIGKILL to whatever is left.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::error::{Result, SyncError};

use super::events::ProcessEvent;

/// How long `stop()` waits for the supervision task to reap the child
const STOP_GRACE: Duration = Duration::from_secs(5);

/// How long the process group gets to exit after SIGTERM
pub const TERM_GRACE: Duration = Duration::from_secs(3);

/// How long trailing stderr is read after the process exits
const DRAIN_GRACE: Duration = Duration::from_millis(250);

const EVENT_CHANNEL_CAPACITY: usize = 64;

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\x1b\x{9b}][\[\]()#;?]*(?:(?:(?:(?:;[-a-zA-Z\d/#&.:=?%@~_]+)*|[a-zA-Z\d]+(?:;[-a-zA-Z\d/#&.:=?%@~_]*)*)?\x07)|(?:(?:\d{1,4}(?:;\d{0,4})*)?[\dA-PR-TZcf-ntqry=><~]))",
    )
    .expect("ANSI escape pattern is valid")
});

/// Remove ANSI escape sequences (colors, cursor movement, titles)
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// What to run and how often to flush its stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub flush_interval: Duration,
}

impl ProcessSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: cwd.into(),
            flush_interval: Duration::from_secs(5),
        }
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Stderr lines accumulated between flushes.
///
/// Appends and flushes take the same lock, so a line lands in exactly one
/// batch.
#[derive(Debug, Clone, Default)]
pub struct ErrorBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl ErrorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        self.lines.lock().push(line);
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Drain the buffer, joining lines with `\n`. `None` if it was empty.
    pub fn flush(&self) -> Option<String> {
        let lines = std::mem::take(&mut *self.lines.lock());
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Running,
    Stopped,
}

/// Owns one dev server process for one session
pub struct ProcessSupervisor {
    state: Arc<Mutex<SupervisorState>>,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    /// Closed by the supervision task when it finishes
    events_rx: Option<mpsc::Receiver<ProcessEvent>>,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SupervisorState::NotStarted)),
            pid: None,
            kill_tx: None,
            task: None,
            events_rx: None,
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SupervisorState::Running
    }

    /// OS process id of the child, once spawned
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Spawn the process and start aggregating its stderr.
    ///
    /// Must be called from within a Tokio runtime. On spawn failure the
    /// supervisor moves straight to `Stopped`.
    pub fn start(&mut self, spec: &ProcessSpec) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != SupervisorState::NotStarted {
                return Err(SyncError::AlreadyStarted);
            }
            *state = SupervisorState::Stopped;
        }

        tracing::info!("Starting `{}` in {}", spec.command_line(), spec.cwd.display());

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|source| {
                tracing::error!("Failed to start process `{}`: {}", spec.command, source);
                SyncError::ProcessSpawn {
                    command: spec.command.clone(),
                    source,
                }
            })?;

        self.pid = child.id();
        *self.state.lock() = SupervisorState::Running;

        let buffer = ErrorBuffer::new();
        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_stderr(stderr, buffer.clone())));
        let stdout_drain = child.stdout.take().map(|stdout| tokio::spawn(drain_stdout(stdout)));

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (kill_tx, kill_rx) = oneshot::channel();
        self.events_rx = Some(events_rx);
        self.kill_tx = Some(kill_tx);
        self.task = Some(tokio::spawn(supervise(
            child,
            Readers {
                stderr: stderr_reader,
                stdout: stdout_drain,
            },
            buffer,
            spec.flush_interval,
            events_tx,
            kill_rx,
            Arc::clone(&self.state),
        )));

        Ok(())
    }

    /// Wait for the next event. Returns `None` when nothing more can arrive.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        match self.events_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Terminate the process tree if it is still running and release it.
    ///
    /// Idempotent, and a no-op once the process has exited. Nothing is
    /// emitted for a stop-initiated exit.
    pub async fn stop(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        if let Some(task) = self.task.take() {
            match timeout(STOP_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Supervisor task failed: {}", e),
                Err(_) => tracing::warn!("Process {:?} did not stop within {:?}", self.pid, STOP_GRACE),
            }
        }
        if let Some(mut rx) = self.events_rx.take() {
            rx.close();
            while rx.try_recv().is_ok() {}
        }
        *self.state.lock() = SupervisorState::Stopped;
    }
}

struct Readers {
    stderr: Option<JoinHandle<()>>,
    stdout: Option<JoinHandle<()>>,
}

enum Outcome {
    Exited(Option<i32>),
    Killed,
}

async fn supervise(
    mut child: Child,
    readers: Readers,
    buffer: ErrorBuffer,
    flush_interval: Duration,
    events: mpsc::Sender<ProcessEvent>,
    mut kill_rx: oneshot::Receiver<()>,
    state: Arc<Mutex<SupervisorState>>,
) {
    let mut ticker = interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    let outcome = loop {
        tokio::select! {
            status = child.wait() => {
                break match status {
                    Ok(status) => Outcome::Exited(status.code()),
                    Err(e) => {
                        tracing::error!("Failed to wait for process: {}", e);
                        Outcome::Exited(None)
                    }
                };
            }
            // Also fires if the supervisor was dropped without stop()
            _ = &mut kill_rx => {
                terminate(&mut child).await;
                break Outcome::Killed;
            }
            _ = ticker.tick() => {
                if let Some(batch) = buffer.flush() {
                    tracing::debug!("Errors captured in the last time window:\n{}", batch);
                    let _ = events.send(ProcessEvent::ErrorBatch(batch)).await;
                }
            }
        }
    };
    drop(ticker);

    match outcome {
        Outcome::Exited(code) => {
            // Pick up lines still in the pipe, but don't wait on grandchildren
            // that inherited stderr.
            if let Some(mut reader) = readers.stderr {
                if timeout(DRAIN_GRACE, &mut reader).await.is_err() {
                    reader.abort();
                }
            }
            if let Some(stdout) = readers.stdout {
                stdout.abort();
            }

            *state.lock() = SupervisorState::Stopped;
            tracing::info!("Process exited with code {:?}", code);

            if let Some(batch) = buffer.flush() {
                let _ = events.send(ProcessEvent::ErrorBatch(batch)).await;
            }
            let _ = events.send(ProcessEvent::Exited(code)).await;
        }
        Outcome::Killed => {
            for reader in [readers.stderr, readers.stdout].into_iter().flatten() {
                reader.abort();
            }
            *state.lock() = SupervisorState::Stopped;
            tracing::info!("Process stopped");
        }
    }
}

/// SIGTERM the child's process group, then SIGKILL it after [`TERM_GRACE`]
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pgid) = child.id() {
            signal_group(pgid, libc::SIGTERM);
            let exited = timeout(TERM_GRACE, child.wait()).await.is_ok();
            if !exited {
                tracing::warn!("Process group {} ignored SIGTERM for {:?}", pgid, TERM_GRACE);
            }
            // Members that outlived the leader go too
            signal_group(pgid, libc::SIGKILL);
            if exited {
                return;
            }
        }
    }

    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill process: {}", e);
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group is already empty
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!("Failed to signal process group {}: {}", pgid, err);
        }
    }
}

async fn read_stderr<R>(stderr: R, buffer: ErrorBuffer)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                tracing::info!("-----> {}", line);
                buffer.push(strip_ansi(line));
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("stderr read failed: {}", e);
                break;
            }
        }
    }
}

async fn drain_stdout<R>(stdout: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::trace!("stdout: {}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
