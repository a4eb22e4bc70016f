//! Per-session event sources
//!
//! Each connected client gets its own instance of both sources; nothing in
//! this module is shared between sessions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Connection Session                      │
//! │                                                              │
//! │  ┌──────────────────┐            ┌──────────────────────┐    │
//! │  │   WatchEngine    │            │  ProcessSupervisor   │    │
//! │  │  notify + known  │            │  child + ErrorBuffer │    │
//! │  │  entry set       │            │  + flush interval    │    │
//! │  └────────┬─────────┘            └──────────┬───────────┘    │
//! │           │ WatchEvent                      │ ProcessEvent   │
//! │           └──────────────┬──────────────────┘                │
//! │                          ▼                                   │
//! │                 select! dispatch loop ──► WebSocket          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `events` - Tagged unions yielded by the sources
//! - `watcher` - File system watching
//! - `supervisor` - Dev server supervision and stderr batching

pub mod events;
pub mod supervisor;
pub mod watcher;

pub use events::{ProcessEvent, WatchEvent};
pub use supervisor::{strip_ansi, ErrorBuffer, ProcessSpec, ProcessSupervisor, SupervisorState};
pub use watcher::WatchEngine;
