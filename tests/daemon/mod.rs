//! Multi-session integration tests
//!
//! Several clients against one daemon: registry bookkeeping, isolation
//! between sessions and graceful shutdown.
