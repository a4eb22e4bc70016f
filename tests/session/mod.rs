//! Single-session integration tests
//!
//! Each test starts a daemon on an ephemeral port, connects one client and
//! checks what arrives on the socket.

pub mod file_tests;
pub mod process_tests;
pub mod tree_tests;
