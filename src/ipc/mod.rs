//! Local IPC layer for `compliance-gate-ctl` interaction.
//!
//! Provides a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! server that accepts JSON-line requests and answers with engine results.

pub mod server;
