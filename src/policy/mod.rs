//! Compliance rule loading, evaluation, and hot synchronization.
//!
//! Provides rule-document parsing and validation, the gatekeeper and
//! log/PHI evaluators, snapshot publishing with fail-closed rollback, and
//! change detection via file system watching.

pub mod document;
pub mod gatekeeper;
pub mod loader;
pub mod log_filter;
pub mod status;
pub mod sync;
pub mod watcher;
