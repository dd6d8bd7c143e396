#![forbid(unsafe_code)]

//! Hot-reloadable compliance rule engine.
//!
//! Evaluates deployment artifacts and log/response payloads against a
//! versioned rule snapshot that is rebuilt and atomically republished when
//! rule documents change.

pub mod config;
pub mod engine;
pub mod errors;
pub mod ipc;
pub mod models;
pub mod policy;

pub use config::GlobalConfig;
pub use engine::ComplianceEngine;
pub use errors::{AppError, Result};
