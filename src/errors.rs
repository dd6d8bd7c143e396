//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A rule definition could not be read, parsed, or validated.
    Load {
        /// Source identifier (`base:<stem>` / `dynamic:<stem>`).
        source: String,
        /// Human-readable rejection reason.
        reason: String,
    },
    /// Synchronization failure outside of a single definition.
    Sync(String),
    /// Loader exceeded its time budget.
    Timeout(String),
    /// A forced reload was cancelled before publish.
    Cancelled(String),
    /// IPC communication failure.
    Ipc(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Build a [`AppError::Load`] for the given source id.
    pub fn load(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            source: source.into(),
            reason: reason.into(),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Load { source, reason } => write!(f, "load: {source}: {reason}"),
            Self::Sync(msg) => write!(f, "sync: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
