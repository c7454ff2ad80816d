//! Error types for tischat
//!
//! Provides the unified error type used by construction, configuration and
//! logging paths, plus the connection failure taxonomy reported to the UI.

use std::path::PathBuf;

/// Errors from setting up the client: config, log files, runtime startup.
///
/// Connection failures during a session are reported as [`ConnectionError`]
/// instead, and only wrap into this type when a caller wants one error type.
#[derive(Debug, thiserror::Error)]
pub enum TischatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Opening or appending to a file, e.g. the log
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TischatError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The connection failure inside, if this wraps one
    pub fn as_connection(&self) -> Option<&ConnectionError> {
        match self {
            Self::Connection(err) => Some(err),
            _ => None,
        }
    }
}

/// Why a connection ended without the user asking for it.
///
/// These never surface from `send`; they drive the connection state to
/// logged-out and reach the UI through its `connection_lost` callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection refused or host unreachable: {0}")]
    RefusedOrUnreachable(String),

    #[error("Connection lost: {0}")]
    LostMidStream(String),

    #[error("Connection timeout after {seconds}s")]
    Timeout { seconds: u64 },
}

impl ConnectionError {
    /// Map a failed connect attempt onto the taxonomy
    pub fn from_connect(err: &std::io::Error) -> Self {
        Self::RefusedOrUnreachable(err.to_string())
    }

    /// Map a read or write failure on an established socket
    pub fn from_stream(err: &std::io::Error) -> Self {
        Self::LostMidStream(err.to_string())
    }

    /// The server closed its end without a close handshake
    pub fn closed_by_peer() -> Self {
        Self::LostMidStream("server closed the connection".into())
    }

    /// Check if reconnecting could reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::LostMidStream(_))
    }
}

/// Result type alias using TischatError
pub type Result<T> = std::result::Result<T, TischatError>;
