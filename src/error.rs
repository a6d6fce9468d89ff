//! Error types for ringwire.
//!
//! Per-frame faults (timeouts, garbled frames, orphans, rejections) are not
//! errors: the node engines recover from them inside the protocol. Only
//! transport failures, connection setup, configuration and collaborator I/O
//! surface here.

use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for all ring operations.
#[derive(Debug, Error)]
pub enum RingError {
    /// I/O error during socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config and report only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (frame cannot be built, wrong field values, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An outbound data line could not be turned into a frame.
    #[error("Malformed data line {line:?}: {reason}")]
    MalformedLine { line: String, reason: String },

    /// The successor never accepted our connection.
    #[error("Could not connect to {addr} after {attempts} attempts")]
    ConnectionFailed { addr: SocketAddr, attempts: u32 },

    /// Every port in the configured range was taken.
    #[error("No free port in range {start}..{end}")]
    NoFreePort { start: u16, end: u16 },

    /// Predecessor closed the connection unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A node task ended with an error or panicked.
    #[error("Node {address} failed: {reason}")]
    NodeFailed { address: u8, reason: String },
}

impl RingError {
    /// Shorthand for a malformed outbound line.
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using RingError.
pub type Result<T> = std::result::Result<T, RingError>;
