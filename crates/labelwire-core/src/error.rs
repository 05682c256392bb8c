// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Unified error types for Labelwire.
//
// Transport-level failures are translated into these classified kinds at
// the connection/channel boundary and never leaked as raw platform errors.

use thiserror::Error;

/// Top-level error type for all Labelwire operations.
#[derive(Debug, Error)]
pub enum LabelwireError {
    /// A session to the device could not be established.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Operation attempted on a closed or broken connection.
    #[error("connection is closed or broken")]
    Disconnected,

    /// No complete response arrived within the caller-supplied bound.
    /// The connection stays open — the caller decides whether to retry.
    #[error("timed out waiting for printer response")]
    Timeout,

    /// Read/write failure not classified as a timeout.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed key, value, or address — rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Scan could not start or failed mid-scan. Delivered through the
    /// discovery error callback, never thrown from a start call.
    #[error("printer discovery failed: {0}")]
    Discovery(String),
}

impl LabelwireError {
    /// Whether this error means the connection itself is unusable.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Io(_) | Self::ConnectFailed(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LabelwireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_not_connection_fatal() {
        assert!(!LabelwireError::Timeout.is_connection_fatal());
        assert!(LabelwireError::Disconnected.is_connection_fatal());
    }
}
