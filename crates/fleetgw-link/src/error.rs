//! Control-plane link errors

use thiserror::Error;

/// Errors raised by the control-plane session.
///
/// The reconnect loop distinguishes network-class failures (retried forever
/// with a fixed delay) from everything else (fatal, propagated so the
/// process terminates rather than silently retrying an unknown failure
/// mode).
#[derive(Debug, Error)]
pub enum LinkError {
    /// Could not establish the connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// Socket-level failure on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured endpoint could not be parsed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// TLS configuration or handshake setup failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Malformed message from the control plane
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl LinkError {
    /// Whether the reconnect loop should retry after this error.
    ///
    /// Only network-class failures qualify; configuration and TLS-setup
    /// errors will not fix themselves by retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LinkError::ConnectionFailed(_) | LinkError::ConnectionClosed | LinkError::Io(_)
        )
    }
}
