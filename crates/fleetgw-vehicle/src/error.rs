//! Vehicle-link errors

use thiserror::Error;

/// Errors on the vehicle-facing side of the gateway.
#[derive(Debug, Error)]
pub enum VehicleError {
    /// Malformed or oversized binary frame
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Datagram transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
