//! Transport layer for the control-plane session
//!
//! The session speaks newline-delimited JSON over a persistent byte stream.
//! This module provides the stream implementations:
//! - TCP for plaintext endpoints
//! - TLS (rustls) for `tls://` endpoints, with configurable verification
//! - Mock streams for testing
//!
//! # Example
//!
//! ```ignore
//! use fleetgw_link::transport::{create_transport, TlsOptions};
//!
//! let transport = create_transport("tls://mission.example.com:443", &TlsOptions::default())?;
//! let stream = transport.connect().await?;
//! ```

mod tcp;
mod tls;

pub mod mock;

pub use tcp::TcpLinkTransport;
pub use tls::{TlsLinkTransport, TlsOptions};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite};
use url::Url;

use crate::error::LinkError;

/// One established session stream, split into halves: the receive loop owns
/// the reader, the link's send path owns the writer.
pub struct LinkStream {
    /// Buffered line reader over the receive half
    pub reader: Box<dyn AsyncBufRead + Send + Unpin>,
    /// Write half; one JSON payload per line
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
}

/// Stream-agnostic interface for the control-plane session.
///
/// A transport is connected once per connection epoch; the link tears the
/// stream down and calls `connect` again after any network failure.
#[async_trait]
pub trait LinkTransport: Send + Sync {
    /// Establish a fresh session stream.
    async fn connect(&self) -> Result<LinkStream, LinkError>;
}

/// Create a transport for the configured endpoint.
///
/// The URL scheme selects the stream type: `tcp://` for plaintext,
/// `tls://` for an encrypted session (verification per `tls_options`).
pub fn create_transport(
    endpoint: &str,
    tls_options: &TlsOptions,
) -> Result<Arc<dyn LinkTransport>, LinkError> {
    let url = Url::parse(endpoint)
        .map_err(|e| LinkError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| LinkError::InvalidEndpoint(format!("{endpoint}: missing host")))?;
    let port = url
        .port()
        .ok_or_else(|| LinkError::InvalidEndpoint(format!("{endpoint}: missing port")))?;

    match url.scheme() {
        "tcp" => Ok(Arc::new(TcpLinkTransport::new(host, port))),
        "tls" => Ok(Arc::new(TlsLinkTransport::new(host, port, tls_options)?)),
        other => Err(LinkError::InvalidEndpoint(format!(
            "{endpoint}: unsupported scheme '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_scheme() {
        let result = create_transport("http://example.com:80", &TlsOptions::default());
        assert!(matches!(result, Err(LinkError::InvalidEndpoint(_))));
    }

    #[test]
    fn rejects_missing_port() {
        let result = create_transport("tcp://example.com", &TlsOptions::default());
        assert!(matches!(result, Err(LinkError::InvalidEndpoint(_))));
    }

    #[test]
    fn accepts_tcp_endpoint() {
        assert!(create_transport("tcp://10.0.0.1:9800", &TlsOptions::default()).is_ok());
    }
}
