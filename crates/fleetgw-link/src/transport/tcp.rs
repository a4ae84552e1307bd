//! Plaintext TCP session stream

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::debug;

use super::{LinkStream, LinkTransport};
use crate::error::LinkError;

/// TCP transport for trusted private endpoints.
pub struct TcpLinkTransport {
    addr: String,
}

impl TcpLinkTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
        }
    }
}

#[async_trait]
impl LinkTransport for TcpLinkTransport {
    async fn connect(&self) -> Result<LinkStream, LinkError> {
        debug!(addr = %self.addr, "Opening TCP session");
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        let (read, write) = stream.into_split();
        Ok(LinkStream {
            reader: Box::new(BufReader::new(read)),
            writer: Box::new(write),
        })
    }
}
