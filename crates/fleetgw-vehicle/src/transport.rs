//! Datagram transport to the vehicle
//!
//! One transport per registered service: a connected UDP socket for the
//! real link, and a mock with scriptable incoming traffic for tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::VehicleError;

/// Pause between retries after a receive error.
const RECV_RETRY_DELAY: Duration = Duration::from_millis(50);

/// One service's channel to the vehicle.
#[async_trait]
pub trait VehicleTransport: Send + Sync {
    /// Transmit one encoded frame.
    async fn send(&self, frame: &[u8]) -> Result<(), VehicleError>;

    /// Wait for the next inbound datagram; `None` means the channel is
    /// permanently closed and the receive loop should stop.
    async fn recv(&self) -> Option<Vec<u8>>;
}

/// Connected UDP socket to one onboard service.
pub struct UdpTransport {
    socket: UdpSocket,
    max_datagram: usize,
}

impl UdpTransport {
    /// Bind locally and connect to the service endpoint. Idempotence is the
    /// caller's concern: call once per process lifetime per service.
    pub async fn connect(bind_addr: &str, remote_addr: &str) -> Result<Self, VehicleError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(remote_addr).await?;
        debug!(%bind_addr, %remote_addr, "Vehicle datagram channel ready");
        Ok(Self {
            socket,
            max_datagram: u16::MAX as usize,
        })
    }
}

#[async_trait]
impl VehicleTransport for UdpTransport {
    async fn send(&self, frame: &[u8]) -> Result<(), VehicleError> {
        self.socket
            .send(frame)
            .await
            .map_err(|e| VehicleError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; self.max_datagram];
        loop {
            match self.socket.recv(&mut buf).await {
                Ok(n) => {
                    buf.truncate(n);
                    return Some(buf);
                }
                // Usually transient (e.g. ICMP port unreachable on a
                // connected socket); keep listening, but back off so a
                // persistent failure cannot spin the loop hot.
                Err(e) => {
                    warn!(error = %e, "Vehicle datagram receive error");
                    tokio::time::sleep(RECV_RETRY_DELAY).await;
                }
            }
        }
    }
}

/// Mock vehicle transport for tests: records outbound frames, replays
/// injected inbound datagrams.
pub struct MockVehicleTransport {
    sent: parking_lot::Mutex<VecDeque<Vec<u8>>>,
    incoming_tx: mpsc::UnboundedSender<Vec<u8>>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MockVehicleTransport {
    pub fn new() -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            sent: parking_lot::Mutex::new(VecDeque::new()),
            incoming_tx,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
        }
    }

    /// Frames transmitted so far, oldest first.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().iter().cloned().collect()
    }

    /// Inject an inbound datagram (simulates the vehicle replying).
    pub fn inject_incoming(&self, data: Vec<u8>) {
        let _ = self.incoming_tx.send(data);
    }
}

impl Default for MockVehicleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VehicleTransport for MockVehicleTransport {
    async fn send(&self, frame: &[u8]) -> Result<(), VehicleError> {
        self.sent.lock().push_back(frame.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        self.incoming_rx.lock().await.recv().await
    }
}
