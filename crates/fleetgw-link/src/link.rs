//! The control-plane session state machine.
//!
//! `Disconnected → Connecting → Subscribed → Disconnected (on error)`.
//! Network-class failures are retried forever with a fixed delay; any other
//! error propagates out of [`ControlPlaneLink::connect_with_retries`] and
//! terminates the process. Payloads submitted while disconnected queue in a
//! bounded FIFO and are flushed, oldest first, immediately after the next
//! successful subscribe.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetgw_core::{Command, CommandResult, LogEvent, Measurement};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::envelope::{self, CommandStatus, CommandUpdate, InboundMessage};
use crate::error::LinkError;
use crate::transport::{LinkStream, LinkTransport, TlsOptions};

/// Control-plane session configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// `tcp://host:port` or `tls://host:port`
    pub endpoint: String,
    /// Session token presented in the subscribe handshake
    pub token: String,
    /// Channel name for the subscribe handshake
    pub channel: String,
    /// Verify the TLS certificate chain
    pub verify_tls: bool,
    /// Extra CA bundle (PEM) for private control-plane deployments
    pub ca_bundle: Option<PathBuf>,
    /// Fixed delay between reconnect attempts
    pub retry_delay: Duration,
    /// Outbound queue bound; overflow drops the oldest payload
    pub queue_limit: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "tcp://127.0.0.1:9800".to_string(),
            token: String::new(),
            channel: "GatewayChannel".to_string(),
            verify_tls: true,
            ca_bundle: None,
            retry_delay: Duration::from_secs(5),
            queue_limit: 1024,
        }
    }
}

impl LinkConfig {
    /// TLS options derived from this config.
    pub fn tls_options(&self) -> TlsOptions {
        TlsOptions {
            verify: self.verify_tls,
            ca_bundle: self.ca_bundle.clone(),
        }
    }
}

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Subscribed,
}

/// Consumer of inbound commands; implemented by the vehicle-side router.
///
/// The link never learns what a command means — it parses the envelope,
/// hands the command over, and reports the outcome upstream.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle_command(&self, command: Command) -> CommandResult;
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// The single logical connection to the control plane.
pub struct ControlPlaneLink {
    config: LinkConfig,
    transport: Arc<dyn LinkTransport>,
    writer: tokio::sync::Mutex<Option<Writer>>,
    queue: parking_lot::Mutex<VecDeque<String>>,
    state: parking_lot::Mutex<LinkState>,
}

impl ControlPlaneLink {
    pub fn new(config: LinkConfig, transport: Arc<dyn LinkTransport>) -> Self {
        Self {
            config,
            transport,
            writer: tokio::sync::Mutex::new(None),
            queue: parking_lot::Mutex::new(VecDeque::new()),
            state: parking_lot::Mutex::new(LinkState::Disconnected),
        }
    }

    /// Current session state.
    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    /// Payloads waiting for the next connection epoch.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run the session forever.
    ///
    /// Recoverable network failures log a warning and retry after the fixed
    /// delay; the loop never gives up on them. Any other error class is
    /// fatal and is returned to the caller to terminate the process.
    pub async fn connect_with_retries(
        &self,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), LinkError> {
        loop {
            let outcome = self.connect(handler.as_ref()).await;
            match outcome {
                Err(e) if e.is_recoverable() => {
                    warn!(
                        error = %e,
                        delay_secs = self.config.retry_delay.as_secs_f64(),
                        "Control-plane connection error, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    error!(error = %e, "Unhandled error in control-plane session");
                    return Err(e);
                }
                // A clean return is a closed session; treat like any drop.
                Ok(()) => {
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// One connection epoch: connect, subscribe, flush the queue, then
    /// receive until the stream closes. The session is torn down before
    /// this returns, whatever the outcome.
    pub async fn connect(&self, handler: &dyn CommandHandler) -> Result<(), LinkError> {
        let outcome = self.run_session(handler).await;
        self.teardown().await;
        outcome
    }

    async fn run_session(&self, handler: &dyn CommandHandler) -> Result<(), LinkError> {
        *self.state.lock() = LinkState::Connecting;
        info!(endpoint = %self.config.endpoint, "Connecting to control plane");

        let LinkStream { mut reader, mut writer } = self.transport.connect().await?;

        let subscribe = envelope::subscribe_frame(&self.config.channel, &self.config.token);
        write_line(&mut writer, &subscribe).await?;

        // Publish the writer and flush the previous epoch's backlog in one
        // critical section: a concurrent `send` blocks on the writer lock
        // until the backlog is out, so it cannot preempt queued payloads.
        {
            let mut slot = self.writer.lock().await;
            *slot = Some(writer);
            self.drain_queue(&mut slot).await;
            if slot.is_none() {
                return Err(LinkError::ConnectionClosed);
            }
        }
        *self.state.lock() = LinkState::Subscribed;
        info!("Connected to control plane");

        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(LinkError::ConnectionClosed);
            }
            let raw = line.trim();
            if !raw.is_empty() {
                self.handle_message(raw, handler).await;
            }
        }
    }

    /// Decode and act on one inbound message. Malformed or unknown shapes
    /// are logged and dropped; they never take the session down.
    pub async fn handle_message(&self, raw: &str, handler: &dyn CommandHandler) {
        match envelope::parse_inbound(raw) {
            Err(e) => warn!(error = %e, "Dropping malformed control-plane message"),
            Ok(InboundMessage::Keepalive) => {}
            Ok(InboundMessage::Command(command)) => {
                debug!(
                    id = command.id,
                    command_type = %command.command_type,
                    "Command from control plane"
                );
                let id = command.id;
                let result = handler.handle_command(command).await;
                if result.sent {
                    self.send_command_transmitted(id, &result.payload).await;
                } else {
                    self.send_command_failed(id, &result.errors).await;
                }
            }
            Ok(InboundMessage::Script) => error!("Scripts are not supported"),
            Ok(InboundMessage::Error(detail)) => {
                error!(%detail, "Error from control plane");
            }
            Ok(InboundMessage::Unknown { message_type }) => {
                warn!(%message_type, "Unrecognized control-plane message type");
            }
        }
    }

    /// Submit a payload. Transmits immediately when subscribed; queues
    /// otherwise. Never fails the caller.
    pub async fn send(&self, payload: Value) {
        let line = envelope::wrap_message(&self.config.channel, &payload);
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => {
                if let Err(e) = write_line(w, &line).await {
                    warn!(error = %e, "Control-plane write failed, queueing payload");
                    *writer = None;
                    *self.state.lock() = LinkState::Disconnected;
                    drop(writer);
                    self.enqueue(line);
                }
            }
            None => {
                drop(writer);
                self.enqueue(line);
            }
        }
    }

    /// Flush queued payloads, strictly FIFO, before any new submission of
    /// this epoch. The caller holds the writer lock for the whole drain.
    /// Stops early (items retained, slot cleared) if the connection drops
    /// mid-drain.
    async fn drain_queue(&self, writer: &mut Option<Writer>) {
        loop {
            let next = self.queue.lock().pop_front();
            let Some(line) = next else { return };
            match writer.as_mut() {
                None => {
                    self.queue.lock().push_front(line);
                    return;
                }
                Some(w) => {
                    if let Err(e) = write_line(w, &line).await {
                        warn!(error = %e, "Connection dropped while draining outbound queue");
                        *writer = None;
                        *self.state.lock() = LinkState::Disconnected;
                        self.queue.lock().push_front(line);
                        return;
                    }
                }
            }
        }
    }

    fn enqueue(&self, line: String) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.config.queue_limit {
            queue.pop_front();
            warn!(
                limit = self.config.queue_limit,
                "Outbound queue full, dropping oldest payload"
            );
        }
        queue.push_back(line);
    }

    async fn teardown(&self) {
        *self.writer.lock().await = None;
        *self.state.lock() = LinkState::Disconnected;
    }

    // ---- typed senders ----------------------------------------------------

    /// Report normalized measurements.
    pub async fn send_metrics(&self, measurements: &[Measurement]) {
        self.send(envelope::measurements_payload(measurements)).await;
    }

    /// Report that a command's payload went out on the vehicle link.
    pub async fn send_command_transmitted(&self, id: i64, payload: &str) {
        self.send(envelope::command_status_payload(&CommandStatus {
            source: "adapter",
            id,
            payload: Some(payload),
            errors: None,
            code: None,
            output: None,
        }))
        .await;
    }

    /// Report that a command failed in the gateway (routing or validation).
    pub async fn send_command_failed(&self, id: i64, errors: &[String]) {
        self.send(envelope::command_status_payload(&CommandStatus {
            source: "adapter",
            id,
            payload: None,
            errors: Some(errors),
            code: None,
            output: None,
        }))
        .await;
    }

    /// Forward a vehicle-originated ack.
    pub async fn send_command_ack(
        &self,
        id: i64,
        return_code: i32,
        output: Option<&str>,
        errors: &[String],
    ) {
        self.send(envelope::command_status_payload(&CommandStatus {
            source: "remote",
            id,
            payload: None,
            errors: Some(errors),
            code: Some(return_code),
            output,
        }))
        .await;
    }

    /// Mark a command complete via the alternate lifecycle encoding.
    pub async fn send_command_completed(&self, id: i64, output: Option<String>) {
        self.send(envelope::command_update_payload(&CommandUpdate {
            id,
            state: "complete".to_string(),
            payload: None,
            output,
            errors: None,
            progress_1_current: None,
            progress_1_max: None,
            progress_2_current: None,
            progress_2_max: None,
        }))
        .await;
    }

    /// Forward log events to the control plane's event stream.
    pub async fn send_log_events(&self, events: &[LogEvent]) {
        self.send(envelope::log_messages_payload(events)).await;
    }
}

async fn write_line(writer: &mut Writer, line: &str) -> Result<(), LinkError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
