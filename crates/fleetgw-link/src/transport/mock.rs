//! Mock session transport for testing
//!
//! Each scripted session is one end of an in-memory duplex pipe; the test
//! holds the far end as a [`MockSession`] and plays the control plane.
//! Scripted refusals let tests drive the reconnect loop through failures.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

use super::{LinkStream, LinkTransport};
use crate::error::LinkError;

enum Outcome {
    Session(DuplexStream),
    Refusal(LinkError),
}

/// Mock transport with a scripted sequence of connect outcomes.
#[derive(Default)]
pub struct MockLinkTransport {
    script: Mutex<VecDeque<Outcome>>,
}

impl MockLinkTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful connect; returns the control-plane end.
    pub fn script_session(&self) -> MockSession {
        let (near, far) = tokio::io::duplex(64 * 1024);
        self.script.lock().push_back(Outcome::Session(near));
        let (read, write) = tokio::io::split(far);
        MockSession {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    /// Script a failed connect attempt.
    pub fn script_refusal(&self, error: LinkError) {
        self.script.lock().push_back(Outcome::Refusal(error));
    }

    /// Number of scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl LinkTransport for MockLinkTransport {
    async fn connect(&self) -> Result<LinkStream, LinkError> {
        match self.script.lock().pop_front() {
            Some(Outcome::Session(stream)) => {
                let (read, write) = tokio::io::split(stream);
                Ok(LinkStream {
                    reader: Box::new(BufReader::new(read)),
                    writer: Box::new(write),
                })
            }
            Some(Outcome::Refusal(error)) => Err(error),
            None => Err(LinkError::ConnectionFailed("no scripted session".into())),
        }
    }
}

/// The control-plane end of one scripted session.
pub struct MockSession {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl MockSession {
    /// Read one line the gateway sent; `None` on EOF.
    pub async fn recv_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end().to_string()),
        }
    }

    /// Send one line to the gateway.
    pub async fn send_line(&mut self, line: &str) {
        let _ = self.writer.write_all(line.as_bytes()).await;
        let _ = self.writer.write_all(b"\n").await;
        let _ = self.writer.flush().await;
    }

    /// Drop the session; the gateway observes EOF.
    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}
