//! fleetgw-link - Control-plane session management
//!
//! This crate owns the single logical connection to the fleet-command
//! control plane: connect-with-retry, the authenticated subscribe
//! handshake, an outbound queue used while disconnected, and typed senders
//! for measurements, command-status updates, and log events.
//!
//! The wire is newline-delimited JSON over TCP or TLS; the transport is a
//! trait so tests (and future session protocols) can swap it out without
//! touching the reconnect state machine.

pub mod envelope;
pub mod error;
pub mod link;
pub mod transport;

pub use envelope::InboundMessage;
pub use error::LinkError;
pub use link::{CommandHandler, ControlPlaneLink, LinkConfig, LinkState};
pub use transport::{create_transport, LinkStream, LinkTransport};
