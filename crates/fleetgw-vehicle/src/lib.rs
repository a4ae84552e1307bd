//! fleetgw-vehicle - Vehicle-link framing, onboard services, and routing
//!
//! This crate owns the vehicle-facing half of the gateway: the binary frame
//! codec for the datagram link, the [`Service`] abstraction for onboard
//! capability endpoints, and the [`Router`] that matches each inbound
//! command to exactly one capable service and forwards telemetry and acks
//! back to the control plane.

pub mod error;
pub mod packet;
pub mod router;
pub mod service;
pub mod services;
pub mod transport;

pub use error::VehicleError;
pub use packet::{Frame, FrameKind};
pub use router::{Router, Uplink};
pub use service::{Service, ServiceResponse};
pub use transport::{MockVehicleTransport, UdpTransport, VehicleTransport};
