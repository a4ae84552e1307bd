//! fleetgw-core - Core types for the fleet-command gateway
//!
//! This crate provides the data model shared by the control-plane link and
//! the vehicle-side router: commands arriving from the control plane, the
//! result of attempting to service them, and the measurement/log shapes sent
//! back upstream.

pub mod command;
pub mod telemetry;

pub use command::{Command, CommandField, CommandResult, FieldValue};
pub use telemetry::{LogEvent, LogLevel, Measurement, MetricValue, RawMetric};
