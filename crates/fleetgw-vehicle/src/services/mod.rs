//! Concrete onboard services.
//!
//! Registry order is the routing priority: services with more specific
//! `matches` predicates go first, and [`PassthroughService`] (which matches
//! everything) must be registered last.

mod application;
mod passthrough;
mod payload;
mod telemetry;

pub use application::ApplicationService;
pub use passthrough::PassthroughService;
pub use payload::PayloadService;
pub use telemetry::TelemetryService;
