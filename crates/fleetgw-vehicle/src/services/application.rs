//! Application-management service: raw passthrough to the app registry.

use fleetgw_core::{Command, CommandResult};

use crate::service::{validate_common, Service};

/// The vehicle's application-management endpoint.
///
/// Commands address it by subsystem; the recognized command set is the
/// common raw query/mutation passthrough, since app install and lifecycle
/// flows are driven by operator-authored mutations.
pub struct ApplicationService {
    port: u16,
}

impl ApplicationService {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Service for ApplicationService {
    fn name(&self) -> &str {
        "application-service"
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn matches(&self, command: &Command) -> bool {
        command.subsystem() == self.name()
    }

    fn validate_command(&self, command: &Command) -> CommandResult {
        validate_common(command)
    }
}
