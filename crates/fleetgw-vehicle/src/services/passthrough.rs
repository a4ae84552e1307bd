//! Catch-all passthrough service.

use fleetgw_core::{Command, CommandResult};

use crate::service::{validate_common, Service};

/// Matches every command; must be registered last so specific services get
/// first refusal. Supports only the raw query/mutation passthrough, letting
/// operators reach onboard services the gateway has no typed menu for.
pub struct PassthroughService {
    port: u16,
}

impl PassthroughService {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Service for PassthroughService {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn matches(&self, _command: &Command) -> bool {
        true
    }

    fn validate_command(&self, command: &Command) -> CommandResult {
        validate_common(command)
    }
}
