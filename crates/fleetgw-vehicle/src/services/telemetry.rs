//! Telemetry service: typed telemetry queries and unsolicited pushes.

use fleetgw_core::{Command, CommandResult, RawMetric};
use serde_json::Value;
use tracing::warn;

use crate::service::{classify_common, validate_common, Service, ServiceResponse};

/// The vehicle's telemetry database service.
///
/// Matches the `telemetry` command type regardless of subsystem, since
/// telemetry for every subsystem lives behind this one endpoint.
pub struct TelemetryService {
    port: u16,
}

impl TelemetryService {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Query text for the periodic pull: everything newer than
    /// `now_ms - window_ms`.
    pub fn pull_query(now_ms: i64, window_ms: i64) -> String {
        format!(
            "{{ telemetry(timestampGe: {}) {{ timestamp, subsystem, parameter, value }} }}",
            now_ms - window_ms
        )
    }
}

impl Service for TelemetryService {
    fn name(&self) -> &str {
        "telemetry"
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn matches(&self, command: &Command) -> bool {
        command.command_type == "telemetry"
    }

    fn validate_command(&self, command: &Command) -> CommandResult {
        let mut result = validate_common(command);

        if command.command_type == "telemetry" {
            result.mark_matched();
            result.validate_range(command, "limit", 0, 10, "Limit must be between 0 and 10");
            result.validate_presence(command, "subsystem", "Subsystem is required");
            if result.valid() {
                let limit = command.field("limit").and_then(|v| v.as_int()).unwrap_or(0);
                let subsystem = command
                    .field("subsystem")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                result.payload = format!(
                    "{{ telemetry(limit: {limit}, subsystem: \"{subsystem}\") \
                     {{ timestamp, subsystem, parameter, value }} }}"
                );
            }
        }

        result
    }

    fn classify_response(&self, message: &Value) -> ServiceResponse {
        // {"errs": "", "msg": {"telemetry": [{subsystem, parameter, value,
        //  timestamp}, ...]}}
        if let Some(samples) = message
            .get("msg")
            .and_then(|m| m.get("telemetry"))
            .and_then(Value::as_array)
        {
            let mut metrics = Vec::with_capacity(samples.len());
            for sample in samples {
                match serde_json::from_value::<RawMetric>(sample.clone()) {
                    Ok(metric) => metrics.push(metric),
                    Err(e) => warn!(error = %e, "Skipping malformed telemetry sample"),
                }
            }
            return ServiceResponse::Telemetry(metrics);
        }

        classify_common(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgw_core::FieldValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn telemetry_command(limit: i64, subsystem: &str) -> Command {
        Command::new(
            42,
            "telemetry",
            "x.y.telemetry",
            vec![
                ("limit", FieldValue::Int(limit)),
                ("subsystem", FieldValue::Str(subsystem.into())),
            ],
        )
    }

    #[test]
    fn builds_query_with_substituted_fields() {
        let service = TelemetryService::new(8005);
        let result = service.validate_command(&telemetry_command(5, "eps"));
        assert!(result.matched && result.valid());
        assert_eq!(
            result.payload,
            "{ telemetry(limit: 5, subsystem: \"eps\") { timestamp, subsystem, parameter, value } }"
        );
    }

    #[test]
    fn limit_out_of_range_fails_validation() {
        let service = TelemetryService::new(8005);
        let result = service.validate_command(&telemetry_command(10, "eps"));
        assert!(result.matched && !result.valid());
        assert_eq!(result.errors, vec!["Limit must be between 0 and 10"]);
        assert!(result.payload.is_empty());
    }

    #[test]
    fn telemetry_reply_classifies_as_metrics() {
        let service = TelemetryService::new(8005);
        let reply = json!({"errs": "", "msg": {"telemetry": [
            {"subsystem": "eps", "parameter": "voltage", "value": "0.15",
             "timestamp": 1531412196211.0}
        ]}});
        match service.classify_response(&reply) {
            ServiceResponse::Telemetry(metrics) => {
                assert_eq!(metrics.len(), 1);
                assert_eq!(metrics[0].subsystem, "eps");
            }
            other => panic!("expected telemetry, got {other:?}"),
        }
    }

    #[test]
    fn pull_query_targets_the_window_start() {
        let query = TelemetryService::pull_query(1_000_000, 120_000);
        assert_eq!(
            query,
            "{ telemetry(timestampGe: 880000) { timestamp, subsystem, parameter, value } }"
        );
    }
}
