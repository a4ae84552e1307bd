//! Payload service: typed power and calibration commands.

use fleetgw_core::{Command, CommandResult};
use serde_json::Value;

use crate::service::{classify_common, validate_common, Service, ServiceResponse};

/// The experiment-payload endpoint.
///
/// Carries the two typed commands with non-string field validation: a
/// boolean power toggle (control-plane UIs sometimes encode it as 0/1) and
/// a no-argument calibration.
pub struct PayloadService {
    port: u16,
}

impl PayloadService {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Human-readable success output for known mutations; raw JSON
    /// otherwise.
    fn pretty_output(message: &Value) -> String {
        let Some(msg) = message.get("msg") else {
            return message.to_string();
        };
        if let Some(power) = msg.get("setPower").and_then(|m| m.get("power")) {
            return format!("Power is now {power}");
        }
        if let Some(temp) = msg
            .get("calibrateThermometer")
            .and_then(|m| m.get("temperature"))
        {
            return format!("Temperature is now {temp}");
        }
        msg.to_string()
    }
}

impl Service for PayloadService {
    fn name(&self) -> &str {
        "payload"
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn matches(&self, command: &Command) -> bool {
        command.subsystem() == self.name()
    }

    fn validate_command(&self, command: &Command) -> CommandResult {
        let mut result = validate_common(command);

        match command.command_type.as_str() {
            "set_power" => {
                result.mark_matched();
                if let Some(power) =
                    result.validate_boolean(command, "power", "power must be a boolean value")
                {
                    result.payload =
                        format!("mutation {{ setPower(power: {power}) {{ power }} }}");
                }
            }
            "calibrate_thermometer" => {
                result.mark_matched();
                result.payload =
                    "mutation { calibrateThermometer { temperature } }".to_string();
            }
            _ => {}
        }

        result
    }

    fn classify_response(&self, message: &Value) -> ServiceResponse {
        match classify_common(message) {
            ServiceResponse::Ack {
                return_code: 0,
                errors,
                ..
            } => ServiceResponse::Ack {
                return_code: 0,
                output: Some(Self::pretty_output(message)),
                errors,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgw_core::FieldValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn set_power(value: FieldValue) -> Command {
        Command::new(5, "set_power", "m.sat.payload", vec![("power", value)])
    }

    #[test]
    fn integer_toggle_coerces_to_boolean() {
        let service = PayloadService::new(8080);
        let result = service.validate_command(&set_power(FieldValue::Int(1)));
        assert!(result.valid());
        assert_eq!(result.payload, "mutation { setPower(power: true) { power } }");

        let result = service.validate_command(&set_power(FieldValue::Int(0)));
        assert_eq!(result.payload, "mutation { setPower(power: false) { power } }");
    }

    #[test]
    fn non_boolean_power_fails() {
        let service = PayloadService::new(8080);
        let result = service.validate_command(&set_power(FieldValue::Str("on".into())));
        assert!(result.matched && !result.valid());
        assert_eq!(result.errors, vec!["power must be a boolean value"]);
    }

    #[test]
    fn success_output_is_prettified() {
        let service = PayloadService::new(8080);
        let reply = json!({"errs": "", "msg": {"setPower": {"power": true}}});
        match service.classify_response(&reply) {
            ServiceResponse::Ack { output, .. } => {
                assert_eq!(output.unwrap(), "Power is now true");
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }
}
