//! The onboard-service abstraction.
//!
//! A [`Service`] is one capability endpoint on the vehicle: it decides
//! which commands it can handle, maps recognized command types to wire
//! request text, and classifies the service's replies. Transport and
//! correlation state live in the router, so services stay pure logic.

use fleetgw_core::{Command, CommandResult, RawMetric};
use serde_json::Value;

/// Classification of one reply payload from an onboard service.
#[derive(Debug)]
pub enum ServiceResponse {
    /// A command reply: success (code 0) or failure (code 1)
    Ack {
        return_code: i32,
        output: Option<String>,
        errors: Vec<String>,
    },
    /// A batch of telemetry samples
    Telemetry(Vec<RawMetric>),
}

/// One onboard capability endpoint.
pub trait Service: Send + Sync {
    /// Service identity; also the default subsystem-matching key.
    fn name(&self) -> &str;

    /// Destination port of this service on the vehicle.
    fn port(&self) -> u16;

    /// Pure predicate: can this service handle the command? The router
    /// scans the registry in insertion order and the first match wins, so
    /// catch-all services must be registered last.
    fn matches(&self, command: &Command) -> bool;

    /// Build the wire request for recognized command types.
    ///
    /// Unrecognized types leave `matched == false` and append no error;
    /// the router adds the generic unknown-command error in that case.
    fn validate_command(&self, command: &Command) -> CommandResult;

    /// Classify one reply payload. The default covers the common shapes;
    /// services with their own reply conventions override it.
    fn classify_response(&self, message: &Value) -> ServiceResponse {
        classify_common(message)
    }
}

/// Validation for the command types every service supports: raw query and
/// raw mutation passthrough.
pub fn validate_common(command: &Command) -> CommandResult {
    let mut result = CommandResult::new();

    // Presence is judged on the trimmed text: a whitespace-only field
    // would otherwise survive validation and produce an empty request
    // payload on the wire.
    match command.command_type.as_str() {
        "raw_telemetry_query" => {
            result.mark_matched();
            match command.field("query").and_then(|v| v.as_str()).map(str::trim) {
                Some(query) if !query.is_empty() => result.payload = query.to_string(),
                _ => result.errors.push("Query is required".to_string()),
            }
        }
        "raw_mutation" => {
            result.mark_matched();
            match command
                .field("mutation")
                .and_then(|v| v.as_str())
                .map(str::trim)
            {
                Some(mutation) if !mutation.is_empty() => result.payload = mutation.to_string(),
                _ => result.errors.push("Mutation is required".to_string()),
            }
        }
        _ => {}
    }

    result
}

/// Default reply classification.
///
/// Three shapes come back from onboard services:
/// - `{"errs": [...], "msg": ...}` with a non-empty error list — upstream
///   failure, code 1;
/// - a bare array of GraphQL errors (objects carrying `locations`) —
///   request failure, code 1;
/// - anything else — success, code 0, payload echoed as output.
pub fn classify_common(message: &Value) -> ServiceResponse {
    if let Some(errs) = message.get("errs") {
        let errors = upstream_errors(errs);
        if !errors.is_empty() {
            return ServiceResponse::Ack {
                return_code: 1,
                output: None,
                errors,
            };
        }
    }

    if let Some(items) = message.as_array() {
        if items
            .first()
            .map(|e| e.is_object() && e.get("locations").is_some())
            .unwrap_or(false)
        {
            return ServiceResponse::Ack {
                return_code: 1,
                output: None,
                errors: items.iter().map(Value::to_string).collect(),
            };
        }
    }

    ServiceResponse::Ack {
        return_code: 0,
        output: Some(message.to_string()),
        errors: Vec::new(),
    }
}

/// Extract messages from an `errs` value, which services encode either as
/// an array of `{"message": ...}` objects or as a bare string.
fn upstream_errors(errs: &Value) -> Vec<String> {
    match errs {
        Value::Array(items) => items
            .iter()
            .map(|e| {
                e.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string())
            })
            .collect(),
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
