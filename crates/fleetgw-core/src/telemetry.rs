//! Measurement and log-event shapes.
//!
//! [`RawMetric`] is what the vehicle emits: loosely typed values and a
//! timestamp whose unit has drifted between onboard software generations.
//! [`Measurement`] is the normalized control-plane shape: a dotted path, an
//! f64, and a millisecond epoch timestamp. The router performs the
//! normalization; everything upstream of it only ever sees [`Measurement`].

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A telemetry value as the vehicle encodes it.
///
/// Onboard services report numbers, stringified numbers, and stringified
/// booleans interchangeably, so this deserializes untagged.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Already numeric
    Number(f64),
    /// Boolean, mapped to 1.0/0.0 downstream
    Bool(bool),
    /// Stringified number or boolean
    Text(String),
}

/// One telemetry sample as received from the vehicle, prior to
/// normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMetric {
    /// Reporting subsystem, vehicle spelling (may contain spaces/case)
    pub subsystem: String,
    /// Parameter name, vehicle spelling
    pub parameter: String,
    /// Sample value
    pub value: MetricValue,
    /// Sample time; seconds or milliseconds since epoch depending on the
    /// onboard software generation
    pub timestamp: f64,
}

/// One normalized measurement in the control-plane shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Dotted `prefix.subsystem.metric` address
    pub path: String,
    /// Normalized numeric value
    pub value: f64,
    /// Milliseconds since unix epoch
    pub timestamp: i64,
}

/// Severity of a control-plane log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Nominal,
    Warning,
    Error,
}

/// A log event destined for the control plane's event stream.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    /// Originating system name
    pub system: String,
    /// Severity, `nominal` when unspecified
    pub level: LogLevel,
    /// Human-readable message
    pub message: String,
    /// Milliseconds since unix epoch
    pub timestamp: i64,
}

impl LogEvent {
    /// A log event stamped with the current time.
    pub fn now(system: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            level,
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn raw_metric_accepts_mixed_value_encodings() {
        let metrics: Vec<RawMetric> = serde_json::from_value(serde_json::json!([
            {"subsystem": "eps", "parameter": "voltage", "value": 0.15, "timestamp": 1531412196211.0},
            {"subsystem": "eps", "parameter": "charging", "value": "True", "timestamp": 1531412196211.0},
            {"subsystem": "adcs", "parameter": "mode", "value": true, "timestamp": 1531412196.211}
        ]))
        .unwrap();
        assert_eq!(metrics[0].value, MetricValue::Number(0.15));
        assert_eq!(metrics[1].value, MetricValue::Text("True".into()));
        assert_eq!(metrics[2].value, MetricValue::Bool(true));
    }

    #[test]
    fn log_level_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(LogLevel::Nominal).unwrap(),
            serde_json::json!("nominal")
        );
        assert_eq!(LogLevel::default(), LogLevel::Nominal);
    }
}
