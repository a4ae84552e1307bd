//! Command routing and telemetry forwarding.
//!
//! The router owns the ordered service registry, makes the single routing
//! decision per inbound command, and is the one place where loosely typed
//! vehicle telemetry is normalized into the control-plane measurement
//! shape. Correlation between outbound requests and inbound replies lives
//! here too, as a per-service map from frame id to control-plane command
//! id, so multiple commands can be in flight to the same service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fleetgw_core::{Command, CommandResult, Measurement, MetricValue, RawMetric};
use fleetgw_link::{CommandHandler, ControlPlaneLink};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::VehicleError;
use crate::packet::{self, Frame};
use crate::service::{Service, ServiceResponse};
use crate::transport::VehicleTransport;

/// Timestamps below this are read as seconds since epoch and scaled;
/// at or above, as milliseconds. (10^12 ms is 2001-09-09; vehicle clocks
/// predating that are not a supported configuration.)
const MILLIS_THRESHOLD: f64 = 1.0e12;

/// The router's narrow view of the control-plane link.
#[async_trait]
pub trait Uplink: Send + Sync {
    /// Forward normalized measurements.
    async fn send_metrics(&self, measurements: &[Measurement]);

    /// Forward a vehicle-originated command ack.
    async fn send_command_ack(
        &self,
        id: i64,
        return_code: i32,
        output: Option<&str>,
        errors: &[String],
    );
}

#[async_trait]
impl Uplink for ControlPlaneLink {
    async fn send_metrics(&self, measurements: &[Measurement]) {
        ControlPlaneLink::send_metrics(self, measurements).await;
    }

    async fn send_command_ack(
        &self,
        id: i64,
        return_code: i32,
        output: Option<&str>,
        errors: &[String],
    ) {
        ControlPlaneLink::send_command_ack(self, id, return_code, output, errors).await;
    }
}

/// One registered service with its transport and in-flight correlations.
struct ServiceEntry {
    service: Arc<dyn Service>,
    transport: Arc<dyn VehicleTransport>,
    /// Frame command id -> control-plane command id, removed once acked.
    pending: parking_lot::Mutex<HashMap<i64, i64>>,
}

/// The command router for one vehicle.
pub struct Router {
    /// Dotted prefix prepended to `subsystem.metric` in measurement paths
    path_prefix: String,
    /// Ordered registry; first match wins
    entries: Vec<Arc<ServiceEntry>>,
    uplink: Arc<dyn Uplink>,
}

impl Router {
    pub fn new(path_prefix: impl Into<String>, uplink: Arc<dyn Uplink>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            entries: Vec::new(),
            uplink,
        }
    }

    /// Register a service. Registration order encodes routing priority:
    /// put services with more specific `matches` predicates first and any
    /// catch-all last. The registry is fixed once the gateway starts.
    pub fn register_service(
        &mut self,
        service: Arc<dyn Service>,
        transport: Arc<dyn VehicleTransport>,
    ) {
        info!(service = service.name(), port = service.port(), "Registering service");
        self.entries.push(Arc::new(ServiceEntry {
            service,
            transport,
            pending: parking_lot::Mutex::new(HashMap::new()),
        }));
    }

    /// Route one inbound command to the first matching service.
    pub async fn dispatch(&self, command: &Command) -> CommandResult {
        let matched: Vec<&Arc<ServiceEntry>> = self
            .entries
            .iter()
            .filter(|entry| entry.service.matches(command))
            .collect();

        let Some(entry) = matched.first().copied() else {
            return CommandResult::with_error(format!(
                "No service available to process command {} for subsystem {}",
                command.command_type,
                command.subsystem()
            ));
        };

        if matched.len() > 1 {
            info!(
                command_type = %command.command_type,
                selected = entry.service.name(),
                candidates = matched.len(),
                "Multiple services matched command"
            );
        }

        let mut result = entry.service.validate_command(command);
        if !result.matched {
            result
                .errors
                .push(format!("Unknown command {}", command.command_type));
        }

        if result.valid() {
            match self.transmit(entry, command.id, &result.payload).await {
                Ok(()) => result.mark_sent(),
                Err(e) => {
                    result.errors.push(format!("Failed to transmit request: {e}"));
                }
            }
        }

        result
    }

    async fn transmit(
        &self,
        entry: &ServiceEntry,
        command_id: i64,
        payload: &str,
    ) -> Result<(), VehicleError> {
        let frame = Frame::request(command_id, entry.service.port(), payload);
        let bytes = packet::encode(&frame)?;

        entry.pending.lock().insert(command_id, command_id);
        info!(service = entry.service.name(), %payload, "Sending request to vehicle");

        if let Err(e) = entry.transport.send(&bytes).await {
            entry.pending.lock().remove(&command_id);
            return Err(e);
        }
        Ok(())
    }

    /// Normalize raw vehicle telemetry and forward it upstream.
    ///
    /// This is the single place where vehicle encodings are reconciled:
    /// stringified booleans become 1.0/0.0, unparsable values become 0
    /// with a warning, name components are lower-cased and dash-joined,
    /// and timestamps are normalized to milliseconds.
    pub async fn forward_metrics(&self, metrics: Vec<RawMetric>) {
        if metrics.is_empty() {
            return;
        }
        let measurements: Vec<Measurement> =
            metrics.iter().map(|m| self.normalize(m)).collect();
        self.uplink.send_metrics(&measurements).await;
    }

    /// Forward a vehicle-originated ack upstream unchanged.
    pub async fn forward_ack(
        &self,
        command_id: i64,
        return_code: i32,
        output: Option<&str>,
        errors: &[String],
    ) {
        self.uplink
            .send_command_ack(command_id, return_code, output, errors)
            .await;
    }

    fn normalize(&self, metric: &RawMetric) -> Measurement {
        let value = match &metric.value {
            MetricValue::Number(v) => *v,
            MetricValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            MetricValue::Text(s) => match s.as_str() {
                "true" | "True" => 1.0,
                "false" | "False" => 0.0,
                other => other.parse().unwrap_or_else(|_| {
                    warn!(
                        subsystem = %metric.subsystem,
                        parameter = %metric.parameter,
                        value = %other,
                        "Metric has invalid string value, converting to 0"
                    );
                    0.0
                }),
            },
        };

        Measurement {
            path: format!(
                "{}.{}.{}",
                self.path_prefix,
                normalize_component(&metric.subsystem),
                normalize_component(&metric.parameter)
            ),
            value,
            timestamp: normalize_timestamp(metric.timestamp),
        }
    }

    /// Spawn one receive loop per registered service.
    pub fn spawn_receive_loops(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        self.entries
            .iter()
            .cloned()
            .map(|entry| {
                let router = Arc::clone(self);
                tokio::spawn(async move { router.receive_loop(entry).await })
            })
            .collect()
    }

    async fn receive_loop(&self, entry: Arc<ServiceEntry>) {
        while let Some(datagram) = entry.transport.recv().await {
            self.handle_datagram(&entry, &datagram).await;
        }
        debug!(service = entry.service.name(), "Vehicle channel closed");
    }

    async fn handle_datagram(&self, entry: &ServiceEntry, datagram: &[u8]) {
        let frame = match packet::decode(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(service = entry.service.name(), error = %e, "Dropping malformed frame");
                return;
            }
        };

        let message: Value = match serde_json::from_slice(&frame.payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    service = entry.service.name(),
                    error = %e,
                    "Dropping frame with undecodable payload"
                );
                return;
            }
        };

        debug!(service = entry.service.name(), ?message, "Received from vehicle");

        match entry.service.classify_response(&message) {
            ServiceResponse::Telemetry(metrics) => self.forward_metrics(metrics).await,
            ServiceResponse::Ack {
                return_code,
                output,
                errors,
            } => {
                if frame.command_id == 0 {
                    warn!(
                        service = entry.service.name(),
                        "Unsolicited non-telemetry frame, dropping"
                    );
                    return;
                }
                let command_id = entry
                    .pending
                    .lock()
                    .remove(&frame.command_id)
                    .unwrap_or_else(|| {
                        warn!(
                            service = entry.service.name(),
                            frame_id = frame.command_id,
                            "Reply for unknown command id"
                        );
                        frame.command_id
                    });
                self.forward_ack(command_id, return_code, output.as_deref(), &errors)
                    .await;
            }
        }
    }
}

#[async_trait]
impl CommandHandler for Router {
    async fn handle_command(&self, command: Command) -> CommandResult {
        self.dispatch(&command).await
    }
}

fn normalize_component(raw: &str) -> String {
    raw.replace(' ', "-").to_lowercase()
}

fn normalize_timestamp(timestamp: f64) -> i64 {
    if timestamp < MILLIS_THRESHOLD {
        (timestamp * 1000.0).round() as i64
    } else {
        timestamp.round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FrameKind;
    use crate::services::{PassthroughService, TelemetryService};
    use crate::transport::MockVehicleTransport;
    use fleetgw_core::FieldValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Records everything forwarded upstream.
    #[derive(Default)]
    struct RecordingUplink {
        metrics: parking_lot::Mutex<Vec<Measurement>>,
        acks: parking_lot::Mutex<Vec<(i64, i32, Option<String>, Vec<String>)>>,
    }

    #[async_trait]
    impl Uplink for RecordingUplink {
        async fn send_metrics(&self, measurements: &[Measurement]) {
            self.metrics.lock().extend_from_slice(measurements);
        }

        async fn send_command_ack(
            &self,
            id: i64,
            return_code: i32,
            output: Option<&str>,
            errors: &[String],
        ) {
            self.acks.lock().push((
                id,
                return_code,
                output.map(str::to_string),
                errors.to_vec(),
            ));
        }
    }

    /// A service that matches a fixed command type.
    struct TypedService {
        name: &'static str,
        command_type: &'static str,
        port: u16,
    }

    impl Service for TypedService {
        fn name(&self) -> &str {
            self.name
        }
        fn port(&self) -> u16 {
            self.port
        }
        fn matches(&self, command: &Command) -> bool {
            command.command_type == self.command_type
        }
        fn validate_command(&self, command: &Command) -> CommandResult {
            let mut result = CommandResult::new();
            if command.command_type == self.command_type {
                result.mark_matched();
                result.payload = format!("{{ {}(id: {}) }}", self.command_type, command.id);
            }
            result
        }
    }

    struct Harness {
        router: Arc<Router>,
        uplink: Arc<RecordingUplink>,
        transports: Vec<Arc<MockVehicleTransport>>,
    }

    fn harness(services: Vec<Arc<dyn Service>>) -> Harness {
        let uplink = Arc::new(RecordingUplink::default());
        let mut router = Router::new("mission.sat-1", uplink.clone());
        let mut transports = Vec::new();
        for service in services {
            let transport = Arc::new(MockVehicleTransport::new());
            transports.push(transport.clone());
            router.register_service(service, transport);
        }
        Harness {
            router: Arc::new(router),
            uplink,
            transports,
        }
    }

    fn decode_sent(transport: &MockVehicleTransport) -> Vec<Frame> {
        transport
            .sent_frames()
            .iter()
            .map(|bytes| packet::decode(bytes).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn first_registered_service_wins_ties() {
        let h = harness(vec![
            Arc::new(TypedService { name: "a", command_type: "ping", port: 1 }),
            Arc::new(TypedService { name: "b", command_type: "ping", port: 2 }),
        ]);
        let command = Command::new(7, "ping", "m.sat.eps", vec![]);

        let result = h.router.dispatch(&command).await;
        assert!(result.sent);
        assert_eq!(decode_sent(&h.transports[0]).len(), 1);
        assert!(h.transports[1].sent_frames().is_empty());
    }

    #[tokio::test]
    async fn no_match_reports_type_and_subsystem_without_wire_traffic() {
        let h = harness(vec![Arc::new(TypedService {
            name: "a",
            command_type: "ping",
            port: 1,
        })]);
        let command = Command::new(7, "unknown_cmd", "m.sat.eps", vec![]);

        let result = h.router.dispatch(&command).await;
        assert!(!result.matched && !result.sent);
        assert_eq!(
            result.errors,
            vec!["No service available to process command unknown_cmd for subsystem eps"]
        );
        assert!(h.transports[0].sent_frames().is_empty());
    }

    #[tokio::test]
    async fn whitespace_only_raw_query_never_reaches_the_wire() {
        let h = harness(vec![Arc::new(PassthroughService::new(9))]);
        let command = Command::new(
            7,
            "raw_telemetry_query",
            "m.sat.eps",
            vec![("query", FieldValue::Str("   \t ".into()))],
        );

        let result = h.router.dispatch(&command).await;
        assert!(result.matched && !result.sent);
        assert_eq!(result.errors, vec!["Query is required"]);
        assert!(result.payload.is_empty());
        assert!(h.transports[0].sent_frames().is_empty());
    }

    #[tokio::test]
    async fn matched_service_without_behavior_gets_generic_error() {
        let h = harness(vec![Arc::new(PassthroughService::new(9))]);
        let command = Command::new(7, "unknown_cmd", "m.sat.eps", vec![]);

        let result = h.router.dispatch(&command).await;
        assert!(!result.matched && !result.sent);
        assert_eq!(result.errors, vec!["Unknown command unknown_cmd"]);
        assert!(h.transports[0].sent_frames().is_empty());
    }

    #[tokio::test]
    async fn dispatched_command_goes_out_as_request_frame() {
        let h = harness(vec![Arc::new(TelemetryService::new(8005))]);
        let command = Command::new(
            42,
            "telemetry",
            "x.y.telemetry",
            vec![
                ("limit", FieldValue::Int(5)),
                ("subsystem", FieldValue::Str("eps".into())),
            ],
        );

        let result = h.router.dispatch(&command).await;
        assert!(result.sent && result.valid());

        let frames = decode_sent(&h.transports[0]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Request);
        assert_eq!(frames[0].command_id, 42);
        assert_eq!(frames[0].port, 8005);
        assert_eq!(
            frames[0].payload_text().unwrap(),
            "{ telemetry(limit: 5, subsystem: \"eps\") { timestamp, subsystem, parameter, value } }"
        );
    }

    #[tokio::test]
    async fn reply_is_correlated_and_acked_with_remote_output() {
        let h = harness(vec![Arc::new(TypedService {
            name: "a",
            command_type: "ping",
            port: 1,
        })]);
        let command = Command::new(42, "ping", "m.sat.eps", vec![]);
        h.router.dispatch(&command).await;

        let reply = json!({"errs": "", "msg": {"pong": true}}).to_string();
        let frame = Frame::request(42, 1, &reply);
        let entry = &h.router.entries[0];
        h.router
            .handle_datagram(entry, &packet::encode(&frame).unwrap())
            .await;

        let acks = h.uplink.acks.lock();
        assert_eq!(acks.len(), 1);
        let (id, code, output, errors) = &acks[0];
        assert_eq!((*id, *code), (42, 0));
        assert!(output.as_ref().unwrap().contains("pong"));
        assert!(errors.is_empty());
        assert!(entry.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn two_in_flight_commands_are_attributed_independently() {
        let h = harness(vec![Arc::new(TypedService {
            name: "a",
            command_type: "ping",
            port: 1,
        })]);
        h.router.dispatch(&Command::new(1, "ping", "m.sat.eps", vec![])).await;
        h.router.dispatch(&Command::new(2, "ping", "m.sat.eps", vec![])).await;

        let entry = &h.router.entries[0];
        assert_eq!(entry.pending.lock().len(), 2);

        // Replies arrive out of order.
        for id in [2, 1] {
            let reply = json!({"errs": "", "msg": {"pong": id}}).to_string();
            let frame = Frame::request(id, 1, &reply);
            h.router
                .handle_datagram(entry, &packet::encode(&frame).unwrap())
                .await;
        }

        let acks = h.uplink.acks.lock();
        assert_eq!(acks[0].0, 2);
        assert_eq!(acks[1].0, 1);
        assert!(entry.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn unsolicited_telemetry_frame_forwards_metrics() {
        let h = harness(vec![Arc::new(TelemetryService::new(8005))]);
        let push = json!({"errs": "", "msg": {"telemetry": [
            {"subsystem": "Reaction Wheel", "parameter": "Spin Rate",
             "value": "True", "timestamp": 1531412196.211}
        ]}})
        .to_string();
        let frame = Frame {
            kind: FrameKind::Telemetry,
            command_id: 0,
            port: 8005,
            payload: bytes::Bytes::copy_from_slice(push.as_bytes()),
        };
        let entry = &h.router.entries[0];
        h.router
            .handle_datagram(entry, &packet::encode(&frame).unwrap())
            .await;

        let metrics = h.uplink.metrics.lock();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].path, "mission.sat-1.reaction-wheel.spin-rate");
        assert_eq!(metrics[0].value, 1.0);
        assert_eq!(metrics[0].timestamp, 1_531_412_196_211);
    }

    #[tokio::test]
    async fn metric_values_normalize_per_contract() {
        let h = harness(vec![]);
        let raw = |value: serde_json::Value| -> RawMetric {
            serde_json::from_value(json!({
                "subsystem": "eps", "parameter": "flag",
                "value": value, "timestamp": 1_700_000_000_000.0_f64
            }))
            .unwrap()
        };

        h.router.forward_metrics(vec![
            raw(json!("True")),
            raw(json!("false")),
            raw(json!("abc")),
            raw(json!(0.25)),
        ])
        .await;

        let metrics = h.uplink.metrics.lock();
        let values: Vec<f64> = metrics.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![1.0, 0.0, 0.0, 0.25]);
    }

    #[tokio::test]
    async fn upstream_error_reply_acks_failure() {
        let h = harness(vec![Arc::new(TypedService {
            name: "a",
            command_type: "ping",
            port: 1,
        })]);
        h.router.dispatch(&Command::new(5, "ping", "m.sat.eps", vec![])).await;

        let reply = json!({"errs": [{"message": "backend down"}], "msg": ""}).to_string();
        let frame = Frame::request(5, 1, &reply);
        let entry = &h.router.entries[0];
        h.router
            .handle_datagram(entry, &packet::encode(&frame).unwrap())
            .await;

        let acks = h.uplink.acks.lock();
        assert_eq!(acks[0].0, 5);
        assert_eq!(acks[0].1, 1);
        assert_eq!(acks[0].3, vec!["backend down"]);
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_quietly() {
        let h = harness(vec![Arc::new(PassthroughService::new(9))]);
        let entry = &h.router.entries[0];
        h.router.handle_datagram(entry, &[0u8; 4]).await;
        assert!(h.uplink.acks.lock().is_empty());
        assert!(h.uplink.metrics.lock().is_empty());
    }
}
