//! Shared fixture for gateway end-to-end tests.
//!
//! Assembles the full gateway in-process: a scripted control-plane session
//! on one side, mock vehicle transports on the other, and the real link,
//! router, and services in between. Tests play the control plane through
//! [`fleetgw_link::transport::mock::MockSession`] and the vehicle through
//! [`fleetgw_vehicle::MockVehicleTransport`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fleetgw_link::transport::mock::MockLinkTransport;
use fleetgw_link::{ControlPlaneLink, LinkConfig};
use fleetgw_vehicle::{MockVehicleTransport, Router, Service};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

/// Measurement path prefix used by every fixture gateway.
pub const PATH_PREFIX: &str = "mission.sat-1";

/// A running in-process gateway.
pub struct Gateway {
    pub link: Arc<ControlPlaneLink>,
    pub control_plane: Arc<MockLinkTransport>,
    /// One mock transport per registered service, in registration order.
    pub vehicle: Vec<Arc<MockVehicleTransport>>,
    link_task: JoinHandle<()>,
}

impl Gateway {
    /// Build and start a gateway with the given service registry.
    ///
    /// Script at least one session on `control_plane` before calling this,
    /// or the link will spin on refused connects until one appears (the
    /// fixture retry delay is short, so late scripting also works).
    pub fn start(services: Vec<Arc<dyn Service>>) -> Self {
        let control_plane = Arc::new(MockLinkTransport::new());
        let config = LinkConfig {
            token: "fixture-token".to_string(),
            retry_delay: Duration::from_millis(25),
            ..LinkConfig::default()
        };
        let link = Arc::new(ControlPlaneLink::new(config, control_plane.clone()));

        let mut router = Router::new(PATH_PREFIX, link.clone());
        let mut vehicle = Vec::new();
        for service in services {
            let transport = Arc::new(MockVehicleTransport::new());
            vehicle.push(transport.clone());
            router.register_service(service, transport);
        }
        let router = Arc::new(router);
        let _receive_tasks = router.spawn_receive_loops();

        let link_task = {
            let link = link.clone();
            tokio::spawn(async move {
                let _ = link.connect_with_retries(router).await;
            })
        };

        Self {
            link,
            control_plane,
            vehicle,
            link_task,
        }
    }

    pub fn stop(self) {
        self.link_task.abort();
    }
}

/// A command message as the control-plane session delivers it.
pub fn command_message(id: i64, command_type: &str, path: &str, fields: Value) -> String {
    json!({
        "identifier": json!({"channel": "GatewayChannel"}).to_string(),
        "message": {
            "type": "command",
            "command": {
                "id": id,
                "type": command_type,
                "path": path,
                "fields": fields,
            },
        },
    })
    .to_string()
}

/// Unwrap the application payload from an outbound session envelope.
pub fn inner_payload(line: &str) -> Value {
    let outer: Value = serde_json::from_str(line).expect("outbound line is JSON");
    let data = outer["data"].as_str().expect("envelope carries a data string");
    serde_json::from_str(data).expect("data is JSON")
}

/// Poll `condition` until it holds or a one-second deadline passes.
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// `recv_line` with a deadline, so a missing message fails instead of
/// hanging the test.
pub async fn recv_line_timely(
    session: &mut fleetgw_link::transport::mock::MockSession,
) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(1), session.recv_line())
        .await
        .ok()
        .flatten()
}
