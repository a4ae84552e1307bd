//! fleetgwd - Fleet Gateway Daemon
//!
//! Bridges a fleet-command control plane to one vehicle's onboard
//! services: maintains the control-plane session, routes inbound commands
//! to services over the datagram link, and forwards telemetry and command
//! acks back upstream.
//!
//! Usage:
//!   fleetgwd [config.toml]
//!
//! If no config file is provided, connects to a local control plane with
//! the default service set.

mod config;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fleetgw_core::{LogEvent, LogLevel};
use fleetgw_link::{create_transport, ControlPlaneLink};
use fleetgw_vehicle::packet::{self, Frame};
use fleetgw_vehicle::services::{
    ApplicationService, PassthroughService, PayloadService, TelemetryService,
};
use fleetgw_vehicle::{Router, Service, UdpTransport, VehicleTransport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{GatewayConfig, ServiceKind};

/// Parsed command-line arguments
struct Args {
    /// Daemon config file (TOML)
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args { config_path: None };

    for arg in &args {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if !other.starts_with('-') => {
                result.config_path = Some(other.to_string());
            }
            _ => {
                tracing::warn!("Unknown argument: {}", arg);
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"fleetgwd - Fleet Gateway Daemon

Usage: fleetgwd [config.toml]

Options:
  -h, --help    Print this help message

Examples:
  # Run against a local control plane with default services
  fleetgwd

  # Run with a config file
  fleetgwd gateway.toml
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fleetgwd=info,fleetgw_link=info,fleetgw_vehicle=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting fleetgwd (Fleet Gateway Daemon)");

    let args = parse_args();
    let config = if let Some(ref path) = args.config_path {
        tracing::info!("Loading config from: {}", path);
        GatewayConfig::load(Path::new(path))?
    } else {
        tracing::info!("No config file provided, using defaults");
        GatewayConfig::default()
    };

    // Control-plane link
    let link_config = config.link.to_link_config();
    let link_transport = create_transport(&link_config.endpoint, &link_config.tls_options())?;
    let link = Arc::new(ControlPlaneLink::new(link_config, link_transport));

    // Vehicle-side services and router
    let mut router = Router::new(config.gateway.path_prefix(), link.clone());
    let mut heartbeat_target: Option<(Arc<dyn VehicleTransport>, u16)> = None;

    for entry in &config.vehicle.services {
        let remote = format!("{}:{}", config.vehicle.host, entry.port);
        let transport: Arc<dyn VehicleTransport> =
            Arc::new(UdpTransport::connect(&config.vehicle.bind, &remote).await?);
        let service: Arc<dyn Service> = match entry.kind {
            ServiceKind::Telemetry => {
                heartbeat_target = Some((transport.clone(), entry.port));
                Arc::new(TelemetryService::new(entry.port))
            }
            ServiceKind::Application => Arc::new(ApplicationService::new(entry.port)),
            ServiceKind::Payload => Arc::new(PayloadService::new(entry.port)),
            ServiceKind::Passthrough => Arc::new(PassthroughService::new(entry.port)),
        };
        router.register_service(service, transport);
    }

    let router = Arc::new(router);
    let _receive_tasks = router.spawn_receive_loops();

    // Periodic telemetry pull: unsolicited (command id 0), replies come
    // back through the telemetry service's receive loop as pushes.
    if config.gateway.heartbeat_interval_secs > 0 {
        if let Some((transport, port)) = heartbeat_target {
            let interval = Duration::from_secs(config.gateway.heartbeat_interval_secs);
            tokio::spawn(telemetry_heartbeat(transport, port, interval));
        } else {
            tracing::warn!("No telemetry service configured, heartbeat disabled");
        }
    }

    // Queued until the first subscribe succeeds, then delivered.
    link.send_log_events(&[LogEvent::now(
        config.gateway.system_name.as_str(),
        LogLevel::Nominal,
        "Gateway started",
    )])
    .await;

    // Runs until the control plane rejects us with a non-network error.
    link.connect_with_retries(router).await?;

    Ok(())
}

/// Periodically pull recent telemetry from the vehicle.
async fn telemetry_heartbeat(transport: Arc<dyn VehicleTransport>, port: u16, period: Duration) {
    let window_ms = period.as_millis() as i64;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let query = TelemetryService::pull_query(now_ms, window_ms);
        let frame = Frame::request(0, port, &query);
        match packet::encode(&frame) {
            Ok(bytes) => {
                tracing::debug!(%query, "Sending telemetry pull");
                if let Err(e) = transport.send(&bytes).await {
                    tracing::warn!(error = %e, "Telemetry pull failed to send");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Telemetry pull frame rejected"),
        }
    }
}
