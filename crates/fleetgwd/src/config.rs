//! Daemon configuration (TOML).
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! runnable local setup: plaintext control-plane endpoint on localhost and
//! the standard service set on their conventional ports.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetgw_link::LinkConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub gateway: GatewaySection,
    pub link: LinkSection,
    pub vehicle: VehicleSection,
}

impl GatewayConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = toml::from_str(&text)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Vehicle identity; the default measurement path prefix
    pub system_name: String,
    /// Override for the dotted prefix of measurement paths
    pub path_prefix: Option<String>,
    /// Period of the telemetry pull heartbeat; 0 disables it
    pub heartbeat_interval_secs: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            system_name: "vehicle-1".to_string(),
            path_prefix: None,
            heartbeat_interval_secs: 10,
        }
    }
}

impl GatewaySection {
    /// Prefix prepended to every measurement path.
    pub fn path_prefix(&self) -> &str {
        self.path_prefix.as_deref().unwrap_or(&self.system_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    /// `tcp://host:port` or `tls://host:port`
    pub endpoint: String,
    pub token: String,
    pub channel: String,
    pub verify_tls: bool,
    pub ca_bundle: Option<PathBuf>,
    pub retry_delay_secs: u64,
    pub queue_limit: usize,
}

impl Default for LinkSection {
    fn default() -> Self {
        let defaults = LinkConfig::default();
        Self {
            endpoint: defaults.endpoint,
            token: defaults.token,
            channel: defaults.channel,
            verify_tls: defaults.verify_tls,
            ca_bundle: defaults.ca_bundle,
            retry_delay_secs: defaults.retry_delay.as_secs(),
            queue_limit: defaults.queue_limit,
        }
    }
}

impl LinkSection {
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            channel: self.channel.clone(),
            verify_tls: self.verify_tls,
            ca_bundle: self.ca_bundle.clone(),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            queue_limit: self.queue_limit,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehicleSection {
    /// Host the onboard services listen on
    pub host: String,
    /// Local bind address for the datagram sockets
    pub bind: String,
    /// Registration order encodes routing priority
    pub services: Vec<ServiceConfig>,
}

impl Default for VehicleSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            bind: "0.0.0.0:0".to_string(),
            services: vec![
                ServiceConfig {
                    kind: ServiceKind::Telemetry,
                    port: 8005,
                },
                ServiceConfig {
                    kind: ServiceKind::Application,
                    port: 8000,
                },
                ServiceConfig {
                    kind: ServiceKind::Payload,
                    port: 8010,
                },
                ServiceConfig {
                    kind: ServiceKind::Passthrough,
                    port: 8020,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub kind: ServiceKind,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Telemetry,
    Application,
    Payload,
    Passthrough,
}
