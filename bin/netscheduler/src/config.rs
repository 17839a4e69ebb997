use std::net::SocketAddr;

use anyhow::{Context, Result};
use overlay_core::allocator::{DEFAULT_IP_SUBNET, DEFAULT_MAC_SUBNET};
use overlay_telemetry::LogFormat;

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Scheduler settings, read once at startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub ip_subnet: String,
    pub mac_subnet: String,
    /// Address of the netbindings API, metrics and health endpoints
    pub listen: SocketAddr,
    pub log_format: LogFormat,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let listen = get("NETSCHEDULER_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen
            .parse()
            .with_context(|| format!("invalid NETSCHEDULER_LISTEN {:?}", listen))?;

        let log_format = match get("OVERLAY_LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            ip_subnet: get("OVERLAY_IP_SUBNET").unwrap_or_else(|| DEFAULT_IP_SUBNET.to_string()),
            mac_subnet: get("OVERLAY_MAC_SUBNET")
                .unwrap_or_else(|| DEFAULT_MAC_SUBNET.to_string()),
            listen,
            log_format,
        })
    }
}
