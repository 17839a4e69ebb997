use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use overlay_dataplane::DataplaneConfig;
use overlay_telemetry::LogFormat;

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
const DEFAULT_TELEMETRY_LISTEN: &str = "0.0.0.0:9090";

/// Node agent settings, read once at startup
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Name this node writes into the VTEP of its bindings
    pub hostname: String,
    pub sync_interval: Duration,
    pub telemetry_listen: SocketAddr,
    pub log_format: LogFormat,
    pub dataplane: DataplaneConfig,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let hostname = match get("NETBINDER_HOSTNAME") {
            Some(name) => name.trim().to_string(),
            None => hostname::get()?
                .into_string()
                .map_err(|name| anyhow!("hostname {:?} is not valid UTF-8", name))?,
        };

        let sync_interval = match get("NETBINDER_SYNC_INTERVAL_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("invalid NETBINDER_SYNC_INTERVAL_SECS {:?}", value))?,
            None => DEFAULT_SYNC_INTERVAL_SECS,
        };
        if sync_interval == 0 {
            return Err(anyhow!("NETBINDER_SYNC_INTERVAL_SECS must be positive"));
        }

        let telemetry_listen = get("NETBINDER_TELEMETRY_LISTEN")
            .unwrap_or_else(|| DEFAULT_TELEMETRY_LISTEN.to_string());
        let telemetry_listen = telemetry_listen
            .parse()
            .with_context(|| format!("invalid NETBINDER_TELEMETRY_LISTEN {:?}", telemetry_listen))?;

        let log_format = match get("OVERLAY_LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            hostname,
            sync_interval: Duration::from_secs(sync_interval),
            telemetry_listen,
            log_format,
            dataplane: DataplaneConfig::from_lookup(&lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::from_lookup(lookup(&[("NETBINDER_HOSTNAME", "node-1")])).unwrap();
        assert_eq!(config.hostname, "node-1");
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(config.telemetry_listen, "0.0.0.0:9090".parse().unwrap());
        assert_eq!(config.dataplane.bridge, "obr0");
    }

    #[test]
    fn test_system_hostname_fallback() {
        let config = NodeConfig::from_lookup(lookup(&[])).unwrap();
        assert!(!config.hostname.is_empty());
    }

    #[test]
    fn test_invalid_values() {
        assert!(NodeConfig::from_lookup(lookup(&[
            ("NETBINDER_HOSTNAME", "node-1"),
            ("NETBINDER_SYNC_INTERVAL_SECS", "0"),
        ]))
        .is_err());
        assert!(NodeConfig::from_lookup(lookup(&[
            ("NETBINDER_HOSTNAME", "node-1"),
            ("OVERLAY_TUNNEL_PORT", "x"),
        ]))
        .is_err());
    }
}
