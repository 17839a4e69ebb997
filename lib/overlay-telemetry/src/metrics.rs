use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};

/// Gather all metrics of `registry` in Prometheus text format
pub fn encode(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
