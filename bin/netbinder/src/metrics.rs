//! Prometheus metrics for the node agent

use std::sync::Arc;

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub struct NodeMetrics {
    /// VNIDs currently watched by this node
    pub active_watchers: IntGauge,
    /// Binding events handled, by event kind
    pub binding_events_total: IntCounterVec,
    pub dataplane_failures_total: IntCounter,
    pub reconcile_ticks_total: IntCounter,
    pub reconcile_errors_total: IntCounter,
    pub registry: Arc<Registry>,
}

impl NodeMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let active_watchers =
            IntGauge::new("netbinder_active_watchers", "Number of watched VNIDs")?;
        let binding_events_total = IntCounterVec::new(
            Opts::new(
                "netbinder_binding_events_total",
                "Total NetBinding events handled",
            ),
            &["event"],
        )?;
        let dataplane_failures_total = IntCounter::new(
            "netbinder_dataplane_failures_total",
            "Total failed dataplane operations",
        )?;
        let reconcile_ticks_total =
            IntCounter::new("netbinder_reconcile_ticks_total", "Total reconcile ticks")?;
        let reconcile_errors_total = IntCounter::new(
            "netbinder_reconcile_errors_total",
            "Total failed reconcile ticks",
        )?;

        registry.register(Box::new(active_watchers.clone()))?;
        registry.register(Box::new(binding_events_total.clone()))?;
        registry.register(Box::new(dataplane_failures_total.clone()))?;
        registry.register(Box::new(reconcile_ticks_total.clone()))?;
        registry.register(Box::new(reconcile_errors_total.clone()))?;

        Ok(Self {
            active_watchers,
            binding_events_total,
            dataplane_failures_total,
            reconcile_ticks_total,
            reconcile_errors_total,
            registry,
        })
    }
}
