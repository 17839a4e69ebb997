//! Prometheus metrics for the scheduler

use std::sync::Arc;

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

pub struct SchedulerMetrics {
    /// Bindings allocated and persisted
    pub allocations_total: IntCounter,
    /// Allocations that failed, exhaustion included
    pub allocation_failures_total: IntCounter,
    /// Requests served by the netbindings API, by verb
    pub rest_requests_total: IntCounterVec,
    pub registry: Arc<Registry>,
}

impl SchedulerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let allocations_total = IntCounter::new(
            "netscheduler_allocations_total",
            "Total NetBindings allocated",
        )?;
        let allocation_failures_total = IntCounter::new(
            "netscheduler_allocation_failures_total",
            "Total failed NetBinding allocations",
        )?;
        let rest_requests_total = IntCounterVec::new(
            Opts::new(
                "netscheduler_rest_requests_total",
                "Total netbindings API requests",
            ),
            &["verb"],
        )?;

        registry.register(Box::new(allocations_total.clone()))?;
        registry.register(Box::new(allocation_failures_total.clone()))?;
        registry.register(Box::new(rest_requests_total.clone()))?;

        Ok(Self {
            allocations_total,
            allocation_failures_total,
            rest_requests_total,
            registry,
        })
    }
}
