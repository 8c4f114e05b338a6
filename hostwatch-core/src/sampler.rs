use crate::error::Result;
use crate::event::{NewEvent, ThresholdPolicy};
use crate::snapshot::{Clock, ResourceSource, ResourceUsage};
use crate::store::EventStore;
use std::sync::Arc;
use tracing::{info, warn};

pub const CPU_METRIC: &str = "cpu_percent";
pub const MEMORY_METRIC: &str = "memory_percent";
pub const DISK_METRIC: &str = "disk_percent";

pub const DEFAULT_SAMPLER_WARN_AT: f64 = 80.0;

/// Records aggregate CPU, memory and root-disk use, one event per metric per
/// pass, classified OK below the WARN bound and WARN at or above it.
pub struct MetricSampler {
    store: EventStore,
    hostname: String,
    clock: Arc<dyn Clock>,
    policy: ThresholdPolicy,
}

impl MetricSampler {
    pub fn new(store: EventStore, hostname: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            hostname: hostname.into(),
            clock,
            policy: ThresholdPolicy::two_tier(DEFAULT_SAMPLER_WARN_AT),
        }
    }

    pub fn with_warn_at(mut self, warn_at: f64) -> Self {
        self.policy = ThresholdPolicy::two_tier(warn_at);
        self
    }

    /// The three events a pass over `usage` produces, in metric order.
    /// Non-finite readings are stored as 0 (NaN, -inf) or 100 (+inf).
    pub fn events(&self, usage: &ResourceUsage) -> Vec<NewEvent> {
        let timestamp = self.clock.now();

        [
            (CPU_METRIC, usage.cpu_percent),
            (MEMORY_METRIC, usage.memory_percent),
            (DISK_METRIC, usage.root_disk_percent),
        ]
        .into_iter()
        .map(|(metric, value)| {
            let value = finite_reading(metric, value);
            NewEvent::new(timestamp, &self.hostname, metric, value, self.policy.classify(value))
        })
        .collect()
    }

    pub fn record(&self, usage: &ResourceUsage) -> Result<usize> {
        let events = self.events(usage);
        let written = self.store.append_batch(&events)?;

        info!(
            cpu = usage.cpu_percent,
            memory = usage.memory_percent,
            disk = usage.root_disk_percent,
            "recorded resource sample"
        );
        Ok(written)
    }

    pub fn sample(&self, source: &dyn ResourceSource) -> Result<usize> {
        let usage = source.resource_usage()?;
        self.record(&usage)
    }
}

fn finite_reading(metric: &str, value: f64) -> f64 {
    if value.is_finite() {
        return value;
    }
    let mapped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 100.0) };
    warn!(metric, reading = %value, recorded = mapped, "non-finite reading");
    mapped
}
